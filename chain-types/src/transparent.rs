//! Transparent-related (Bitcoin-inherited) functionality: outputs, inputs,
//! scripts, and address classification.
#![allow(clippy::unit_arg)]

mod address;
mod script;
mod serialize;

pub use address::{classify_address, Address};
pub use script::Script;

use bitcoin_serde_derive::BtcSerialize;
#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};

use crate::{
    amount::Amount, block::Height, cached::Cached, compactint::CompactInt, hash::Hash256,
    serialization::{BitcoinDeserialize, BitcoinSerialize},
};

/// Arbitrary data inserted by miners into a coinbase transaction.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CoinbaseData(pub Vec<u8>);

impl AsRef<[u8]> for CoinbaseData {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl CoinbaseData {
    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }
}

impl std::fmt::Debug for CoinbaseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let escaped = String::from_utf8(
            self.0.iter().cloned().flat_map(std::ascii::escape_default).collect(),
        )
        .expect("ascii::escape_default produces utf8");
        f.debug_tuple("CoinbaseData").field(&escaped).finish()
    }
}

/// A particular transaction output reference: the identity of one output of
/// one transaction, used as the key of the UTXO set.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Hash, BtcSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct OutPoint {
    /// The transaction that contains the output being referenced.
    pub hash: Hash256,
    /// Which output of that transaction; the first output is 0.
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash256, index: u32) -> OutPoint {
        OutPoint { hash, index }
    }

    #[inline]
    pub const fn len() -> usize {
        36
    }
}

/// A transparent input to a transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Input {
    /// A reference to an output of a previous transaction.
    PrevOut {
        outpoint: OutPoint,
        /// The script that authorizes spending `outpoint`.
        unlock_script: Script,
        sequence: u32,
    },
    /// New coins created by the block reward. Has no prior UTXO to reference.
    Coinbase {
        /// The block height, when recoverable from BIP 34 coinbase data.
        /// This crate does not attempt that extraction; block stores are
        /// always given the height explicitly by their caller.
        height: Option<Cached<Height>>,
        data: CoinbaseData,
        sequence: u32,
    },
}

impl Input {
    pub fn len(&self) -> usize {
        match self {
            Input::PrevOut { unlock_script, .. } => OutPoint::len() + unlock_script.serialized_size() + 4,
            Input::Coinbase { data, .. } => OutPoint::len() + data.serialized_size() + 4,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// A transparent output from a transaction: a value locked behind a script.
///
/// The UTXO set tracks exactly these, keyed by the `OutPoint` that produced
/// them, until a later transaction's input spends them.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash, BtcSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Output {
    pub value: Amount,
    /// The lock script defines the conditions under which this output can be spent.
    pub lock_script: Script,
}

impl BitcoinDeserialize for Output {
    fn bitcoin_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, crate::SerializationError> {
        Ok(Output {
            value: Amount::bitcoin_deserialize(&mut reader)?,
            lock_script: Script::bitcoin_deserialize(&mut reader)?,
        })
    }
}

impl Output {
    /// Returns the serialized length (in bytes) of this output.
    pub fn len(&self) -> usize {
        8 + self.lock_script.serialized_size()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The address this output's script classifies to, if any.
    pub fn address(&self) -> Option<crate::hash::Hash160> {
        classify_address(&self.lock_script)
    }
}
