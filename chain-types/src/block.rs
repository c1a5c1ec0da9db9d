//! Blocks and block-related structures (heights, headers).
#![allow(clippy::unit_arg)]

mod header;

use std::{fmt, io, sync::Arc};

use bitcoin_serde_derive::BtcSerialize;
use serde::{Deserialize, Serialize};

pub use header::{BlockTimeError, CountedHeader, Header};

use crate::{
    fmt::DisplayToDebug,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
    transaction::Transaction,
};

/// The identity of a block: the double-SHA256 hash of its header.
pub type Hash = crate::hash::Hash256;

/// A block's position in the best chain, counting the genesis block as 0.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(proptest_derive::Arbitrary))]
pub struct Height(pub u32);

impl Height {
    pub fn is_mature(self, current_height: Height, maturity: u32) -> bool {
        current_height.0.saturating_sub(self.0) >= maturity
    }
}

/// A block: a header plus the list of transactions it contains.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, BtcSerialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Arc<Transaction>>,
}

impl BitcoinDeserialize for Block {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let header = Header::bitcoin_deserialize(&mut reader)?;
        let transactions = Vec::<Arc<Transaction>>::bitcoin_deserialize(&mut reader)?;
        Ok(Block { header, transactions })
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("transactions", &self.transactions.len())
            .field("hash", &DisplayToDebug(self.hash()))
            .finish()
    }
}

impl Block {
    /// Returns `true` if exactly one transaction is marked coinbase and it
    /// occupies the first position.
    pub fn has_well_formed_coinbase(&self) -> bool {
        match self.transactions.split_first() {
            Some((first, rest)) => first.is_coinbase() && rest.iter().all(|tx| !tx.is_coinbase()),
            None => false,
        }
    }

    /// Computes the hash of this block (the hash of its header).
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }
}

impl<'a> From<&'a Block> for Hash {
    fn from(block: &'a Block) -> Hash {
        block.header.hash()
    }
}
