//! Transactions and transaction-related structures.

use bitcoin_serde_derive::{BtcDeserialize, BtcSerialize};
use serde::{Deserialize, Serialize};

use crate::{
    cached::Cached, compactint::CompactInt, hash::Hash256, transparent, BitcoinDeserialize,
    BitcoinSerialize, SerializationError,
};

/// The identity of a transaction: the double-SHA256 hash of its serialization.
pub type Hash = Hash256;

/// A transaction. Note that this implementation doesn't yet support SegWit.
///
/// A transaction facilitates the transfer of value between addresses: it
/// consumes prior unspent outputs as inputs and creates new ones as outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BtcSerialize, BtcDeserialize)]
pub struct Transaction {
    /// The transaction version. Versions greater than 1 mean BIP 68 applies.
    pub version: i32,
    pub inputs: Vec<transparent::Input>,
    pub outputs: Vec<transparent::Output>,
    /// Either a block height or a Unix timestamp below which this transaction
    /// may not be mined, per the wire format's overloaded `nLockTime` field.
    pub locktime: u32,
    /// Cached, not part of the consensus serialization.
    hash: Cached<Hash>,
}

impl Transaction {
    pub fn new(
        version: i32,
        inputs: Vec<transparent::Input>,
        outputs: Vec<transparent::Output>,
        locktime: u32,
    ) -> Transaction {
        Transaction { version, inputs, outputs, locktime, hash: Cached::new() }
    }

    /// Get the hash (txid) of this transaction.
    pub fn hash(&self) -> Hash {
        if let Some(hash) = self.hash.value() {
            return hash;
        }
        Hash256::hash(&self.bitcoin_serialize_to_vec().expect("serializing a Transaction is infallible"))
    }

    pub fn contains_coinbase_input(&self) -> bool {
        self.inputs.iter().any(|input| matches!(input, transparent::Input::Coinbase { .. }))
    }

    /// Returns `true` if this transaction is a coinbase transaction: exactly
    /// one input, which is the `Coinbase` variant.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && matches!(self.inputs.first(), Some(transparent::Input::Coinbase { .. }))
    }

    /// Sum of this transaction's output values.
    pub fn output_value(&self) -> Result<crate::Amount, crate::amount::AmountError> {
        self.outputs.iter().try_fold(crate::Amount::ZERO, |acc, out| acc.checked_add(out.value))
    }

    /// Returns the serialized length (in bytes) of a transaction.
    ///
    /// Note that this implementation is not BIP 141/144 compliant, since it
    /// doesn't account for SegWit's separate witness serialization.
    pub fn len(&self) -> usize {
        let mut size = 4 + CompactInt::size(self.inputs.len());
        for input in self.inputs.iter() {
            size += input.len();
        }
        size += CompactInt::size(self.outputs.len());
        for output in self.outputs.iter() {
            size += output.len();
        }
        size + 4
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{transparent::Script, Amount};

    fn sample_output(value: u64) -> transparent::Output {
        transparent::Output { value: Amount::try_new(value).unwrap(), lock_script: Script(vec![]) }
    }

    fn sample_coinbase() -> Transaction {
        Transaction::new(
            1,
            vec![transparent::Input::Coinbase {
                height: None,
                data: transparent::CoinbaseData(vec![1, 2, 3]),
                sequence: 0xffff_ffff,
            }],
            vec![sample_output(50_0000_0000)],
            0,
        )
    }

    #[test]
    fn coinbase_detected() {
        let tx = sample_coinbase();
        assert!(tx.is_coinbase());
        assert!(tx.contains_coinbase_input());
    }

    #[test]
    fn hash_is_stable() {
        let tx = sample_coinbase();
        assert_eq!(tx.hash(), tx.hash());
    }

    #[test]
    fn output_value_sums() {
        let tx = sample_coinbase();
        assert_eq!(tx.output_value().unwrap().as_u64(), 50_0000_0000);
    }
}
