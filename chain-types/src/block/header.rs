use bitcoin_serde_derive::{BtcDeserialize, BtcSerialize};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    serialization::sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError,
};

use super::{Hash, Height};

/// A block header, containing metadata about a block.
///
/// Blocks are chained together via `previous_block_hash`: each points
/// backwards to its parent, all the way back to the genesis block. This
/// crate does not validate proof-of-work or timestamps against consensus
/// rules — that is the block validator's job, not the state core's.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, BtcSerialize, BtcDeserialize)]
pub struct Header {
    pub version: u32,
    /// The hash of the previous block, chaining this block to its parent.
    pub previous_block_hash: Hash,
    /// The root of the transaction Merkle tree. Merkle-tree construction and
    /// verification are out of scope here; this field is an opaque value
    /// supplied by the caller when the block was assembled or validated.
    pub merkle_root: Hash,
    pub time: DateTime<Utc>,
    /// The target threshold this header's hash must be less than or equal
    /// to, in Bitcoin's compact nBits encoding. This crate stores it
    /// verbatim; checking it against the header hash is out of scope.
    pub bits: u32,
    pub nonce: u32,
}

#[derive(Error, Debug)]
pub enum BlockTimeError {
    #[error("invalid time {0:?} in block header at height {1:?} hash {2:?}: block time is more than 2 hours in the future ({3:?})")]
    InvalidBlockTime(DateTime<Utc>, Height, Hash, DateTime<Utc>),
}

impl Header {
    /// Length of a serialized header in bytes.
    pub const fn len() -> usize {
        80
    }

    pub fn new(
        version: u32,
        previous_block_hash: Hash,
        merkle_root: Hash,
        time: DateTime<Utc>,
        bits: u32,
        nonce: u32,
    ) -> Header {
        Header { version, previous_block_hash, merkle_root, time, bits, nonce }
    }

    pub fn time_is_valid_at(&self, now: DateTime<Utc>, height: &Height, hash: &Hash) -> Result<(), BlockTimeError> {
        let two_hours_in_the_future = now
            .checked_add_signed(Duration::hours(2))
            .expect("calculating 2 hours in the future does not overflow");
        if self.time <= two_hours_in_the_future {
            Ok(())
        } else {
            Err(BlockTimeError::InvalidBlockTime(self.time, *height, *hash, two_hours_in_the_future))
        }
    }

    /// Computes this header's hash by serializing it into a double-SHA256 writer.
    pub fn hash(&self) -> Hash {
        let mut hash_writer = sha256d::Writer::default();
        self.bitcoin_serialize(&mut hash_writer).expect("Sha256dWriter is infallible");
        Hash::from_bytes(hash_writer.finish())
    }
}

/// A header paired with the count of transactions in its block, as used when
/// headers are exchanged independently of full block bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountedHeader {
    pub header: Header,
    pub transaction_count: usize,
}
