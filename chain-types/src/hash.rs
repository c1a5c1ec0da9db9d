//! Fixed-width hash identifiers used throughout the consensus core.

use std::{fmt, io};

use bitcoin_serde_derive::BtcSerialize;
#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};

use crate::serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A SHA256d hash identifying a block or a transaction.
///
/// Zebra-lineage nodes display these in big-endian byte order, following the
/// u256 convention set by Bitcoin; the wire and storage encoding is
/// little-endian (the raw hash output, unreversed).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, BtcSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const fn from_bytes(bytes: [u8; 32]) -> Hash256 {
        Hash256(bytes)
    }

    /// Hashes `bytes` with SHA256d and wraps the result.
    pub fn hash(bytes: &[u8]) -> Hash256 {
        Hash256(sha256d::checksum(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&hex::encode(&reversed))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.debug_tuple("Hash256").field(&hex::encode(&reversed)).finish()
    }
}

impl BitcoinDeserialize for Hash256 {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Hash256(<[u8; 32]>::bitcoin_deserialize(reader)?))
    }
}

impl std::str::FromStr for Hash256 {
    type Err = SerializationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 32];
        if hex::decode_to_slice(s, &mut bytes[..]).is_err() {
            Err(SerializationError::Parse("hex decoding error"))
        } else {
            bytes.reverse();
            Ok(Hash256(bytes))
        }
    }
}

/// A RIPEMD160(SHA256(...)) hash identifying an address, used as the key of
/// the address → outpoints index.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, BtcSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Hash160(pub [u8; 20]);

impl Hash160 {
    pub const fn from_bytes(bytes: [u8; 20]) -> Hash160 {
        Hash160(bytes)
    }
}

impl fmt::Display for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Hash160").field(&hex::encode(&self.0)).finish()
    }
}

impl BitcoinDeserialize for Hash160 {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Hash160(<[u8; 20]>::bitcoin_deserialize(reader)?))
    }
}
