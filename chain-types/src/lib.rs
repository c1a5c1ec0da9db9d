//! Value objects and wire/storage serialization for the consensus state core.
//!
//! This crate defines the data model — hashes, amounts, blocks, transactions,
//! and the transparent (Bitcoin-inherited) input/output/script/address types —
//! shared by the persistence and UTXO-tracking layers in `chain-state`. Script
//! interpretation, proof-of-work validation, and network-upgrade policy are
//! out of scope; this crate only classifies script shapes well enough to
//! extract an address for indexing.

pub mod amount;
pub mod block;
pub mod cached;
pub mod compactint;
pub mod hash;
pub mod network;
pub mod serialization;
pub mod transaction;
pub mod transparent;

pub use amount::Amount;
pub use hash::{Hash160, Hash256};
pub use network::Network;
pub use serialization::{BitcoinDeserialize, BitcoinDeserializeInto, BitcoinSerialize, SerializationError};

/// Helper used by `Display for T where T: Debug` patterns in this crate: some
/// types only have meaningful `Display` impls (hex-encoded hashes) and are
/// otherwise debugged via their display form.
pub(crate) mod fmt {
    pub struct DisplayToDebug<T>(pub T);

    impl<T: std::fmt::Display> std::fmt::Debug for DisplayToDebug<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            std::fmt::Display::fmt(&self.0, f)
        }
    }
}
