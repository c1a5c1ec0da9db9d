//! Persistent storage and in-memory UTXO tracking for the consensus state core.
//!
//! Four cooperating pieces: a generic key-value abstraction ([`kv`]) backed
//! concretely by `sled`; a [`block_store`] keyed by height with a reverse
//! hash index and chain-tip metadata; a [`tx_index`] mapping transactions to
//! their location and persisting the UTXO set with an address secondary
//! index; and an authoritative [`utxo_set`] (with a bounded
//! [`utxo_set::UtxoCache`]) that applies and reverts transactions in memory.
//! [`coin_selector`] picks outpoints to fund a payment from whatever the
//! caller considers spendable. [`chain`] wires the persistent and in-memory
//! layers into the atomic apply-and-persist operation block acceptance
//! needs, plus the load/flush operations that rebuild the in-memory set on
//! startup.

pub mod block_store;
pub mod chain;
pub mod coin_selector;
pub mod config;
pub mod error;
pub mod kv;
pub mod tx_index;
pub mod utxo_set;

pub use block_store::BlockStore;
pub use chain::{BlockUndo, ChainState};
pub use coin_selector::{Candidate, Selection, Strategy};
pub use config::Config;
pub use error::{BoxError, StateError};
pub use kv::{KvStore, SledStore};
pub use tx_index::TxIndex;
pub use utxo_set::{Stats, UtxoCache, UtxoEntry, UtxoSet};
