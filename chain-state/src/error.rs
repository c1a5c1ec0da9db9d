//! Errors produced by the consensus state core.

use thiserror::Error;

/// A type-erased error, used at API boundaries where callers don't need to
/// match on a specific variant (e.g. storage I/O bubbling out of `sled`).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the block store, tx index, UTXO set, and coin selector.
#[derive(Error, Debug)]
pub enum StateError {
    /// A transaction spends an outpoint that does not exist in the UTXO set.
    #[error("missing input: {0:?}")]
    MissingInput(chain_types::transparent::OutPoint),

    /// A transaction spends a coinbase output before it has matured.
    #[error("immature coinbase spend of {0:?} at height {1}")]
    ImmatureCoinbase(chain_types::transparent::OutPoint, u32),

    /// An amount fell outside `[0, MAX_MONEY]`, or arithmetic on one overflowed.
    #[error("value out of range: {0}")]
    ValueOutOfRange(#[from] chain_types::amount::AmountError),

    /// A validated transaction's outputs exceed its inputs.
    #[error("transaction {0:?} spends more value than it receives")]
    ValueImbalance(chain_types::hash::Hash256),

    /// Coin selection could not reach `target + fee` from the available outpoints.
    #[error("insufficient funds: need {needed}, available {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// The underlying key-value store reported an I/O failure.
    #[error("storage failure: {0}")]
    StorageFailure(#[from] BoxError),

    /// A stored record failed to deserialize. Read paths downgrade this to
    /// `None`/absence and log; this variant exists for callers (like
    /// compaction or repair tools) that want to know corruption happened.
    #[error("corrupt data at key {0}")]
    CorruptData(String),
}

pub type Result<T> = std::result::Result<T, StateError>;
