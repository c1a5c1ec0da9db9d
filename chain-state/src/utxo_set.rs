//! The authoritative in-memory UTXO set, its address index, and the bounded
//! read-through cache that sits above it.
//!
//! Both own their state behind a single exclusive lock (§5's concurrency
//! model): the set is compact, operations are short, and write-heavy
//! workloads (block application) dominate, so one mutex per structure keeps
//! the implementation simple without sacrificing throughput.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use chain_types::{
    amount::{Amount, COINBASE_MATURITY},
    hash::Hash160,
    transaction::Transaction,
    transparent::{Input, OutPoint, Output},
};
use tracing::{debug, trace};

use crate::error::{Result, StateError};

/// The indivisible unit stored in the UTXO set: an output, the height it was
/// created at, and whether it came from a coinbase transaction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UtxoEntry {
    pub output: Output,
    pub height: u32,
    pub is_coinbase: bool,
}

impl UtxoEntry {
    pub fn is_mature(&self, current_height: u32) -> bool {
        if !self.is_coinbase {
            return true;
        }
        current_height.saturating_sub(self.height) >= COINBASE_MATURITY
    }

    /// A spendable output is one whose coinbase maturity (if applicable) has
    /// been reached; non-coinbase outputs are always spendable.
    pub fn is_spendable(&self, current_height: u32) -> bool {
        self.is_mature(current_height)
    }
}

/// Counts and sums derivable from a single pass over the UTXO set.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    pub total_entries: usize,
    pub coinbase_entries: usize,
    pub regular_entries: usize,
    pub mature_entries: usize,
    pub immature_entries: usize,
    pub total_value: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<OutPoint, UtxoEntry>,
    address_index: HashMap<Hash160, HashSet<OutPoint>>,
}

impl Inner {
    fn insert(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        if let Some(address) = entry.output.address() {
            self.address_index.entry(address).or_default().insert(outpoint);
        }
        self.entries.insert(outpoint, entry);
    }

    fn remove(&mut self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        let entry = self.entries.remove(outpoint)?;
        if let Some(address) = entry.output.address() {
            if let Some(set) = self.address_index.get_mut(&address) {
                set.remove(outpoint);
                if set.is_empty() {
                    self.address_index.remove(&address);
                }
            }
        }
        Some(entry)
    }
}

/// The authoritative in-memory UTXO set.
pub struct UtxoSet {
    inner: Mutex<Inner>,
}

impl Default for UtxoSet {
    fn default() -> Self {
        UtxoSet::new()
    }
}

impl UtxoSet {
    pub fn new() -> Self {
        UtxoSet { inner: Mutex::new(Inner::default()) }
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        self.inner.lock().unwrap().entries.get(outpoint).cloned()
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.inner.lock().unwrap().entries.contains_key(outpoint)
    }

    pub fn get_utxos_for_address(&self, address: &Hash160) -> Vec<OutPoint> {
        self.inner.lock().unwrap().address_index.get(address).map(|set| set.iter().copied().collect()).unwrap_or_default()
    }

    /// Validates that every input exists and is spendable at `current_height`
    /// (coinbase maturity enforced), then that inputs cover outputs.
    /// Coinbase transactions are unconditionally valid at this layer.
    pub fn validate(&self, tx: &Transaction, current_height: u32) -> Result<()> {
        if tx.is_coinbase() {
            return Ok(());
        }
        let inner = self.inner.lock().unwrap();
        let mut total_in = Amount::ZERO;
        for input in &tx.inputs {
            let outpoint = match input {
                Input::PrevOut { outpoint, .. } => outpoint,
                Input::Coinbase { .. } => unreachable!("non-coinbase tx can't contain a coinbase input"),
            };
            let entry = inner.entries.get(outpoint).ok_or(StateError::MissingInput(*outpoint))?;
            if !entry.is_spendable(current_height) {
                return Err(StateError::ImmatureCoinbase(*outpoint, entry.height));
            }
            total_in = total_in.checked_add(entry.output.value)?;
        }
        let total_out = tx.output_value()?;
        if total_in.as_u64() < total_out.as_u64() {
            return Err(StateError::ValueImbalance(tx.hash()));
        }
        Ok(())
    }

    /// Applies `tx` at `height`: removes spent inputs (scrubbing the address
    /// index), then inserts the transaction's outputs. Returns the entries
    /// removed, which the caller must retain to later `revert` this call.
    ///
    /// Inputs are validated against the current state before any mutation,
    /// so a `MissingInput` failure leaves the set untouched.
    pub fn apply(&self, tx: &Transaction, height: u32) -> Result<HashMap<OutPoint, UtxoEntry>> {
        let mut inner = self.inner.lock().unwrap();

        let mut previous = HashMap::new();
        if !tx.is_coinbase() {
            for input in &tx.inputs {
                let outpoint = match input {
                    Input::PrevOut { outpoint, .. } => *outpoint,
                    Input::Coinbase { .. } => unreachable!("non-coinbase tx can't contain a coinbase input"),
                };
                if !inner.entries.contains_key(&outpoint) {
                    return Err(StateError::MissingInput(outpoint));
                }
                previous.insert(outpoint, inner.entries[&outpoint].clone());
            }
            for outpoint in previous.keys() {
                inner.remove(outpoint);
            }
        }

        let txid = tx.hash();
        let is_coinbase = tx.is_coinbase();
        for (i, output) in tx.outputs.iter().enumerate() {
            let outpoint = OutPoint::new(txid, i as u32);
            inner.insert(outpoint, UtxoEntry { output: output.clone(), height, is_coinbase });
        }

        trace!(%txid, height, inputs = previous.len(), outputs = tx.outputs.len(), "applied transaction");
        metrics::gauge!("state.utxo_set.size", inner.entries.len() as f64);
        Ok(previous)
    }

    /// Removes the outputs `tx` introduced, then restores each input's prior
    /// entry from `previous_utxos` (captured by the matching `apply` call).
    pub fn revert(&self, tx: &Transaction, previous_utxos: &HashMap<OutPoint, UtxoEntry>) {
        let mut inner = self.inner.lock().unwrap();

        let txid = tx.hash();
        for i in 0..tx.outputs.len() {
            inner.remove(&OutPoint::new(txid, i as u32));
        }
        for (outpoint, entry) in previous_utxos {
            inner.insert(*outpoint, entry.clone());
        }
        debug!(%txid, "reverted transaction");
        metrics::gauge!("state.utxo_set.size", inner.entries.len() as f64);
    }

    pub fn stats(&self, current_height: u32) -> Stats {
        let inner = self.inner.lock().unwrap();
        let mut stats = Stats { total_entries: inner.entries.len(), ..Stats::default() };
        for entry in inner.entries.values() {
            if entry.is_coinbase {
                stats.coinbase_entries += 1;
            } else {
                stats.regular_entries += 1;
            }
            if entry.is_mature(current_height) {
                stats.mature_entries += 1;
            } else {
                stats.immature_entries += 1;
            }
            stats.total_value += entry.output.value.as_u64();
        }
        stats
    }

    pub fn total_value(&self) -> u64 {
        self.inner.lock().unwrap().entries.values().map(|e| e.output.value.as_u64()).sum()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.address_index.clear();
    }

    /// Inserts an entry recovered from the persistent tx index during
    /// startup, bypassing `apply`'s input-removal and validation logic
    /// (there is no transaction being applied, only a record being loaded).
    pub fn insert_loaded(&self, outpoint: OutPoint, entry: UtxoEntry) {
        self.inner.lock().unwrap().insert(outpoint, entry);
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<OutPoint, UtxoEntry>,
    hits: u64,
    misses: u64,
}

/// A bounded read-through cache over a [`UtxoSet`].
///
/// On a miss, queries the base set and, if under `capacity`, caches a copy.
/// Once full, misses are served from the base set without displacing cached
/// entries — there is no eviction policy. A mutation of the base set that
/// should invalidate a cached entry is the caller's responsibility; see
/// [`UtxoCache::invalidate`].
pub struct UtxoCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl UtxoCache {
    pub fn new(capacity: usize) -> Self {
        UtxoCache { capacity, inner: Mutex::new(CacheInner::default()) }
    }

    pub fn get(&self, outpoint: &OutPoint, base: &UtxoSet) -> Option<UtxoEntry> {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(entry) = inner.entries.get(outpoint).cloned() {
                inner.hits += 1;
                return Some(entry);
            }
            inner.misses += 1;
        }

        let entry = base.get(outpoint)?;
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.len() < self.capacity {
            inner.entries.insert(*outpoint, entry.clone());
        }
        Some(entry)
    }

    /// Drops a single cached entry. Callers must call this after mutating
    /// the base set's entry at `outpoint`, or the cache could keep serving
    /// stale data for it.
    pub fn invalidate(&self, outpoint: &OutPoint) {
        self.inner.lock().unwrap().entries.remove(outpoint);
    }

    /// Empties the cached entries, leaving the hit/miss counters untouched.
    pub fn flush(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
    }

    /// Empties the cache AND resets the hit/miss counters, distinct from
    /// [`UtxoCache::flush`].
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    pub fn hits(&self) -> u64 {
        self.inner.lock().unwrap().hits
    }

    pub fn misses(&self) -> u64 {
        self.inner.lock().unwrap().misses
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::transparent::{CoinbaseData, Script};

    fn coinbase_tx(value: u64) -> Transaction {
        Transaction::new(
            1,
            vec![Input::Coinbase { height: None, data: CoinbaseData(vec![1]), sequence: 0xffff_ffff }],
            vec![Output { value: Amount::try_new(value).unwrap(), lock_script: Script(vec![]) }],
            0,
        )
    }

    fn spend(outpoint: OutPoint, outputs: Vec<Output>) -> Transaction {
        Transaction::new(
            1,
            vec![Input::PrevOut { outpoint, unlock_script: Script(vec![]), sequence: 0xffff_ffff }],
            outputs,
            0,
        )
    }

    #[test]
    fn genesis_coinbase_then_immature_then_mature() {
        let set = UtxoSet::new();
        let t0 = coinbase_tx(50_0000_0000);
        set.apply(&t0, 0).unwrap();

        assert_eq!(set.len(), 1);
        let outpoint = OutPoint::new(t0.hash(), 0);
        let spend_t0 = spend(outpoint, vec![Output { value: Amount::try_new(1).unwrap(), lock_script: Script(vec![]) }]);

        assert!(matches!(set.validate(&spend_t0, 0), Err(StateError::ImmatureCoinbase(_, _))));
        assert!(set.validate(&spend_t0, 100).is_ok());
    }

    #[test]
    fn apply_then_revert_restores_prior_state() {
        let set = UtxoSet::new();
        let t0 = coinbase_tx(50_0000_0000);
        set.apply(&t0, 0).unwrap();

        let outpoint = OutPoint::new(t0.hash(), 0);
        let t1 = spend(
            outpoint,
            vec![
                Output { value: Amount::try_new(40_0000_0000).unwrap(), lock_script: Script(vec![]) },
                Output { value: Amount::try_new(9_0000_0000).unwrap(), lock_script: Script(vec![]) },
            ],
        );
        let previous = set.apply(&t1, 101).unwrap();
        assert_eq!(set.len(), 2);

        set.revert(&t1, &previous);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&outpoint));
    }

    #[test]
    fn double_spend_rejected_and_state_unchanged() {
        let set = UtxoSet::new();
        let t0 = coinbase_tx(50_0000_0000);
        set.apply(&t0, 0).unwrap();
        let outpoint = OutPoint::new(t0.hash(), 0);

        let t1 = spend(outpoint, vec![Output { value: Amount::try_new(1).unwrap(), lock_script: Script(vec![]) }]);
        set.apply(&t1, 101).unwrap();

        let t2 = spend(outpoint, vec![Output { value: Amount::try_new(1).unwrap(), lock_script: Script(vec![]) }]);
        let before = set.len();
        assert!(matches!(set.apply(&t2, 101), Err(StateError::MissingInput(_))));
        assert_eq!(set.len(), before);
    }

    #[test]
    fn cache_serves_hits_without_touching_base_again() {
        let set = UtxoSet::new();
        let t0 = coinbase_tx(1000);
        set.apply(&t0, 0).unwrap();
        let outpoint = OutPoint::new(t0.hash(), 0);

        let cache = UtxoCache::new(10);
        assert!(cache.get(&outpoint, &set).is_some());
        assert_eq!(cache.misses(), 1);
        assert!(cache.get(&outpoint, &set).is_some());
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn cache_at_capacity_stops_inserting_but_keeps_serving() {
        let set = UtxoSet::new();
        let cache = UtxoCache::new(1);

        let t0 = coinbase_tx(1000);
        set.apply(&t0, 0).unwrap();
        let a = OutPoint::new(t0.hash(), 0);
        cache.get(&a, &set).unwrap();
        assert_eq!(cache.len(), 1);

        let t1 = coinbase_tx(2000);
        set.apply(&t1, 0).unwrap();
        let b = OutPoint::new(t1.hash(), 0);
        assert!(cache.get(&b, &set).is_some());
        assert_eq!(cache.len(), 1, "cache at capacity must not evict to admit a new entry");
    }

    #[test]
    fn stats_count_mature_and_immature() {
        let set = UtxoSet::new();
        let t0 = coinbase_tx(1000);
        set.apply(&t0, 0).unwrap();

        let stats = set.stats(0);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.coinbase_entries, 1);
        assert_eq!(stats.immature_entries, 1);

        let stats = set.stats(100);
        assert_eq!(stats.mature_entries, 1);
    }
}
