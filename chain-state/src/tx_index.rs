//! Persists tx-id → (height, position-in-block) and outpoint → output, with
//! an address → outpoints secondary index and a maintained UTXO count.

use byteorder::{ByteOrder, LittleEndian};
use chain_types::{
    hash::{Hash160, Hash256},
    transaction::Transaction,
    transparent::{OutPoint, Output},
    BitcoinDeserialize, BitcoinSerialize,
};
use tracing::trace;

use crate::{
    error::{Result, StateError},
    kv::{BatchOp, KvStore, SledStore},
};

const TX_LOCATION_PREFIX: u8 = b't';
const UTXO_PREFIX: u8 = b'u';
const ADDRESS_PREFIX: u8 = b'a';
const UTXO_COUNT_KEY: [u8; 1] = [b'c'];

/// Where a transaction's raw bytes live inside the block store: its block's
/// height, and its position within that block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TxLocation {
    pub height: u32,
    pub tx_index_in_block: u32,
}

/// One pending mutation for [`TxIndex::apply_utxo_batch`].
pub enum UtxoBatchOp {
    Add(OutPoint, Output),
    Remove(OutPoint),
}

fn tx_location_key(txid: Hash256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(TX_LOCATION_PREFIX);
    key.extend_from_slice(txid.as_bytes());
    key
}

fn utxo_key(outpoint: &OutPoint) -> Vec<u8> {
    let mut key = Vec::with_capacity(37);
    key.push(UTXO_PREFIX);
    key.extend_from_slice(outpoint.hash.as_bytes());
    let mut vout_le = [0u8; 4];
    LittleEndian::write_u32(&mut vout_le, outpoint.index);
    key.extend_from_slice(&vout_le);
    key
}

fn address_key(address: &Hash160, outpoint: &OutPoint) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 20 + 36);
    key.push(ADDRESS_PREFIX);
    key.extend_from_slice(&address.0);
    key.extend_from_slice(outpoint.hash.as_bytes());
    let mut vout_le = [0u8; 4];
    LittleEndian::write_u32(&mut vout_le, outpoint.index);
    key.extend_from_slice(&vout_le);
    key
}

fn address_prefix(address: &Hash160) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(ADDRESS_PREFIX);
    key.extend_from_slice(&address.0);
    key
}

pub struct TxIndex<S: KvStore = SledStore> {
    store: S,
}

impl TxIndex<SledStore> {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| StateError::StorageFailure(Box::new(e)))?;
        let tree = db.open_tree(b"txindex").map_err(|e| StateError::StorageFailure(Box::new(e)))?;
        Ok(TxIndex { store: SledStore::new(tree) })
    }
}

impl<S: KvStore> TxIndex<S> {
    pub fn with_store(store: S) -> Self {
        TxIndex { store }
    }

    pub fn index_transaction(&self, tx: &Transaction, height: u32, tx_index: u32) -> Result<()> {
        let mut value = [0u8; 8];
        LittleEndian::write_u32(&mut value[0..4], height);
        LittleEndian::write_u32(&mut value[4..8], tx_index);
        self.store.write(&tx_location_key(tx.hash()), &value)?;
        Ok(())
    }

    pub fn get_tx_location(&self, txid: Hash256) -> Result<Option<TxLocation>> {
        Ok(self.store.read(&tx_location_key(txid))?.map(|bytes| TxLocation {
            height: LittleEndian::read_u32(&bytes[0..4]),
            tx_index_in_block: LittleEndian::read_u32(&bytes[4..8]),
        }))
    }

    /// Writes both the primary `'u'` entry and the `'a'` secondary index (if
    /// the output's script classifies to an address), then increments the
    /// UTXO counter.
    pub fn add_utxo(&self, outpoint: &OutPoint, output: &Output) -> Result<()> {
        self.apply_utxo_batch(vec![UtxoBatchOp::Add(*outpoint, output.clone())])
    }

    /// Reads the primary entry to recover the address (it can't be inferred
    /// from the key alone), then atomically deletes both records and
    /// decrements the UTXO counter.
    pub fn remove_utxo(&self, outpoint: &OutPoint) -> Result<()> {
        self.apply_utxo_batch(vec![UtxoBatchOp::Remove(*outpoint)])
    }

    /// Atomically applies a set of additions and removals; the net delta
    /// updates the UTXO counter after the batch commits.
    pub fn apply_utxo_batch(&self, ops: Vec<UtxoBatchOp>) -> Result<()> {
        let mut kv_ops = Vec::with_capacity(ops.len() * 2);
        let mut delta: i64 = 0;

        for op in &ops {
            match op {
                UtxoBatchOp::Add(outpoint, output) => {
                    let bytes = output.bitcoin_serialize_to_vec().map_err(|e| StateError::StorageFailure(Box::new(e)))?;
                    kv_ops.push(BatchOp::Put(utxo_key(outpoint), bytes.clone()));
                    if let Some(address) = output.address() {
                        kv_ops.push(BatchOp::Put(address_key(&address, outpoint), bytes));
                    }
                    delta += 1;
                }
                UtxoBatchOp::Remove(outpoint) => {
                    if let Some(raw) = self.store.read(&utxo_key(outpoint))? {
                        kv_ops.push(BatchOp::Delete(utxo_key(outpoint)));
                        if let Ok(output) = Output::bitcoin_deserialize(&raw[..]) {
                            if let Some(address) = output.address() {
                                kv_ops.push(BatchOp::Delete(address_key(&address, outpoint)));
                            }
                        }
                        delta -= 1;
                    }
                }
            }
        }

        let current_count = self.get_utxo_set_size()?;
        let new_count = (current_count as i64 + delta).max(0) as u64;
        let mut count_le = [0u8; 8];
        LittleEndian::write_u64(&mut count_le, new_count);
        kv_ops.push(BatchOp::Put(UTXO_COUNT_KEY.to_vec(), count_le.to_vec()));

        self.store.write_batch(kv_ops)?;
        trace!(applied = ops.len(), new_count, "applied utxo batch");
        metrics::gauge!("state.tx_index.utxo_count", new_count as f64);
        Ok(())
    }

    pub fn get_utxo(&self, outpoint: &OutPoint) -> Result<Option<Output>> {
        match self.store.read(&utxo_key(outpoint))? {
            Some(raw) => match Output::bitcoin_deserialize(&raw[..]) {
                Ok(output) => Ok(Some(output)),
                Err(e) => {
                    tracing::warn!(?outpoint, error = %e, "corrupt utxo record, treating as absent");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Seeks to `'a' || addr` and yields every entry whose key begins with
    /// that prefix, decoding the outpoint from the key suffix and the output
    /// from the value.
    pub fn get_utxo_for_address(&self, address: &Hash160) -> Result<Vec<(OutPoint, Output)>> {
        let mut results = Vec::new();
        for (key, value) in self.store.scan_prefix(&address_prefix(address))? {
            // key = 'a' || address(20) || txid(32) || vout_le(4)
            let txid_start = 21;
            let mut txid = [0u8; 32];
            txid.copy_from_slice(&key[txid_start..txid_start + 32]);
            let index = LittleEndian::read_u32(&key[txid_start + 32..txid_start + 36]);
            let outpoint = OutPoint::new(Hash256(txid), index);
            match Output::bitcoin_deserialize(&value[..]) {
                Ok(output) => results.push((outpoint, output)),
                Err(e) => tracing::warn!(?outpoint, error = %e, "corrupt utxo record in address index"),
            }
        }
        Ok(results)
    }

    pub fn get_utxo_set_size(&self) -> Result<u64> {
        Ok(self.store.read(&UTXO_COUNT_KEY)?.map(|bytes| LittleEndian::read_u64(&bytes)).unwrap_or(0))
    }

    /// Scans every `'u'`-prefixed record, decoding the outpoint from the key
    /// and the output from the value. Used to rebuild the in-memory UTXO set
    /// on startup; corrupt records are skipped and logged rather than
    /// failing the whole scan.
    pub fn iter_utxos(&self) -> Result<Vec<(OutPoint, Output)>> {
        let mut results = Vec::new();
        for (key, value) in self.store.scan_prefix(&[UTXO_PREFIX])? {
            let mut txid = [0u8; 32];
            txid.copy_from_slice(&key[1..33]);
            let index = LittleEndian::read_u32(&key[33..37]);
            let outpoint = OutPoint::new(Hash256(txid), index);
            match Output::bitcoin_deserialize(&value[..]) {
                Ok(output) => results.push((outpoint, output)),
                Err(e) => tracing::warn!(?outpoint, error = %e, "corrupt utxo record, skipping during scan"),
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::{transparent::Script, Amount};

    fn temp_index() -> TxIndex<SledStore> {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let tree = db.open_tree(b"txindex").unwrap();
        TxIndex::with_store(SledStore::new(tree))
    }

    fn p2pkh_script(byte: u8) -> Script {
        let mut bytes = vec![0x76, 0xa9, 0x14];
        bytes.extend_from_slice(&[byte; 20]);
        bytes.extend_from_slice(&[0x88, 0xac]);
        Script(bytes)
    }

    #[test]
    fn add_then_get_utxo() {
        let index = temp_index();
        let outpoint = OutPoint::new(Hash256([1; 32]), 0);
        let output = Output { value: Amount::try_new(1000).unwrap(), lock_script: p2pkh_script(0xAA) };

        index.add_utxo(&outpoint, &output).unwrap();

        assert_eq!(index.get_utxo(&outpoint).unwrap(), Some(output));
        assert_eq!(index.get_utxo_set_size().unwrap(), 1);
    }

    #[test]
    fn address_index_reachable_and_consistent() {
        let index = temp_index();
        let outpoint = OutPoint::new(Hash256([2; 32]), 0);
        let output = Output { value: Amount::try_new(500).unwrap(), lock_script: p2pkh_script(0xBB) };
        index.add_utxo(&outpoint, &output).unwrap();

        let address = output.address().unwrap();
        let found = index.get_utxo_for_address(&address).unwrap();
        assert_eq!(found, vec![(outpoint, output)]);
    }

    #[test]
    fn remove_utxo_cleans_both_records_and_decrements_count() {
        let index = temp_index();
        let outpoint = OutPoint::new(Hash256([3; 32]), 0);
        let output = Output { value: Amount::try_new(750).unwrap(), lock_script: p2pkh_script(0xCC) };
        let address = output.address().unwrap();
        index.add_utxo(&outpoint, &output).unwrap();

        index.remove_utxo(&outpoint).unwrap();

        assert_eq!(index.get_utxo(&outpoint).unwrap(), None);
        assert_eq!(index.get_utxo_for_address(&address).unwrap(), vec![]);
        assert_eq!(index.get_utxo_set_size().unwrap(), 0);
    }

    #[test]
    fn utxo_count_matches_number_of_primary_entries() {
        let index = temp_index();
        for i in 0..5u8 {
            let outpoint = OutPoint::new(Hash256([i; 32]), 0);
            let output = Output { value: Amount::try_new(1).unwrap(), lock_script: Script(vec![]) };
            index.add_utxo(&outpoint, &output).unwrap();
        }
        assert_eq!(index.get_utxo_set_size().unwrap(), 5);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir::TempDir::new("txindex").unwrap();
        {
            let index = TxIndex::open(dir.path()).unwrap();
            for i in 0..1000u32 {
                let mut hash = [0u8; 32];
                hash[..4].copy_from_slice(&i.to_le_bytes());
                let outpoint = OutPoint::new(Hash256(hash), 0);
                let output = Output { value: Amount::try_new(1).unwrap(), lock_script: Script(vec![]) };
                index.add_utxo(&outpoint, &output).unwrap();
            }
        }
        let reopened = TxIndex::open(dir.path()).unwrap();
        assert_eq!(reopened.get_utxo_set_size().unwrap(), 1000);
    }
}
