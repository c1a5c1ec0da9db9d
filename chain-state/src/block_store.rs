//! Persists blocks keyed by height, with a reverse hash→height index and
//! chain-tip metadata (best hash, height, cumulative work).

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use chain_types::{block::Block, hash::Hash256, BitcoinDeserialize, BitcoinSerialize};
use primitive_types::U256;
use tracing::trace;

use crate::{
    error::{Result, StateError},
    kv::{BatchOp, KvStore, SledStore},
};

const BLOCK_PREFIX: u8 = b'b';
const HASH_INDEX_PREFIX: u8 = b'h';
const BEST_HASH_KEY: [u8; 1] = [b'B'];
const CHAIN_HEIGHT_KEY: [u8; 1] = [b'H'];
const TOTAL_WORK_KEY: [u8; 1] = [b'W'];

fn block_key(height: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(BLOCK_PREFIX);
    let mut be = [0u8; 4];
    BigEndian::write_u32(&mut be, height);
    key.extend_from_slice(&be);
    key
}

fn hash_index_key(hash: &Hash256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(HASH_INDEX_PREFIX);
    key.extend_from_slice(hash.as_bytes());
    key
}

/// Persists blocks keyed by height and tracks the current chain tip.
///
/// Key schema: `'b' || height_be(4)` for blocks, `'h' || hash(32)` for the
/// reverse index, and single-byte keys `'B'`/`'H'`/`'W'` for the tip. Height
/// is encoded big-endian in the primary key so ascending key order equals
/// ascending height; everything else uses little-endian.
pub struct BlockStore<S: KvStore = SledStore> {
    store: S,
}

impl BlockStore<SledStore> {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| StateError::StorageFailure(Box::new(e)))?;
        let tree = db.open_tree(b"blocks").map_err(|e| StateError::StorageFailure(Box::new(e)))?;
        Ok(BlockStore { store: SledStore::new(tree) })
    }
}

impl<S: KvStore> BlockStore<S> {
    pub fn with_store(store: S) -> Self {
        BlockStore { store }
    }

    /// Serializes `block` and, in a single batch, writes both the
    /// height-keyed block and the hash-keyed height index. Does not by
    /// itself advance the chain tip.
    pub fn write_block(&self, block: &Block, height: u32) -> Result<()> {
        let hash = block.hash();
        let bytes = block.bitcoin_serialize_to_vec().map_err(|e| StateError::StorageFailure(Box::new(e)))?;
        let mut height_le = [0u8; 4];
        LittleEndian::write_u32(&mut height_le, height);

        self.store.write_batch(vec![
            BatchOp::Put(block_key(height), bytes),
            BatchOp::Put(hash_index_key(&hash), height_le.to_vec()),
        ])?;
        trace!(height, %hash, "wrote block");
        metrics::counter!("state.block_store.blocks_written", 1);
        Ok(())
    }

    pub fn read_block(&self, height: u32) -> Result<Option<Block>> {
        let raw = self.store.read(&block_key(height))?;
        Ok(decode_block(raw, height))
    }

    pub fn read_block_by_hash(&self, hash: Hash256) -> Result<Option<Block>> {
        match self.get_block_height(hash)? {
            Some(height) => self.read_block(height),
            None => Ok(None),
        }
    }

    pub fn get_block_height(&self, hash: Hash256) -> Result<Option<u32>> {
        Ok(self.store.read(&hash_index_key(&hash))?.map(|bytes| LittleEndian::read_u32(&bytes)))
    }

    pub fn has_block(&self, hash: Hash256) -> Result<bool> {
        Ok(self.get_block_height(hash)?.is_some())
    }

    pub fn set_best_block_hash(&self, hash: Hash256) -> Result<()> {
        self.store.write(&BEST_HASH_KEY, hash.as_bytes())?;
        Ok(())
    }

    pub fn best_block_hash(&self) -> Result<Option<Hash256>> {
        Ok(self.store.read(&BEST_HASH_KEY)?.map(|bytes| {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&bytes);
            Hash256(arr)
        }))
    }

    pub fn set_chain_height(&self, height: u32) -> Result<()> {
        let mut le = [0u8; 4];
        LittleEndian::write_u32(&mut le, height);
        self.store.write(&CHAIN_HEIGHT_KEY, &le)?;
        Ok(())
    }

    pub fn chain_height(&self) -> Result<Option<u32>> {
        Ok(self.store.read(&CHAIN_HEIGHT_KEY)?.map(|bytes| LittleEndian::read_u32(&bytes)))
    }

    pub fn set_total_work(&self, work: U256) -> Result<()> {
        let mut le = [0u8; 32];
        work.to_little_endian(&mut le);
        self.store.write(&TOTAL_WORK_KEY, &le)?;
        Ok(())
    }

    pub fn total_work(&self) -> Result<Option<U256>> {
        Ok(self.store.read(&TOTAL_WORK_KEY)?.map(|bytes| U256::from_little_endian(&bytes)))
    }

    /// Reads the block to recover its hash, then atomically removes both the
    /// height-keyed block and the hash index.
    pub fn delete_block(&self, height: u32) -> Result<()> {
        let block = self.read_block(height)?;
        let mut ops = vec![BatchOp::Delete(block_key(height))];
        if let Some(block) = block {
            ops.push(BatchOp::Delete(hash_index_key(&block.hash())));
        }
        self.store.write_batch(ops)?;
        Ok(())
    }
}

fn decode_block(raw: Option<Vec<u8>>, height: u32) -> Option<Block> {
    let raw = raw?;
    match Block::bitcoin_deserialize(&raw[..]) {
        Ok(block) => Some(block),
        Err(e) => {
            tracing::warn!(height, error = %e, "corrupt block record, treating as absent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::block::Header;
    use chrono::{TimeZone, Utc};

    fn sample_block(nonce: u32) -> Block {
        Block {
            header: Header::new(
                1,
                Hash256([0; 32]),
                Hash256([1; 32]),
                Utc.timestamp_opt(1_600_000_000, 0).single().unwrap(),
                0x1d00ffff,
                nonce,
            ),
            transactions: vec![],
        }
    }

    fn temp_store() -> BlockStore<SledStore> {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let tree = db.open_tree(b"blocks").unwrap();
        BlockStore::with_store(SledStore::new(tree))
    }

    #[test]
    fn write_then_read_by_height_and_hash() {
        let store = temp_store();
        let block = sample_block(1);
        let hash = block.hash();

        store.write_block(&block, 5).unwrap();

        assert_eq!(store.read_block(5).unwrap(), Some(block.clone()));
        assert_eq!(store.read_block_by_hash(hash).unwrap(), Some(block));
        assert_eq!(store.get_block_height(hash).unwrap(), Some(5));
        assert!(store.has_block(hash).unwrap());
    }

    #[test]
    fn absent_height_is_none_not_error() {
        let store = temp_store();
        assert_eq!(store.read_block(42).unwrap(), None);
    }

    #[test]
    fn tip_metadata_round_trips() {
        let store = temp_store();
        let hash = Hash256([9; 32]);
        store.set_best_block_hash(hash).unwrap();
        store.set_chain_height(100).unwrap();
        store.set_total_work(U256::from(12345)).unwrap();

        assert_eq!(store.best_block_hash().unwrap(), Some(hash));
        assert_eq!(store.chain_height().unwrap(), Some(100));
        assert_eq!(store.total_work().unwrap(), Some(U256::from(12345)));
    }

    #[test]
    fn delete_removes_both_records() {
        let store = temp_store();
        let block = sample_block(7);
        let hash = block.hash();
        store.write_block(&block, 3).unwrap();

        store.delete_block(3).unwrap();

        assert_eq!(store.read_block(3).unwrap(), None);
        assert_eq!(store.get_block_height(hash).unwrap(), None);
    }

    #[test]
    fn ascending_height_keys_scan_in_order() {
        let store = temp_store();
        store.write_block(&sample_block(1), 10).unwrap();
        store.write_block(&sample_block(2), 2).unwrap();
        store.write_block(&sample_block(3), 256).unwrap();

        let scanned = store.store.scan_prefix(&[BLOCK_PREFIX]).unwrap();
        let heights: Vec<u32> = scanned.iter().map(|(k, _)| BigEndian::read_u32(&k[1..])).collect();
        assert_eq!(heights, vec![2, 10, 256]);
    }
}
