//! The durable ordered key-value contract that the block store and tx index
//! are built on.
//!
//! The rest of this crate encodes all consensus structure into keys and
//! values; the store itself knows nothing about blocks, outputs, or chains.
//! That separation is what keeps block/tx-index logic testable against an
//! in-memory `sled` database instead of a real one on disk.

use crate::BoxError;

/// A `(key, value)` pair as returned by [`KvStore::scan_prefix`].
pub type KvEntry = (Vec<u8>, Vec<u8>);

/// A single mutation in a [`KvStore::write_batch`] call.
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// A durable, ordered key-value engine.
///
/// Backed by [`sled`]; callers never see `sled` types directly so that a
/// different engine could stand in without touching the block store or tx
/// index logic above this trait.
pub trait KvStore: Send + Sync {
    fn write(&self, key: &[u8], value: &[u8]) -> Result<(), BoxError>;
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BoxError>;
    fn delete(&self, key: &[u8]) -> Result<(), BoxError>;
    fn exists(&self, key: &[u8]) -> Result<bool, BoxError> {
        Ok(self.read(key)?.is_some())
    }

    /// Atomically applies a mixed sequence of puts and deletes.
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), BoxError>;

    /// Returns every `(key, value)` pair whose key starts with `prefix`, in
    /// ascending key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvEntry>, BoxError>;

    /// Best-effort reclamation of obsolete storage.
    fn compact(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// A [`KvStore`] backed by a single [`sled::Tree`].
pub struct SledStore {
    tree: sled::Tree,
}

impl SledStore {
    pub fn new(tree: sled::Tree) -> Self {
        SledStore { tree }
    }
}

impl KvStore for SledStore {
    fn write(&self, key: &[u8], value: &[u8]) -> Result<(), BoxError> {
        self.tree.insert(key, value)?;
        Ok(())
    }

    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(self.tree.get(key)?.map(|ivec| ivec.to_vec()))
    }

    fn delete(&self, key: &[u8]) -> Result<(), BoxError> {
        self.tree.remove(key)?;
        Ok(())
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), BoxError> {
        let mut batch = sled::Batch::default();
        for op in ops {
            match op {
                BatchOp::Put(k, v) => batch.insert(k, v),
                BatchOp::Delete(k) => batch.remove(k),
            }
        }
        self.tree.apply_batch(batch)?;
        // sled batches are durable once applied; force a flush so that a
        // crash immediately after this call cannot observe a partial batch.
        self.tree.flush()?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvEntry>, BoxError> {
        let mut out = Vec::new();
        for entry in self.tree.scan_prefix(prefix) {
            let (k, v) = entry?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    fn compact(&self) -> Result<(), BoxError> {
        // sled reclaims space automatically; there is no explicit compaction
        // knob to call into here.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> SledStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        SledStore::new(db.open_tree(b"test").unwrap())
    }

    #[test]
    fn write_read_delete_roundtrip() {
        let store = temp_store();
        assert_eq!(store.read(b"k").unwrap(), None);
        store.write(b"k", b"v").unwrap();
        assert_eq!(store.read(b"k").unwrap(), Some(b"v".to_vec()));
        assert!(store.exists(b"k").unwrap());
        store.delete(b"k").unwrap();
        assert_eq!(store.read(b"k").unwrap(), None);
    }

    #[test]
    fn batch_is_all_or_nothing_on_success() {
        let store = temp_store();
        store
            .write_batch(vec![
                BatchOp::Put(b"a".to_vec(), b"1".to_vec()),
                BatchOp::Put(b"b".to_vec(), b"2".to_vec()),
            ])
            .unwrap();
        assert_eq!(store.read(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.read(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn prefix_scan_is_ordered() {
        let store = temp_store();
        store.write(b"a1", b"x").unwrap();
        store.write(b"a2", b"y").unwrap();
        store.write(b"b1", b"z").unwrap();
        let scanned = store.scan_prefix(b"a").unwrap();
        assert_eq!(scanned, vec![(b"a1".to_vec(), b"x".to_vec()), (b"a2".to_vec(), b"y".to_vec())]);
    }
}
