//! In-memory reference backend
//!
//! An ordered `BTreeMap` behind a `parking_lot::RwLock`. Cursors are live
//! views (see `cursor`), batches stage writes locally and apply them under a
//! single write lock so a commit is all-or-nothing to readers.
//!
//! An optional value size limit turns oversized writes into explicit
//! `WriteError`s, which is the behaviour the harness expects from a healthy
//! backend that cannot hold a payload.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use kvprobe_core::{Backend, Batch, Cursor, Store, StoreError, StoreResult};

use crate::cursor::{LiveCursor, SharedMap};

/// Backend producing independent in-memory stores
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    max_value_size: Option<usize>,
}

impl MemoryBackend {
    /// Create a backend with no value size limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject values larger than `limit` bytes
    pub fn with_max_value_size(mut self, limit: usize) -> Self {
        self.max_value_size = Some(limit);
        self
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(&self, location: &Path) -> StoreResult<Arc<dyn Store>> {
        if !location.is_dir() {
            return Err(StoreError::open(format!(
                "location '{}' is not a directory",
                location.display()
            )));
        }
        debug!(target: "kvprobe::storage", path = %location.display(), "Opened memory store");
        Ok(Arc::new(MemoryStore {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
            max_value_size: self.max_value_size,
        }))
    }
}

/// A single in-memory store
pub struct MemoryStore {
    data: SharedMap<Vec<u8>>,
    closed: Arc<AtomicBool>,
    max_value_size: Option<usize>,
}

impl MemoryStore {
    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::write("store is closed"));
        }
        Ok(())
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

fn check_value_size(limit: Option<usize>, value: &[u8]) -> StoreResult<()> {
    match limit {
        Some(limit) if value.len() > limit => Err(StoreError::overflow("value", value.len(), limit)),
        _ => Ok(()),
    }
}

impl Store for MemoryStore {
    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.check_open()?;
        check_value_size(self.max_value_size, value)?;
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.check_open()?;
        self.data.write().remove(key);
        Ok(())
    }

    fn batch(&self) -> StoreResult<Box<dyn Batch>> {
        self.check_open()?;
        Ok(Box::new(MemoryBatch {
            data: Arc::clone(&self.data),
            closed: Arc::clone(&self.closed),
            max_value_size: self.max_value_size,
            staged: Vec::new(),
            released: false,
        }))
    }

    fn iterate(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> StoreResult<Box<dyn Cursor>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::iterate("store is closed"));
        }
        Ok(Box::new(LiveCursor::open(
            Arc::clone(&self.data),
            Arc::clone(&self.closed),
            start,
            end,
        )))
    }

    fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StoreError::close("store already closed"));
        }
        Ok(())
    }
}

struct MemoryBatch {
    data: SharedMap<Vec<u8>>,
    closed: Arc<AtomicBool>,
    max_value_size: Option<usize>,
    staged: Vec<(Vec<u8>, Vec<u8>)>,
    released: bool,
}

impl Batch for MemoryBatch {
    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        if self.released {
            return Err(StoreError::write("batch is closed"));
        }
        check_value_size(self.max_value_size, value)?;
        self.staged.push((key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn commit(&mut self, _durable: bool) -> StoreResult<()> {
        if self.released {
            return Err(StoreError::write("batch is closed"));
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::write("store is closed"));
        }
        let mut data = self.data.write();
        for (key, value) in self.staged.drain(..) {
            data.insert(key, value);
        }
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        self.released = true;
        self.staged.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn count(store: &dyn Store) -> usize {
        let mut cursor = store.iterate(None, None).unwrap();
        let mut n = 0;
        while cursor.valid() {
            n += 1;
            cursor.advance().unwrap();
        }
        cursor.close().unwrap();
        n
    }

    #[test]
    fn test_open_requires_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = MemoryBackend::new().open(&missing).err().unwrap();
        assert_eq!(err.class(), "OpenError");
    }

    #[test]
    fn test_set_delete_visible_to_iteration() {
        let dir = tempdir().unwrap();
        let store = MemoryBackend::new().open(dir.path()).unwrap();
        store.set(b"k1", b"v1").unwrap();
        store.set(b"k2", b"v2").unwrap();
        store.set(b"k1", b"v3").unwrap();
        assert_eq!(count(store.as_ref()), 2);
        store.delete(b"k1").unwrap();
        store.delete(b"missing").unwrap();
        assert_eq!(count(store.as_ref()), 1);
        store.close().unwrap();
    }

    #[test]
    fn test_value_limit_rejects_with_write_error() {
        let dir = tempdir().unwrap();
        let store = MemoryBackend::new()
            .with_max_value_size(8)
            .open(dir.path())
            .unwrap();
        assert!(store.set(b"k", &[0u8; 8]).is_ok());
        let err = store.set(b"k2", &[0u8; 9]).unwrap_err();
        assert!(matches!(err, StoreError::Write(_)));
        assert_eq!(count(store.as_ref()), 1);
    }

    #[test]
    fn test_batch_invisible_until_commit() {
        let dir = tempdir().unwrap();
        let store = MemoryBackend::new().open(dir.path()).unwrap();
        let mut batch = store.batch().unwrap();
        for i in 0..10u8 {
            batch.set(&[i], b"v").unwrap();
        }
        assert_eq!(count(store.as_ref()), 0);
        batch.commit(true).unwrap();
        batch.close().unwrap();
        assert_eq!(count(store.as_ref()), 10);
    }

    #[test]
    fn test_closed_batch_drops_staged_writes() {
        let dir = tempdir().unwrap();
        let store = MemoryBackend::new().open(dir.path()).unwrap();
        let mut batch = store.batch().unwrap();
        batch.set(b"a", b"v").unwrap();
        batch.close().unwrap();
        assert!(batch.commit(false).is_err());
        assert_eq!(count(store.as_ref()), 0);
    }

    #[test]
    fn test_operations_after_close_fail_cleanly() {
        let dir = tempdir().unwrap();
        let store = MemoryBackend::new().open(dir.path()).unwrap();
        store.close().unwrap();
        assert!(store.set(b"k", b"v").is_err());
        assert!(store.iterate(None, None).is_err());
        assert!(matches!(store.close(), Err(StoreError::Close(_))));
    }
}
