//! Live-view cursor shared by the reference backends
//!
//! The cursor never holds a lock between calls. Each `advance` re-seeks to
//! the first key strictly greater than the last key it yielded, so deleting
//! the current key (or any other key) between advances cannot make it skip
//! or revisit entries.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use kvprobe_core::{Cursor, StoreError, StoreResult};

/// Ordered map shared between a store and its cursors
pub(crate) type SharedMap<V> = Arc<RwLock<BTreeMap<Vec<u8>, V>>>;

/// Cursor over a `SharedMap`, bounded to `[start, end)`
pub(crate) struct LiveCursor<V> {
    data: SharedMap<V>,
    store_closed: Arc<AtomicBool>,
    end: Option<Vec<u8>>,
    current: Option<Vec<u8>>,
    released: bool,
}

impl<V: Send + Sync + 'static> LiveCursor<V> {
    /// Create a cursor positioned at the first key `>= start`
    pub(crate) fn open(
        data: SharedMap<V>,
        store_closed: Arc<AtomicBool>,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Self {
        let end = end.map(|e| e.to_vec());
        let lower = match start {
            Some(s) => Bound::Included(s),
            None => Bound::Unbounded,
        };
        let current = seek(&*data.read(), lower, end.as_deref());
        LiveCursor {
            data,
            store_closed,
            end,
            current,
            released: false,
        }
    }
}

fn seek<V>(map: &BTreeMap<Vec<u8>, V>, lower: Bound<&[u8]>, end: Option<&[u8]>) -> Option<Vec<u8>> {
    map.range::<[u8], _>((lower, Bound::Unbounded))
        .next()
        .map(|(k, _)| k)
        .filter(|k| end.map_or(true, |e| k.as_slice() < e))
        .cloned()
}

impl<V: Send + Sync + 'static> Cursor for LiveCursor<V> {
    fn valid(&self) -> bool {
        !self.released && self.current.is_some()
    }

    fn advance(&mut self) -> StoreResult<()> {
        if self.released {
            return Err(StoreError::iterate("advance on a closed cursor"));
        }
        if self.store_closed.load(Ordering::Acquire) {
            return Err(StoreError::iterate("store closed during iteration"));
        }
        if let Some(last) = self.current.take() {
            self.current = seek(
                &*self.data.read(),
                Bound::Excluded(last.as_slice()),
                self.end.as_deref(),
            );
        }
        Ok(())
    }

    fn key(&self) -> &[u8] {
        self.current.as_deref().unwrap_or(&[])
    }

    fn close(&mut self) -> StoreResult<()> {
        if self.released {
            return Err(StoreError::close("cursor already closed"));
        }
        self.released = true;
        self.current = None;
        Ok(())
    }
}
