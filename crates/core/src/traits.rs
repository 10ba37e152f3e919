//! The capability contract a backend under test must satisfy
//!
//! The harness only ever talks to a store through these traits. Nothing here
//! promises bounded latency: any call may block forever, which is exactly
//! what the harness is built to detect.
//!
//! Thread safety: a guarded operation runs on a different thread from the
//! one that opened the store, so stores are `Send + Sync` and cursors and
//! batches are `Send`. Cursors and batches own whatever they need from the
//! store (they are `'static`) so a store can be deleted from while a cursor
//! is live.

use std::path::Path;
use std::sync::Arc;

use crate::error::StoreResult;

/// Factory for store instances
pub trait Backend: Send + Sync {
    /// Stable backend name used in reports
    fn name(&self) -> &str;

    /// Open (or create) a store rooted at `location`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Open` if the backend cannot initialize there.
    fn open(&self, location: &Path) -> StoreResult<Arc<dyn Store>>;
}

/// An open key-value store
pub trait Store: Send + Sync {
    /// Write a single entry; last write wins for an existing key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Write` if the write is rejected.
    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Remove a key. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Write` if the delete is rejected.
    fn delete(&self, key: &[u8]) -> StoreResult<()>;

    /// Start a new write batch
    fn batch(&self) -> StoreResult<Box<dyn Batch>>;

    /// Iterate keys in ascending order over `[start, end)`.
    ///
    /// `None` bounds are open.
    fn iterate(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> StoreResult<Box<dyn Cursor>>;

    /// Release the store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Close` if the store cannot be released cleanly.
    /// Calling `close` again after a failure must not panic.
    fn close(&self) -> StoreResult<()>;
}

/// A group of writes applied together on commit
pub trait Batch: Send {
    /// Stage a write
    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Apply every staged write. `durable` asks the backend to sync before
    /// returning.
    fn commit(&mut self, durable: bool) -> StoreResult<()>;

    /// Release the batch handle; staged but uncommitted writes are dropped.
    fn close(&mut self) -> StoreResult<()>;
}

/// An ordered iteration handle
pub trait Cursor: Send {
    /// Whether the cursor points at an entry
    fn valid(&self) -> bool;

    /// Move to the next key
    fn advance(&mut self) -> StoreResult<()>;

    /// Key at the current position. Only meaningful while `valid()`.
    fn key(&self) -> &[u8];

    /// Release the cursor. Must be called exactly once by the owner.
    fn close(&mut self) -> StoreResult<()>;
}
