//! Fault injection for exercising the harness itself
//!
//! `FaultyBackend` wraps any backend and misbehaves according to a
//! `FaultPlan`. Each fault reproduces a defect class the harness must
//! classify: hangs (close, mid-iteration), close failures, oversized-value
//! rejections, partially applied batches and cursors that revisit keys.
//!
//! Hangs park on a `Latch`. Nothing in the harness ever releases it; tests
//! release it at the end so abandoned threads can exit.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use kvprobe_core::{Backend, Batch, Cursor, Store, StoreError, StoreResult};

/// Names accepted by `FaultPlan::with_named`
pub const FAULT_NAMES: &[&str] = &[
    "hang-close",
    "hang-iterate",
    "fail-close",
    "reject-large",
    "drop-batch",
    "repeat-key",
];

/// Which faults to inject
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// `Store::close` blocks until the latch is released
    pub hang_on_close: bool,
    /// `Cursor::advance` blocks once this many advances have completed
    pub hang_after_advances: Option<usize>,
    /// Every store and cursor close fails
    pub fail_close: bool,
    /// Values larger than this are rejected with a `WriteError`
    pub reject_values_over: Option<usize>,
    /// A batch commit silently keeps only its first N staged writes
    pub drop_batch_writes_after: Option<usize>,
    /// The cursor yields its key at this position twice
    pub repeat_key_at: Option<usize>,
}

impl FaultPlan {
    /// A plan that injects nothing
    pub fn none() -> Self {
        Self::default()
    }

    /// Hang in `Store::close`
    pub fn hang_on_close(mut self) -> Self {
        self.hang_on_close = true;
        self
    }

    /// Hang in `Cursor::advance` after `n` successful advances
    pub fn hang_after_advances(mut self, n: usize) -> Self {
        self.hang_after_advances = Some(n);
        self
    }

    /// Fail every close
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Reject values larger than `limit`
    pub fn reject_values_over(mut self, limit: usize) -> Self {
        self.reject_values_over = Some(limit);
        self
    }

    /// Keep only the first `n` writes of every batch
    pub fn drop_batch_writes_after(mut self, n: usize) -> Self {
        self.drop_batch_writes_after = Some(n);
        self
    }

    /// Yield the key at position `n` twice
    pub fn repeat_key_at(mut self, n: usize) -> Self {
        self.repeat_key_at = Some(n);
        self
    }

    /// Add a fault by its CLI name (see `FAULT_NAMES`).
    ///
    /// Returns `None` for an unknown name.
    pub fn with_named(self, name: &str) -> Option<Self> {
        Some(match name {
            "hang-close" => self.hang_on_close(),
            "hang-iterate" => self.hang_after_advances(1),
            "fail-close" => self.fail_close(),
            "reject-large" => self.reject_values_over(1024 * 1024),
            "drop-batch" => self.drop_batch_writes_after(1),
            "repeat-key" => self.repeat_key_at(1),
            _ => return None,
        })
    }

    /// Whether any fault is enabled
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One-shot gate that hung operations wait on
#[derive(Debug, Default)]
pub struct Latch {
    released: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    /// Create a closed latch
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `release` is called
    pub fn wait(&self) {
        let mut released = self.released.lock();
        while !*released {
            self.cond.wait(&mut released);
        }
    }

    /// Wake every waiter, now and in the future
    pub fn release(&self) {
        *self.released.lock() = true;
        self.cond.notify_all();
    }
}

/// Backend wrapper injecting the faults of a `FaultPlan`
pub struct FaultyBackend {
    inner: Arc<dyn Backend>,
    plan: FaultPlan,
    latch: Arc<Latch>,
    name: String,
}

impl FaultyBackend {
    /// Wrap `inner`
    pub fn new(inner: Arc<dyn Backend>, plan: FaultPlan) -> Self {
        let name = format!("{}+faults", inner.name());
        FaultyBackend {
            inner,
            plan,
            latch: Arc::new(Latch::new()),
            name,
        }
    }

    /// Latch every injected hang waits on
    pub fn latch(&self) -> Arc<Latch> {
        Arc::clone(&self.latch)
    }
}

impl Backend for FaultyBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, location: &Path) -> StoreResult<Arc<dyn Store>> {
        let inner = self.inner.open(location)?;
        Ok(Arc::new(FaultyStore {
            inner,
            plan: self.plan.clone(),
            latch: Arc::clone(&self.latch),
        }))
    }
}

struct FaultyStore {
    inner: Arc<dyn Store>,
    plan: FaultPlan,
    latch: Arc<Latch>,
}

impl FaultyStore {
    fn check_value(&self, value: &[u8]) -> StoreResult<()> {
        match self.plan.reject_values_over {
            Some(limit) if value.len() > limit => {
                Err(StoreError::overflow("value", value.len(), limit))
            }
            _ => Ok(()),
        }
    }
}

impl Store for FaultyStore {
    fn set(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.check_value(value)?;
        self.inner.set(key, value)
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.inner.delete(key)
    }

    fn batch(&self) -> StoreResult<Box<dyn Batch>> {
        Ok(Box::new(FaultyBatch {
            inner: self.inner.batch()?,
            limit: self.plan.reject_values_over,
            keep: self.plan.drop_batch_writes_after,
            staged: 0,
        }))
    }

    fn iterate(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> StoreResult<Box<dyn Cursor>> {
        Ok(Box::new(FaultyCursor {
            inner: self.inner.iterate(start, end)?,
            plan: self.plan.clone(),
            latch: Arc::clone(&self.latch),
            advances: 0,
            repeated: false,
        }))
    }

    fn close(&self) -> StoreResult<()> {
        if self.plan.hang_on_close {
            self.latch.wait();
        }
        if self.plan.fail_close {
            return Err(StoreError::close("injected close failure"));
        }
        self.inner.close()
    }
}

struct FaultyBatch {
    inner: Box<dyn Batch>,
    limit: Option<usize>,
    keep: Option<usize>,
    staged: usize,
}

impl Batch for FaultyBatch {
    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        if let Some(limit) = self.limit {
            if value.len() > limit {
                return Err(StoreError::overflow("value", value.len(), limit));
            }
        }
        self.staged += 1;
        if self.keep.map_or(false, |keep| self.staged > keep) {
            return Ok(());
        }
        self.inner.set(key, value)
    }

    fn commit(&mut self, durable: bool) -> StoreResult<()> {
        self.inner.commit(durable)
    }

    fn close(&mut self) -> StoreResult<()> {
        self.inner.close()
    }
}

struct FaultyCursor {
    inner: Box<dyn Cursor>,
    plan: FaultPlan,
    latch: Arc<Latch>,
    advances: usize,
    repeated: bool,
}

impl Cursor for FaultyCursor {
    fn valid(&self) -> bool {
        self.inner.valid()
    }

    fn advance(&mut self) -> StoreResult<()> {
        if let Some(n) = self.plan.hang_after_advances {
            if self.advances >= n {
                self.latch.wait();
            }
        }
        self.advances += 1;
        if self.plan.repeat_key_at == Some(self.advances) && !self.repeated {
            self.repeated = true;
            return Ok(());
        }
        self.inner.advance()
    }

    fn key(&self) -> &[u8] {
        self.inner.key()
    }

    fn close(&mut self) -> StoreResult<()> {
        if self.plan.fail_close {
            return Err(StoreError::close("injected cursor close failure"));
        }
        self.inner.close()
    }
}
