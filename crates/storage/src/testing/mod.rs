//! Testing utilities for the harness
//!
//! - **Faults**: `FaultyBackend` wraps a backend and injects hangs, close
//!   failures, size rejections, partial batches and repeated keys.
//!
//! # Example
//!
//! ```ignore
//! use kvprobe_storage::testing::{FaultPlan, FaultyBackend};
//!
//! let backend = FaultyBackend::new(Arc::new(MemoryBackend::new()), FaultPlan::none().hang_on_close());
//! let latch = backend.latch();
//! // ... run a scenario, then free the parked thread
//! latch.release();
//! ```

mod faults;

pub use faults::{FaultPlan, FaultyBackend, Latch, FAULT_NAMES};
