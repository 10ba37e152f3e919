//! kvprobe - deadline-guarded stress harness for embeddable key-value stores
//!
//! kvprobe drives a store through scenarios that tend to expose integer
//! overflow in size bookkeeping, unbounded blocking and iterator
//! corruption: single values of hundreds of megabytes, large durable
//! batches followed by full sweeps, and deleting every key while iterating
//! over it. Every potentially hanging operation runs under a wall-clock
//! deadline, so a hang is reported as a timeout instead of stalling the run.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use kvprobe::{run_all, scenario, Backend, HarnessConfig, MemoryBackend, Runner};
//!
//! let config = HarnessConfig { size_divisor: 1024, ..HarnessConfig::default() };
//! let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
//! let scenarios: Vec<_> = scenario::builtin().into_iter().map(|s| config.prepare(s)).collect();
//! let summary = run_all(&Runner::new(&config), &backend, &scenarios);
//! assert!(summary.all_passed());
//! ```
//!
//! # Architecture
//!
//! Backends plug in through the [`Backend`] / [`Store`] / [`Batch`] /
//! [`Cursor`] contract. The harness never calls a store except through it.

pub use kvprobe_core::{Backend, Batch, Cursor, Entry, Store, StoreError, StoreResult};
pub use kvprobe_harness::{
    abandoned_units, run_all, scenario, DeadlineGuard, Guarded, HarnessConfig, Outcome,
    ProbeError, Reporter, RunStats, RunSummary, Runner, Scenario, ScenarioReport, Step,
};
pub use kvprobe_storage::{backend_by_name, testing, LogBackend, MemoryBackend};
