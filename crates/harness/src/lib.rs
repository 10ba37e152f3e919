//! Stress harness for kvprobe
//!
//! Drives backends through large-value and delete-while-iterating
//! scenarios under wall-clock deadlines:
//! - scenario: step definitions and the built-in registry
//! - guard: deadline guard that abandons units instead of waiting on them
//! - runner: executes one scenario and classifies its outcome
//! - reporter: per-scenario reporting and the run summary
//! - config: `kvprobe.toml` loading
//!
//! A scenario's failure or timeout never affects how later scenarios are
//! classified; only process-level resource pressure from abandoned units can
//! leak across, which is why the CLI isolates scenarios by default.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod env;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod outcome;
pub mod reporter;
pub mod runner;
pub mod scenario;
pub mod workload;

pub use config::{HarnessConfig, CONFIG_FILE_NAME};
pub use error::{ProbeError, Result};
pub use guard::{abandoned_units, DeadlineGuard, Guarded};
pub use outcome::{Outcome, RunStats, ScenarioReport};
pub use reporter::{run_all, Reporter, RunSummary};
pub use runner::Runner;
pub use scenario::{Scenario, Step};
