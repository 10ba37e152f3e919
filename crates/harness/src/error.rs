//! Harness error types
//!
//! `ProbeError` is what a step returns. The runner turns the first one a
//! scenario hits into that scenario's `Outcome`; nothing here ever aborts
//! the process.

use std::io;
use std::time::Duration;

use kvprobe_core::StoreError;
use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Errors raised while running a scenario
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The backend rejected an operation
    #[error("{step}: {source}")]
    Store {
        /// Step label (`open`, `step 3 (sweep)`, `close`, ...)
        step: String,
        /// Raw backend error
        #[source]
        source: StoreError,
    },

    /// A guarded unit did not signal completion before its deadline
    #[error("{step}: exceeded deadline of {deadline:?}")]
    Timeout {
        /// Step label
        step: String,
        /// Bound that elapsed
        deadline: Duration,
    },

    /// The backend returned without error but broke a consistency rule
    #[error("{step}: consistency violation: {detail}")]
    Consistency {
        /// Step label
        step: String,
        /// What was observed
        detail: String,
    },

    /// A guarded unit panicked or could not be started
    #[error("{step}: guarded unit crashed: {detail}")]
    Crashed {
        /// Step label
        step: String,
        /// Panic message or spawn error
        detail: String,
    },

    /// Scenario directory could not be prepared
    #[error("environment error: {0}")]
    Environment(#[from] io::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProbeError {
    /// Tag a backend error with the step it came from
    pub fn store(step: &str, source: StoreError) -> Self {
        ProbeError::Store {
            step: step.to_string(),
            source,
        }
    }

    /// Create a consistency violation
    pub fn consistency(step: &str, detail: impl Into<String>) -> Self {
        ProbeError::Consistency {
            step: step.to_string(),
            detail: detail.into(),
        }
    }

    /// Step label the error is attributed to
    pub fn step(&self) -> &str {
        match self {
            ProbeError::Store { step, .. }
            | ProbeError::Timeout { step, .. }
            | ProbeError::Consistency { step, .. }
            | ProbeError::Crashed { step, .. } => step,
            ProbeError::Environment(_) => "setup",
            ProbeError::Config(_) => "config",
        }
    }

    /// Error text without the step prefix
    pub fn detail(&self) -> String {
        match self {
            ProbeError::Store { source, .. } => source.to_string(),
            ProbeError::Timeout { deadline, .. } => format!("exceeded deadline of {:?}", deadline),
            ProbeError::Consistency { detail, .. } => format!("consistency violation: {}", detail),
            ProbeError::Crashed { detail, .. } => format!("guarded unit crashed: {}", detail),
            ProbeError::Environment(e) => e.to_string(),
            ProbeError::Config(msg) => msg.clone(),
        }
    }

    /// Whether this error came from a deadline expiring
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout { .. })
    }
}
