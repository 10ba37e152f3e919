//! Scenario outcomes and reports
//!
//! An `Outcome` is created once per scenario and never changes. A
//! `ScenarioReport` wraps it with timing, statistics and any secondary
//! cleanup problems. Reports serialize to a single JSON line so an isolated
//! child process can hand its report back to the parent.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};

/// Terminal classification of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Every step and the close succeeded
    CompletedOk,
    /// The first failing operation
    CompletedWithError {
        /// Step label
        step: String,
        /// Raw backend text or violation description
        detail: String,
    },
    /// A guarded unit did not finish in time
    TimedOut {
        /// Step label
        step: String,
        /// Bound that elapsed
        deadline: Duration,
    },
}

impl Outcome {
    /// Classify the first error a scenario hit
    pub fn from_error(err: &ProbeError) -> Self {
        match err {
            ProbeError::Timeout { step, deadline } => Outcome::TimedOut {
                step: step.clone(),
                deadline: *deadline,
            },
            other => Outcome::CompletedWithError {
                step: other.step().to_string(),
                detail: other.detail(),
            },
        }
    }

    /// Whether the scenario passed
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::CompletedOk)
    }

    /// Short status word
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::CompletedOk => "ok",
            Outcome::CompletedWithError { .. } => "error",
            Outcome::TimedOut { .. } => "timeout",
        }
    }

    /// Failure reason, `None` when ok
    pub fn reason(&self) -> Option<String> {
        match self {
            Outcome::CompletedOk => None,
            Outcome::CompletedWithError { step, detail } => Some(format!("{}: {}", step, detail)),
            Outcome::TimedOut { step, deadline } => {
                Some(format!("{}: exceeded deadline of {:?}", step, deadline))
            }
        }
    }
}

/// Counters collected while a scenario runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Entries the backend accepted
    pub entries_written: u64,
    /// Key plus value bytes the backend accepted
    pub bytes_written: u64,
    /// Key count observed by each completed sweep, in order
    pub sweeps: Vec<usize>,
    /// Keys deleted during iteration
    pub deleted: u64,
}

impl RunStats {
    /// Whether sweep counts never decreased
    pub fn sweeps_non_decreasing(&self) -> bool {
        self.sweeps.windows(2).all(|w| w[0] <= w[1])
    }
}

/// Everything reported about one scenario run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub scenario: String,
    /// Backend name
    pub backend: String,
    /// Terminal classification
    pub outcome: Outcome,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Time until control returned to the reporter
    pub elapsed: Duration,
    /// Counters at the time the outcome was decided
    pub stats: RunStats,
    /// Close failure observed after an earlier failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_error: Option<String>,
    /// Directory removal failure (never changes the outcome)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<String>,
}

impl ScenarioReport {
    /// Encode as one JSON line
    pub fn to_json_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ProbeError::Config(format!("failed to encode report: {}", e)))
    }

    /// Decode a line written by `to_json_line`
    pub fn from_json_line(line: &str) -> Result<Self> {
        serde_json::from_str(line.trim())
            .map_err(|e| ProbeError::Config(format!("failed to decode report: {}", e)))
    }
}
