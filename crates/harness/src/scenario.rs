//! Scenario definitions and the built-in registry
//!
//! A scenario is an ordered list of steps run between an implicit `open`
//! and an implicit `close`. Deadlines can be attached at three levels:
//! the whole scenario body, a single step, and the final close (for
//! backends known to hang there).
//!
//! # Built-in scenarios
//!
//! | Name                     | Shape                                                 |
//! |--------------------------|-------------------------------------------------------|
//! | `large-value-sweep`      | 4 × (one 512 MiB value, full sweep), 10 min deadline  |
//! | `batch-sweep`            | 10 × (durable batch of 1000 × 1 MiB, full sweep)      |
//! | `batch-only`             | 10 × durable batch of 1000 × 1 MiB                    |
//! | `delete-while-iterating` | 7 × 10 × 100 MiB writes, guarded delete-while-iterate |

use std::time::Duration;

/// One mebibyte
pub const MIB: usize = 1024 * 1024;

/// Key length used by every built-in scenario
pub const KEY_LEN: usize = 64;

/// Deadline the built-in scenarios use for hang-prone work
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10 * 60);

/// Close deadline for backends known to hang on close
pub const DEFAULT_CLOSE_DEADLINE: Duration = Duration::from_secs(30);

/// A single operation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `count` single `set` calls
    BulkWrite {
        /// Number of entries
        count: usize,
        /// Key length in bytes
        key_len: usize,
        /// Value length in bytes
        value_len: usize,
    },
    /// One batch of `count` sets, committed once
    BatchWrite {
        /// Number of entries
        count: usize,
        /// Key length in bytes
        key_len: usize,
        /// Value length in bytes
        value_len: usize,
        /// Ask the backend to sync on commit
        durable: bool,
    },
    /// Full-range iteration checking every written key appears exactly once
    Sweep {
        /// Optional bound for this step alone
        deadline: Option<Duration>,
    },
    /// Iterate deleting each key before advancing; store must end empty
    DeleteWhileIterating {
        /// Optional bound for this step alone
        deadline: Option<Duration>,
    },
}

impl Step {
    /// Short kind name used in step labels
    pub fn kind(&self) -> &'static str {
        match self {
            Step::BulkWrite { .. } => "bulk-write",
            Step::BatchWrite { .. } => "batch-write",
            Step::Sweep { .. } => "sweep",
            Step::DeleteWhileIterating { .. } => "delete-while-iterating",
        }
    }

    /// Step-level deadline, if any
    pub fn deadline(&self) -> Option<Duration> {
        match self {
            Step::Sweep { deadline } | Step::DeleteWhileIterating { deadline } => *deadline,
            _ => None,
        }
    }

    /// Human description including sizes
    pub fn describe(&self) -> String {
        match self {
            Step::BulkWrite {
                count, value_len, ..
            } => format!("bulk-write {} x {}", count, fmt_bytes(*value_len as u64)),
            Step::BatchWrite {
                count,
                value_len,
                durable,
                ..
            } => format!(
                "batch-write {} x {}{}",
                count,
                fmt_bytes(*value_len as u64),
                if *durable { " (durable)" } else { "" }
            ),
            Step::Sweep { .. } => "sweep".to_string(),
            Step::DeleteWhileIterating { .. } => "delete-while-iterating".to_string(),
        }
    }

    fn scale_down(&mut self, divisor: usize) {
        match self {
            Step::BulkWrite { value_len, .. } | Step::BatchWrite { value_len, .. } => {
                *value_len = (*value_len / divisor).max(1);
            }
            _ => {}
        }
    }

    fn override_deadline(&mut self, bound: Duration) {
        match self {
            Step::Sweep { deadline } | Step::DeleteWhileIterating { deadline } => {
                if deadline.is_some() {
                    *deadline = Some(bound);
                }
            }
            _ => {}
        }
    }
}

/// Label a step for reports: `step 3 (sweep)`
pub fn step_label(index: usize, step: &Step) -> String {
    format!("step {} ({})", index + 1, step.kind())
}

/// A named, independently runnable scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Stable identifier
    pub name: String,
    /// One-line description
    pub description: String,
    /// Steps between open and close
    pub steps: Vec<Step>,
    /// Bound on open plus every step
    pub deadline: Option<Duration>,
    /// When set, close is guarded with this bound
    pub close_deadline: Option<Duration>,
}

impl Scenario {
    /// Empty scenario with no deadlines
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Scenario {
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
            deadline: None,
            close_deadline: None,
        }
    }

    /// Append a step
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Append `steps` `times` times
    pub fn repeat(mut self, times: usize, steps: &[Step]) -> Self {
        for _ in 0..times {
            self.steps.extend_from_slice(steps);
        }
        self
    }

    /// Bound the whole scenario body
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Mark close as capable of hanging and bound it
    pub fn close_may_hang(mut self, deadline: Duration) -> Self {
        self.close_deadline = Some(deadline);
        self
    }

    /// Divide every value length by `divisor` (minimum one byte)
    pub fn scaled(mut self, divisor: usize) -> Self {
        if divisor > 1 {
            for step in &mut self.steps {
                step.scale_down(divisor);
            }
        }
        self
    }

    /// Bound the whole scenario by `bound`, whether or not it had a
    /// deadline, and replace every configured step deadline with it.
    /// Close deadlines are left alone.
    pub fn with_deadline_override(mut self, bound: Duration) -> Self {
        self.deadline = Some(bound);
        for step in &mut self.steps {
            step.override_deadline(bound);
        }
        self
    }

    /// Total entries the scenario writes
    pub fn planned_entries(&self) -> usize {
        self.steps
            .iter()
            .map(|s| match s {
                Step::BulkWrite { count, .. } | Step::BatchWrite { count, .. } => *count,
                _ => 0,
            })
            .sum()
    }
}

/// Every built-in scenario at full size
pub fn builtin() -> Vec<Scenario> {
    let one_mib_batch = Step::BatchWrite {
        count: 1000,
        key_len: KEY_LEN,
        value_len: MIB,
        durable: true,
    };

    vec![
        Scenario::new(
            "large-value-sweep",
            "Four 512 MiB values, each followed by a full sweep; probes 32-bit size counters",
        )
        .repeat(
            4,
            &[
                Step::BulkWrite {
                    count: 1,
                    key_len: KEY_LEN,
                    value_len: 512 * MIB,
                },
                Step::Sweep { deadline: None },
            ],
        )
        .deadline(DEFAULT_DEADLINE)
        .close_may_hang(DEFAULT_CLOSE_DEADLINE),
        Scenario::new(
            "batch-sweep",
            "Ten durable 1000 x 1 MiB batches, each followed by a full sweep",
        )
        .repeat(10, &[one_mib_batch.clone(), Step::Sweep { deadline: None }]),
        Scenario::new("batch-only", "Ten durable 1000 x 1 MiB batches without iteration")
            .repeat(10, &[one_mib_batch]),
        Scenario::new(
            "delete-while-iterating",
            "Seventy 100 MiB values, then delete each key while iterating over it",
        )
        .repeat(
            7,
            &[Step::BulkWrite {
                count: 10,
                key_len: KEY_LEN,
                value_len: 100 * MIB,
            }],
        )
        .step(Step::DeleteWhileIterating {
            deadline: Some(DEFAULT_DEADLINE),
        })
        .close_may_hang(DEFAULT_CLOSE_DEADLINE),
    ]
}

/// Look up a built-in scenario by name
pub fn find(name: &str) -> Option<Scenario> {
    builtin().into_iter().find(|s| s.name == name)
}

/// Format a byte count with a binary unit
pub fn fmt_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
