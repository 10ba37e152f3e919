//! Scenario runner
//!
//! Executes one scenario against one freshly opened store, in order, on the
//! calling thread. Steps with a deadline (and the whole body, when the
//! scenario has one) run inside a `DeadlineGuard`.
//!
//! # Resource rules
//!
//! - A cursor or batch is closed on every path out of the step that opened
//!   it. At most one of each is live at a time.
//! - The store is always closed, even after a failure. The close is guarded
//!   when the scenario marks it as hang-prone, and always after a timeout
//!   because the abandoned unit may still be inside the store.
//! - Harness locks (ledger, stats, workload) are never held across a
//!   backend call, so an abandoned unit cannot wedge the runner.
//! - First error wins: a failing step's error is the outcome; a later close
//!   failure is recorded next to it.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use kvprobe_core::{Backend, Cursor, Entry, Store};

use crate::config::HarnessConfig;
use crate::env::ScenarioDir;
use crate::error::{ProbeError, Result};
use crate::guard::{panic_message, DeadlineGuard, Guarded};
use crate::ledger::{fmt_key, KeyLedger};
use crate::outcome::{Outcome, RunStats, ScenarioReport};
use crate::scenario::{fmt_bytes, step_label, Scenario, Step};
use crate::workload::Workload;

/// Label of the implicit open phase
pub const OPEN_STEP: &str = "open";

/// Label of the implicit close phase
pub const CLOSE_STEP: &str = "close";

const BODY_UNIT: &str = "scenario";

/// Runs scenarios one at a time
#[derive(Debug, Clone)]
pub struct Runner {
    work_dir: Option<PathBuf>,
    close_grace: Duration,
    seed: Option<u64>,
}

impl Runner {
    /// Runner using the directory and grace period from `config`
    pub fn new(config: &HarnessConfig) -> Self {
        Runner {
            work_dir: config.work_dir.clone(),
            close_grace: config.close_grace(),
            seed: None,
        }
    }

    /// Use a reproducible workload
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Run `scenario` against a fresh store from `backend`.
    ///
    /// Never panics on backend misbehaviour; every failure ends up in the
    /// returned report.
    pub fn run(&self, backend: &Arc<dyn Backend>, scenario: &Scenario) -> ScenarioReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let backend_name = backend.name().to_string();

        info!(
            target: "kvprobe::runner",
            scenario = %scenario.name,
            backend = %backend_name,
            steps = scenario.steps.len(),
            "Starting scenario"
        );

        let stats = Arc::new(Mutex::new(RunStats::default()));
        let report = |outcome: Outcome,
                      close_error: Option<String>,
                      cleanup_error: Option<String>,
                      stats: &Arc<Mutex<RunStats>>| ScenarioReport {
            scenario: scenario.name.clone(),
            backend: backend_name.clone(),
            outcome,
            started_at,
            elapsed: start.elapsed(),
            stats: stats.lock().clone(),
            close_error,
            cleanup_error,
        };

        let dir = match ScenarioDir::create(self.work_dir.as_deref(), &scenario.name) {
            Ok(dir) => dir,
            Err(e) => {
                let err = ProbeError::Environment(e);
                warn!(target: "kvprobe::runner", scenario = %scenario.name, error = %err, "Scenario setup failed");
                return report(Outcome::from_error(&err), None, None, &stats);
            }
        };

        let body = Body {
            backend: Arc::clone(backend),
            location: dir.store_path(),
            scenario: scenario.name.clone(),
            steps: scenario.steps.clone(),
            slot: Arc::new(Mutex::new(None)),
            current: Arc::new(Mutex::new(OPEN_STEP.to_string())),
            stats: Arc::clone(&stats),
            workload: Arc::new(Mutex::new(match self.seed {
                Some(seed) => Workload::seeded(seed),
                None => Workload::new(),
            })),
        };
        let slot = Arc::clone(&body.slot);
        let current = Arc::clone(&body.current);

        let body_result = match scenario.deadline {
            Some(deadline) => {
                let unit = body.clone();
                guarded(&scenario.name, BODY_UNIT, deadline, move || unit.run())
            }
            None => contain(BODY_UNIT, || body.run()),
        };
        // Attribute a whole-body timeout or crash to the step that was running.
        let body_result = body_result.map_err(|err| match err {
            ProbeError::Timeout { step, deadline } if step == BODY_UNIT => ProbeError::Timeout {
                step: current.lock().clone(),
                deadline,
            },
            ProbeError::Crashed { step, detail } if step == BODY_UNIT => ProbeError::Crashed {
                step: current.lock().clone(),
                detail,
            },
            other => other,
        });

        let after_timeout = body_result.as_ref().err().map_or(false, ProbeError::is_timeout);
        let store = slot.lock().take();
        let close_result = match store {
            Some(store) => self.close_store(&scenario.name, store, scenario.close_deadline, after_timeout),
            None => Ok(()),
        };

        let (outcome, close_error) = match (body_result, close_result) {
            (Ok(()), Ok(())) => (Outcome::CompletedOk, None),
            (Ok(()), Err(close)) => (Outcome::from_error(&close), None),
            (Err(first), Ok(())) => (Outcome::from_error(&first), None),
            (Err(first), Err(close)) => (Outcome::from_error(&first), Some(close.to_string())),
        };

        let cleanup_error = match dir.cleanup() {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    target: "kvprobe::runner",
                    scenario = %scenario.name,
                    error = %e,
                    "Failed to remove scenario directory"
                );
                Some(e.to_string())
            }
        };

        let report = report(outcome, close_error, cleanup_error, &stats);
        match report.outcome.reason() {
            None => info!(
                target: "kvprobe::runner",
                scenario = %report.scenario,
                elapsed = ?report.elapsed,
                entries = report.stats.entries_written,
                "Scenario completed"
            ),
            Some(reason) => warn!(
                target: "kvprobe::runner",
                scenario = %report.scenario,
                status = report.outcome.label(),
                elapsed = ?report.elapsed,
                reason = %reason,
                "Scenario failed"
            ),
        }
        report
    }

    fn close_store(
        &self,
        scenario: &str,
        store: Arc<dyn Store>,
        close_deadline: Option<Duration>,
        after_timeout: bool,
    ) -> Result<()> {
        let bound = match (close_deadline, after_timeout) {
            (Some(deadline), _) => Some(deadline),
            (None, true) => Some(self.close_grace),
            (None, false) => None,
        };
        debug!(target: "kvprobe::runner", scenario, bound = ?bound, "Closing store");
        match bound {
            Some(deadline) => guarded(scenario, CLOSE_STEP, deadline, move || {
                store.close().map_err(|e| ProbeError::store(CLOSE_STEP, e))
            }),
            None => contain(CLOSE_STEP, || {
                store.close().map_err(|e| ProbeError::store(CLOSE_STEP, e))
            }),
        }
    }
}

/// Run `unit` under a deadline and fold the guard result into `Result`.
fn guarded<F>(scenario: &str, step: &str, deadline: Duration, unit: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let guard = DeadlineGuard::new(format!("{}/{}", scenario, step), deadline);
    match guard.run(unit) {
        Guarded::Completed(result) => result,
        Guarded::TimedOut { deadline, .. } => Err(ProbeError::Timeout {
            step: step.to_string(),
            deadline,
        }),
        Guarded::Crashed(detail) => Err(ProbeError::Crashed {
            step: step.to_string(),
            detail,
        }),
    }
}

/// Run `unit` on this thread, turning a backend panic into an error.
fn contain<F>(step: &str, unit: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    panic::catch_unwind(AssertUnwindSafe(unit)).unwrap_or_else(|payload| {
        Err(ProbeError::Crashed {
            step: step.to_string(),
            detail: panic_message(payload.as_ref()),
        })
    })
}

/// Everything the scenario body needs, shareable with a guard thread
#[derive(Clone)]
struct Body {
    backend: Arc<dyn Backend>,
    location: PathBuf,
    scenario: String,
    steps: Vec<Step>,
    slot: Arc<Mutex<Option<Arc<dyn Store>>>>,
    current: Arc<Mutex<String>>,
    stats: Arc<Mutex<RunStats>>,
    workload: Arc<Mutex<Workload>>,
}

impl Body {
    fn run(&self) -> Result<()> {
        let store = self
            .backend
            .open(&self.location)
            .map_err(|e| ProbeError::store(OPEN_STEP, e))?;
        *self.slot.lock() = Some(Arc::clone(&store));

        let probe = Probe {
            store,
            scenario: self.scenario.clone(),
            ledger: Arc::new(Mutex::new(KeyLedger::new())),
            stats: Arc::clone(&self.stats),
            workload: Arc::clone(&self.workload),
        };

        let total = self.steps.len();
        for (index, step) in self.steps.iter().enumerate() {
            let label = step_label(index, step);
            *self.current.lock() = label.clone();
            info!(
                target: "kvprobe::runner",
                scenario = %self.scenario,
                step = index + 1,
                of = total,
                what = %step.describe(),
                "Running step"
            );
            match step.deadline() {
                Some(deadline) => {
                    let unit = probe.clone();
                    let step = step.clone();
                    let unit_label = label.clone();
                    guarded(&self.scenario, &label, deadline, move || {
                        unit.execute(&step, &unit_label)
                    })?;
                }
                None => probe.execute(step, &label)?,
            }
        }
        *self.current.lock() = CLOSE_STEP.to_string();
        Ok(())
    }
}

/// Per-scenario state once the store is open
#[derive(Clone)]
struct Probe {
    store: Arc<dyn Store>,
    scenario: String,
    ledger: Arc<Mutex<KeyLedger>>,
    stats: Arc<Mutex<RunStats>>,
    workload: Arc<Mutex<Workload>>,
}

impl Probe {
    fn execute(&self, step: &Step, label: &str) -> Result<()> {
        match *step {
            Step::BulkWrite {
                count,
                key_len,
                value_len,
            } => self.bulk_write(label, count, key_len, value_len),
            Step::BatchWrite {
                count,
                key_len,
                value_len,
                durable,
            } => self.batch_write(label, count, key_len, value_len, durable),
            Step::Sweep { .. } => {
                let seen = self.sweep(label)?;
                self.stats.lock().sweeps.push(seen);
                Ok(())
            }
            Step::DeleteWhileIterating { .. } => self.delete_while_iterating(label),
        }
    }

    fn bulk_write(&self, label: &str, count: usize, key_len: usize, value_len: usize) -> Result<()> {
        for i in 0..count {
            let Entry { key, value } = self.workload.lock().entry(key_len, value_len);
            let size = (key.len() + value.len()) as u64;
            self.store
                .set(&key, &value)
                .map_err(|e| ProbeError::store(label, e))?;
            drop(value);
            self.ledger.lock().insert(key);
            {
                let mut stats = self.stats.lock();
                stats.entries_written += 1;
                stats.bytes_written += size;
            }
            debug!(
                target: "kvprobe::runner",
                scenario = %self.scenario,
                written = i + 1,
                of = count,
                size = %fmt_bytes(size),
                "Entry written"
            );
        }
        Ok(())
    }

    fn batch_write(
        &self,
        label: &str,
        count: usize,
        key_len: usize,
        value_len: usize,
        durable: bool,
    ) -> Result<()> {
        let mut batch = self.store.batch().map_err(|e| ProbeError::store(label, e))?;

        let committed = (|| {
            let mut keys = Vec::with_capacity(count);
            let mut bytes = 0u64;
            for _ in 0..count {
                let Entry { key, value } = self.workload.lock().entry(key_len, value_len);
                bytes += (key.len() + value.len()) as u64;
                batch
                    .set(&key, &value)
                    .map_err(|e| ProbeError::store(label, e))?;
                keys.push(key);
            }
            batch
                .commit(durable)
                .map_err(|e| ProbeError::store(label, e))?;
            Ok::<_, ProbeError>((keys, bytes))
        })();
        let closed = batch.close().map_err(|e| ProbeError::store(label, e));

        let (keys, bytes) = committed?;
        closed?;

        let written = keys.len() as u64;
        self.ledger.lock().extend(keys);
        let mut stats = self.stats.lock();
        stats.entries_written += written;
        stats.bytes_written += bytes;
        debug!(
            target: "kvprobe::runner",
            scenario = %self.scenario,
            entries = written,
            durable,
            "Batch committed"
        );
        Ok(())
    }

    /// Full sweep; the store must yield exactly the ledger's keys.
    fn sweep(&self, label: &str) -> Result<usize> {
        let expected = self.ledger.lock().len();
        let seen = self.scan(label, |key| {
            if self.ledger.lock().contains(key) {
                Ok(())
            } else {
                Err(ProbeError::consistency(
                    label,
                    format!("iteration yielded key {} that was never written", fmt_key(key)),
                ))
            }
        })?;
        if seen != expected {
            return Err(ProbeError::consistency(
                label,
                format!("sweep saw {} of {} live keys", seen, expected),
            ));
        }
        debug!(target: "kvprobe::runner", scenario = %self.scenario, keys = seen, "Sweep complete");
        Ok(seen)
    }

    fn delete_while_iterating(&self, label: &str) -> Result<()> {
        let expected = self.ledger.lock().len();
        let visited = self.scan(label, |key| {
            if !self.ledger.lock().remove(key) {
                return Err(ProbeError::consistency(
                    label,
                    format!("iteration yielded key {} that is not live", fmt_key(key)),
                ));
            }
            self.store
                .delete(key)
                .map_err(|e| ProbeError::store(label, e))?;
            let deleted = {
                let mut stats = self.stats.lock();
                stats.deleted += 1;
                stats.deleted
            };
            debug!(target: "kvprobe::runner", scenario = %self.scenario, deleted, "Deleted");
            Ok(())
        })?;
        if visited != expected {
            return Err(ProbeError::consistency(
                label,
                format!("visited {} of {} live keys", visited, expected),
            ));
        }

        let remaining = self.scan(label, |_| Ok(()))?;
        if remaining != 0 {
            return Err(ProbeError::consistency(
                label,
                format!("store still holds {} entries after deleting every key", remaining),
            ));
        }
        info!(target: "kvprobe::runner", scenario = %self.scenario, deleted = visited, "Store drained");
        Ok(())
    }

    /// Open one cursor over the full range, feed every key to `visit`, and
    /// close the cursor whatever happens. Keys must arrive strictly
    /// ascending.
    fn scan<F>(&self, label: &str, mut visit: F) -> Result<usize>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let mut cursor = self
            .store
            .iterate(None, None)
            .map_err(|e| ProbeError::store(label, e))?;
        let walked = walk(&mut *cursor, label, &mut visit);
        let closed = cursor.close().map_err(|e| ProbeError::store(label, e));
        let visited = walked?;
        closed?;
        Ok(visited)
    }
}

fn walk<F>(cursor: &mut dyn Cursor, label: &str, visit: &mut F) -> Result<usize>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    let mut visited = 0;
    let mut prev: Option<Vec<u8>> = None;
    while cursor.valid() {
        let key = cursor.key().to_vec();
        if let Some(prev) = prev.as_deref() {
            if key.as_slice() == prev {
                return Err(ProbeError::consistency(
                    label,
                    format!("key {} visited twice", fmt_key(&key)),
                ));
            }
            if key.as_slice() < prev {
                return Err(ProbeError::consistency(
                    label,
                    format!("key {} out of order after {}", fmt_key(&key), fmt_key(prev)),
                ));
            }
        }
        visit(&key)?;
        visited += 1;
        prev = Some(key);
        cursor
            .advance()
            .map_err(|e| ProbeError::store(label, e))?;
    }
    Ok(visited)
}
