//! Per-scenario result reporting
//!
//! The reporter receives one `ScenarioReport` per scenario, logs it as soon
//! as it arrives and keeps it for the final summary. A failure in one
//! scenario never prevents later ones from being reported.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use kvprobe_core::Backend;

use crate::guard::abandoned_units;
use crate::outcome::{Outcome, ScenarioReport};
use crate::runner::Runner;
use crate::scenario::Scenario;

/// Collects scenario reports in arrival order
#[derive(Debug, Default)]
pub struct Reporter {
    reports: Vec<ScenarioReport>,
}

impl Reporter {
    /// Empty reporter
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log one scenario's report
    pub fn record(&mut self, report: ScenarioReport) {
        match &report.outcome {
            Outcome::CompletedOk => info!(
                target: "kvprobe::report",
                scenario = %report.scenario,
                backend = %report.backend,
                elapsed = ?report.elapsed,
                sweeps = ?report.stats.sweeps,
                "PASS"
            ),
            Outcome::CompletedWithError { step, detail } => warn!(
                target: "kvprobe::report",
                scenario = %report.scenario,
                backend = %report.backend,
                step = %step,
                detail = %detail,
                "FAIL"
            ),
            Outcome::TimedOut { step, deadline } => warn!(
                target: "kvprobe::report",
                scenario = %report.scenario,
                backend = %report.backend,
                step = %step,
                deadline = ?deadline,
                "TIMEOUT"
            ),
        }
        if let Some(close) = &report.close_error {
            warn!(target: "kvprobe::report", scenario = %report.scenario, error = %close, "Close also failed");
        }
        if let Some(cleanup) = &report.cleanup_error {
            warn!(target: "kvprobe::report", scenario = %report.scenario, error = %cleanup, "Scenario directory left behind");
        }
        let abandoned = abandoned_units();
        if abandoned > 0 {
            warn!(
                target: "kvprobe::report",
                abandoned,
                "Timed-out operations are still running in this process; later scenarios may be slowed"
            );
        }
        self.reports.push(report);
    }

    /// Reports recorded so far
    pub fn reports(&self) -> &[ScenarioReport] {
        &self.reports
    }

    /// Close the run and produce the summary
    pub fn finish(self) -> RunSummary {
        let summary = RunSummary {
            reports: self.reports,
        };
        info!(
            target: "kvprobe::report",
            total = summary.reports.len(),
            passed = summary.passed(),
            failed = summary.failures().count(),
            elapsed = ?summary.elapsed(),
            "Run finished"
        );
        summary
    }
}

/// All reports of a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Reports in the order scenarios ran
    pub reports: Vec<ScenarioReport>,
}

impl RunSummary {
    /// Number of passing scenarios
    pub fn passed(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_ok()).count()
    }

    /// Reports that did not pass
    pub fn failures(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.reports.iter().filter(|r| !r.outcome.is_ok())
    }

    /// Whether every scenario passed
    pub fn all_passed(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Sum of per-scenario durations
    pub fn elapsed(&self) -> Duration {
        self.reports.iter().map(|r| r.elapsed).sum()
    }

    /// Process exit code: 0 if all passed, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }
}

/// Run `scenarios` in order against `backend`, reporting each as it ends
pub fn run_all(runner: &Runner, backend: &Arc<dyn Backend>, scenarios: &[Scenario]) -> RunSummary {
    let mut reporter = Reporter::new();
    for scenario in scenarios {
        reporter.record(runner.run(backend, scenario));
    }
    reporter.finish()
}
