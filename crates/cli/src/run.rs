//! `kvprobe run`: option resolution, in-process runs and child isolation.
//!
//! In isolated mode (the default) the parent re-executes this binary once
//! per scenario with `--child`. The child runs that one scenario, prints
//! its report as a single JSON line on stdout and exits, taking any
//! abandoned threads with it. Logs stay on the inherited stderr.

use std::env;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use clap::ArgMatches;
use tracing::{info, warn};

use kvprobe_core::Backend;
use kvprobe_harness::scenario;
use kvprobe_harness::{
    HarnessConfig, Outcome, ProbeError, Reporter, Result, RunStats, RunSummary, Runner, Scenario,
    ScenarioReport,
};
use kvprobe_storage::backend_by_name;
use kvprobe_storage::testing::{FaultPlan, FaultyBackend};

/// Everything `run` needs, resolved from flags, config file and defaults
#[derive(Debug)]
pub struct RunOptions {
    pub config: HarnessConfig,
    pub scenarios: Vec<Scenario>,
    pub faults: Vec<String>,
    pub child: bool,
    /// Flags forwarded verbatim to child processes
    forward: Vec<String>,
}

impl RunOptions {
    /// Resolve options. Flags override `kvprobe.toml`, which overrides
    /// defaults.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let config_path = matches.get_one::<String>("config").map(PathBuf::from);
        let mut config = HarnessConfig::load(config_path.as_deref())?;
        let mut forward = Vec::new();

        if let Some(path) = &config_path {
            forward.extend(["--config".to_string(), path.display().to_string()]);
        }
        if let Some(backend) = matches.get_one::<String>("backend") {
            config.backend = backend.clone();
            forward.extend(["--backend".to_string(), backend.clone()]);
        }
        if let Some(dir) = matches.get_one::<String>("work-dir") {
            config.work_dir = Some(PathBuf::from(dir));
            forward.extend(["--work-dir".to_string(), dir.clone()]);
        }
        if let Some(divisor) = matches.get_one::<u64>("size-divisor") {
            config.size_divisor = *divisor;
            forward.extend(["--size-divisor".to_string(), divisor.to_string()]);
        }
        if let Some(secs) = matches.get_one::<u64>("deadline") {
            config.deadline_secs = Some(*secs);
            forward.extend(["--deadline".to_string(), secs.to_string()]);
        }
        let faults: Vec<String> = matches
            .get_many::<String>("fault")
            .map(|names| names.cloned().collect())
            .unwrap_or_default();
        for fault in &faults {
            forward.extend(["--fault".to_string(), fault.clone()]);
        }
        if matches.get_flag("in-process") {
            config.isolate = false;
        }
        config.validate()?;

        let scenarios = match matches.get_many::<String>("scenario") {
            Some(names) => names
                .map(|name| {
                    scenario::find(name).ok_or_else(|| {
                        ProbeError::Config(format!(
                            "unknown scenario '{}' (see `kvprobe list`)",
                            name
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => scenario::builtin(),
        };
        let scenarios = scenarios.into_iter().map(|s| config.prepare(s)).collect();

        Ok(RunOptions {
            config,
            scenarios,
            faults,
            child: matches.get_flag("child"),
            forward,
        })
    }

    /// The backend under test, wrapped with any requested faults
    pub fn backend(&self) -> Result<Arc<dyn Backend>> {
        let backend = backend_by_name(&self.config.backend).ok_or_else(|| {
            ProbeError::Config(format!("unknown backend '{}'", self.config.backend))
        })?;
        let mut plan = FaultPlan::none();
        for name in &self.faults {
            plan = plan
                .with_named(name)
                .ok_or_else(|| ProbeError::Config(format!("unknown fault '{}'", name)))?;
        }
        if plan.is_empty() {
            Ok(backend)
        } else {
            warn!(target: "kvprobe::runner", faults = ?self.faults, "Injecting faults into the backend");
            Ok(Arc::new(FaultyBackend::new(backend, plan)))
        }
    }
}

/// Child mode: run the single requested scenario and return its JSON line.
pub fn run_child(options: &RunOptions) -> Result<String> {
    let scenario = match options.scenarios.as_slice() {
        [one] => one,
        _ => {
            return Err(ProbeError::Config(
                "--child needs exactly one --scenario".to_string(),
            ))
        }
    };
    let backend = options.backend()?;
    let report = Runner::new(&options.config).run(&backend, scenario);
    report.to_json_line()
}

/// Run every selected scenario, in this process or one child each.
pub fn run_scenarios(options: &RunOptions) -> Result<RunSummary> {
    let mut reporter = Reporter::new();
    if options.config.isolate {
        info!(
            target: "kvprobe::runner",
            scenarios = options.scenarios.len(),
            "Running each scenario in its own process"
        );
        for scenario in &options.scenarios {
            reporter.record(run_isolated(options, scenario)?);
        }
    } else {
        let backend = options.backend()?;
        let runner = Runner::new(&options.config);
        for scenario in &options.scenarios {
            reporter.record(runner.run(&backend, scenario));
        }
    }
    Ok(reporter.finish())
}

fn run_isolated(options: &RunOptions, scenario: &Scenario) -> Result<ScenarioReport> {
    let exe = env::current_exe()?;
    let started_at = Utc::now();
    let start = Instant::now();

    let output = Command::new(exe)
        .arg("run")
        .arg("--child")
        .arg("--in-process")
        .args(["--scenario", scenario.name.as_str()])
        .args(&options.forward)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty());
    match line.map(ScenarioReport::from_json_line) {
        Some(Ok(report)) => Ok(report),
        Some(Err(e)) => Ok(lost_report(options, scenario, started_at, start, e.to_string())),
        None => Ok(lost_report(
            options,
            scenario,
            started_at,
            start,
            format!("child exited with {} without a report", output.status),
        )),
    }
}

/// Report for a child that died before handing back its own report
fn lost_report(
    options: &RunOptions,
    scenario: &Scenario,
    started_at: chrono::DateTime<Utc>,
    start: Instant,
    detail: String,
) -> ScenarioReport {
    ScenarioReport {
        scenario: scenario.name.clone(),
        backend: options.config.backend.clone(),
        outcome: Outcome::CompletedWithError {
            step: "process".to_string(),
            detail,
        },
        started_at,
        elapsed: start.elapsed(),
        stats: RunStats::default(),
        close_error: None,
        cleanup_error: None,
    }
}
