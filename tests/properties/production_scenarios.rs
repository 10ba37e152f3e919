//! Built-in scenarios at production sizes.
//!
//! These write gigabytes and are ignored by default.

use std::sync::Arc;

use kvprobe::{scenario, Backend, HarnessConfig, LogBackend, MemoryBackend, Outcome, Runner};
use tempfile::TempDir;

fn run_full(backend: Arc<dyn Backend>, name: &str) -> kvprobe::ScenarioReport {
    let root = TempDir::new().unwrap();
    let config = HarnessConfig {
        work_dir: Some(root.path().to_path_buf()),
        ..HarnessConfig::default()
    };
    let scenario = config.prepare(scenario::find(name).unwrap());
    Runner::new(&config).run(&backend, &scenario)
}

fn assert_acceptable(report: &kvprobe::ScenarioReport) {
    match &report.outcome {
        Outcome::CompletedOk => assert!(report.stats.sweeps_non_decreasing()),
        Outcome::CompletedWithError { detail, .. } => {
            assert!(detail.starts_with("write failed"), "{}", detail)
        }
        Outcome::TimedOut { deadline, .. } => {
            assert_eq!(*deadline, scenario::DEFAULT_DEADLINE)
        }
    }
}

#[test]
#[ignore]
fn four_512_mib_values_on_memory() {
    let report = run_full(Arc::new(MemoryBackend::new()), "large-value-sweep");
    assert_acceptable(&report);
    if report.outcome.is_ok() {
        assert_eq!(report.stats.sweeps, vec![1, 2, 3, 4]);
    }
}

#[test]
#[ignore]
fn four_512_mib_values_on_log() {
    let report = run_full(Arc::new(LogBackend::new()), "large-value-sweep");
    assert_acceptable(&report);
}

#[test]
#[ignore]
fn seventy_100_mib_values_deleted_while_iterating() {
    let report = run_full(Arc::new(LogBackend::new()), "delete-while-iterating");
    assert_acceptable(&report);
    if report.outcome.is_ok() {
        assert_eq!(report.stats.deleted, 70);
    }
}
