//! Shared helpers for the property suites.

#![allow(dead_code)]

use std::sync::Arc;

use kvprobe::{Backend, HarnessConfig, MemoryBackend, Runner, Scenario, ScenarioReport};
use tempfile::TempDir;

/// Config rooted in `root` with a short close grace
pub fn config(root: &TempDir) -> HarnessConfig {
    HarnessConfig {
        work_dir: Some(root.path().to_path_buf()),
        close_grace_ms: 300,
        ..HarnessConfig::default()
    }
}

/// Run `scenario` once in a fresh work directory
pub fn run_one(backend: &Arc<dyn Backend>, scenario: &Scenario) -> ScenarioReport {
    let root = TempDir::new().unwrap();
    Runner::new(&config(&root)).with_seed(7).run(backend, scenario)
}

pub fn memory() -> Arc<dyn Backend> {
    Arc::new(MemoryBackend::new())
}
