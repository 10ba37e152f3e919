//! Failed closes are reported, never fatal, and a second close attempt is
//! safe.

use std::sync::Arc;

use kvprobe::testing::{FaultPlan, FaultyBackend};
use kvprobe::{Backend, Outcome, Scenario, Step, StoreError};
use tempfile::TempDir;

use crate::common::{memory, run_one};

fn failing_close() -> Arc<dyn Backend> {
    Arc::new(FaultyBackend::new(memory(), FaultPlan::none().fail_close()))
}

#[test]
fn repeated_close_after_failure_does_not_panic() {
    let dir = TempDir::new().unwrap();
    let store = failing_close().open(dir.path()).unwrap();

    let mut cursor = store.iterate(None, None).unwrap();
    assert!(cursor.close().is_err());
    assert!(cursor.close().is_err());

    for _ in 0..3 {
        assert!(matches!(store.close(), Err(StoreError::Close(_))));
    }
}

#[test]
fn cursor_close_failure_fails_the_sweep_and_store_close_is_kept() {
    let scenario = Scenario::new("close-failures", "")
        .step(Step::BulkWrite {
            count: 2,
            key_len: 8,
            value_len: 8,
        })
        .step(Step::Sweep { deadline: None });
    let report = run_one(&failing_close(), &scenario);
    match &report.outcome {
        Outcome::CompletedWithError { step, detail } => {
            assert_eq!(step, "step 2 (sweep)");
            assert!(detail.contains("injected cursor close failure"), "{}", detail);
        }
        other => panic!("expected close failure, got {:?}", other),
    }
    assert!(report
        .close_error
        .as_deref()
        .unwrap()
        .contains("injected close failure"));
}

#[test]
fn same_backend_runs_again_after_a_close_failure() {
    let backend = failing_close();
    let scenario = Scenario::new("again", "").step(Step::BulkWrite {
        count: 1,
        key_len: 8,
        value_len: 8,
    });
    for _ in 0..2 {
        let report = run_one(&backend, &scenario);
        assert_eq!(
            report.outcome,
            Outcome::CompletedWithError {
                step: "close".to_string(),
                detail: "close failed: injected close failure".to_string(),
            }
        );
    }
}
