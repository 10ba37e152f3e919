//! Deleting each key while iterating visits every key once and drains the
//! store.

use std::sync::Arc;

use proptest::prelude::*;

use kvprobe::testing::{FaultPlan, FaultyBackend};
use kvprobe::{Backend, LogBackend, Outcome, Scenario, Step};

use crate::common::{memory, run_one};

fn fill_then_drain(count: usize) -> Scenario {
    Scenario::new("drain", "")
        .step(Step::BulkWrite {
            count,
            key_len: 32,
            value_len: 256,
        })
        .step(Step::DeleteWhileIterating { deadline: None })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn every_key_visited_once_and_store_drained(count in 0usize..200, on_log in any::<bool>()) {
        let backend: Arc<dyn Backend> = if on_log { Arc::new(LogBackend::new()) } else { memory() };
        let report = run_one(&backend, &fill_then_drain(count));
        prop_assert_eq!(report.outcome, Outcome::CompletedOk);
        prop_assert_eq!(report.stats.deleted, count as u64);
    }
}

#[test]
fn revisited_key_is_a_violation() {
    let backend: Arc<dyn Backend> =
        Arc::new(FaultyBackend::new(memory(), FaultPlan::none().repeat_key_at(5)));
    let report = run_one(&backend, &fill_then_drain(20));
    match report.outcome {
        Outcome::CompletedWithError { step, detail } => {
            assert_eq!(step, "step 2 (delete-while-iterating)");
            assert!(detail.contains("consistency violation"), "{}", detail);
        }
        other => panic!("expected a violation, got {:?}", other),
    }
    assert_eq!(report.stats.deleted, 5);
}
