//! A committed batch of K sets is fully visible to the next sweep.

use std::sync::Arc;

use proptest::prelude::*;

use kvprobe::testing::{FaultPlan, FaultyBackend};
use kvprobe::{Backend, LogBackend, Outcome, Scenario, Step};

use crate::common::{memory, run_one};

fn batch_then_sweep(batches: usize, count: usize, durable: bool) -> Scenario {
    Scenario::new("batch-visibility", "").repeat(
        batches,
        &[
            Step::BatchWrite {
                count,
                key_len: 64,
                value_len: 128,
                durable,
            },
            Step::Sweep { deadline: None },
        ],
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn committed_batches_fully_visible(
        batches in 1usize..4,
        count in 1usize..200,
        durable in any::<bool>(),
        on_log in any::<bool>(),
    ) {
        let backend: Arc<dyn Backend> = if on_log { Arc::new(LogBackend::new()) } else { memory() };
        let report = run_one(&backend, &batch_then_sweep(batches, count, durable));
        prop_assert_eq!(report.outcome, Outcome::CompletedOk);
        let expected: Vec<usize> = (1..=batches).map(|i| i * count).collect();
        prop_assert_eq!(report.stats.sweeps, expected);
    }
}

#[test]
fn partially_applied_batch_is_detected() {
    let backend: Arc<dyn Backend> = Arc::new(FaultyBackend::new(
        memory(),
        FaultPlan::none().drop_batch_writes_after(1),
    ));
    let report = run_one(&backend, &batch_then_sweep(1, 50, true));
    match report.outcome {
        Outcome::CompletedWithError { step, detail } => {
            assert_eq!(step, "step 2 (sweep)");
            assert!(detail.contains("1 of 50"), "{}", detail);
        }
        other => panic!("expected a violation, got {:?}", other),
    }
}
