//! Large values either round-trip through a sweep exactly once or are
//! rejected at write time.

use std::sync::Arc;

use proptest::prelude::*;

use kvprobe::{Backend, MemoryBackend, Outcome, Scenario, Step, StoreError};
use kvprobe_storage::log::encode_len;

use crate::common::run_one;

fn write_then_sweep(value_len: usize) -> Scenario {
    Scenario::new("large-value", "")
        .step(Step::BulkWrite {
            count: 1,
            key_len: 64,
            value_len,
        })
        .step(Step::Sweep { deadline: None })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn value_is_visible_once_or_rejected(value_len in 0usize..(1 << 20), limit in 1usize..(1 << 20)) {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new().with_max_value_size(limit));
        let report = run_one(&backend, &write_then_sweep(value_len));
        if value_len <= limit {
            prop_assert_eq!(report.outcome, Outcome::CompletedOk);
            prop_assert_eq!(report.stats.sweeps, vec![1]);
        } else {
            match report.outcome {
                Outcome::CompletedWithError { step, detail } => {
                    prop_assert_eq!(step, "step 1 (bulk-write)");
                    prop_assert!(detail.starts_with("write failed"));
                }
                other => prop_assert!(false, "unexpected outcome {:?}", other),
            }
            prop_assert!(report.stats.sweeps.is_empty());
        }
    }

    #[test]
    fn log_length_fields_reject_past_signed_boundary(len in 0usize..=(u32::MAX as usize)) {
        match encode_len("value", len) {
            Ok(encoded) => {
                prop_assert!(len <= i32::MAX as usize);
                prop_assert_eq!(encoded as usize, len);
            }
            Err(err) => {
                prop_assert!(len > i32::MAX as usize);
                prop_assert!(matches!(err, StoreError::Write(_)));
            }
        }
    }
}

#[test]
fn log_backend_round_trips_multi_megabyte_values() {
    let backend: Arc<dyn Backend> = Arc::new(kvprobe::LogBackend::new());
    let scenario = Scenario::new("log-large", "").repeat(
        3,
        &[
            Step::BulkWrite {
                count: 1,
                key_len: 64,
                value_len: 8 * 1024 * 1024,
            },
            Step::Sweep { deadline: None },
        ],
    );
    let report = run_one(&backend, &scenario);
    assert_eq!(report.outcome, Outcome::CompletedOk);
    assert_eq!(report.stats.sweeps, vec![1, 2, 3]);
}
