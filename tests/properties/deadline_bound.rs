//! A guarded scenario returns within its bound (plus the close grace)
//! however the backend hangs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kvprobe::testing::{FaultPlan, FaultyBackend};
use kvprobe::{Backend, Outcome, Runner, Scenario, Step};
use tempfile::TempDir;

use crate::common::{config, memory};

const BOUND: Duration = Duration::from_millis(400);
const SLACK: Duration = Duration::from_secs(3);

fn write_and_sweep() -> Scenario {
    Scenario::new("bounded", "")
        .step(Step::BulkWrite {
            count: 8,
            key_len: 16,
            value_len: 64,
        })
        .step(Step::Sweep { deadline: None })
        .deadline(BOUND)
}

fn timed_run(plan: FaultPlan, scenario: &Scenario) -> (Outcome, Duration) {
    let root = TempDir::new().unwrap();
    let config = config(&root);
    let faulty = FaultyBackend::new(memory(), plan);
    let latch = faulty.latch();
    let backend: Arc<dyn Backend> = Arc::new(faulty);

    let start = Instant::now();
    let report = Runner::new(&config).run(&backend, scenario);
    let elapsed = start.elapsed();
    latch.release();
    (report.outcome, elapsed)
}

#[test]
fn hang_mid_sweep_returns_at_the_bound() {
    let (outcome, elapsed) = timed_run(FaultPlan::none().hang_after_advances(2), &write_and_sweep());
    assert_eq!(
        outcome,
        Outcome::TimedOut {
            step: "step 2 (sweep)".to_string(),
            deadline: BOUND,
        }
    );
    assert!(elapsed >= BOUND);
    assert!(elapsed < BOUND + SLACK, "took {:?}", elapsed);
}

#[test]
fn hang_mid_sweep_and_at_close_still_bounded() {
    let plan = FaultPlan::none().hang_after_advances(2).hang_on_close();
    let (outcome, elapsed) = timed_run(plan, &write_and_sweep());
    assert_eq!(outcome.label(), "timeout");
    // Scenario bound, then the close grace.
    assert!(elapsed < BOUND + Duration::from_millis(300) + SLACK, "took {:?}", elapsed);
}

#[test]
fn step_deadline_bounds_only_that_step() {
    let scenario = Scenario::new("step-bound", "")
        .step(Step::BulkWrite {
            count: 4,
            key_len: 16,
            value_len: 16,
        })
        .step(Step::DeleteWhileIterating {
            deadline: Some(BOUND),
        });
    let (outcome, elapsed) = timed_run(FaultPlan::none().hang_after_advances(1), &scenario);
    assert_eq!(
        outcome,
        Outcome::TimedOut {
            step: "step 2 (delete-while-iterating)".to_string(),
            deadline: BOUND,
        }
    );
    assert!(elapsed < BOUND + SLACK, "took {:?}", elapsed);
}

#[test]
fn healthy_backend_finishes_well_inside_the_bound() {
    let (outcome, elapsed) = timed_run(FaultPlan::none(), &write_and_sweep());
    assert_eq!(outcome, Outcome::CompletedOk);
    assert!(elapsed < BOUND + SLACK);
}
