//! Timeout-expected steps inside runs

use crate::common::*;
use lockstep::{Gate, TimeoutExpected};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Context whose gate stays closed until a step opens it
#[derive(Clone, Default)]
struct Blocker {
    gate: Arc<Gate>,
}

fn wait_for_gate(_: &mut (), ctx: &mut Blocker) -> StepResult {
    ctx.gate.wait();
    Ok(())
}

fn open_gate(_: &mut (), ctx: &mut Blocker) -> StepResult {
    ctx.gate.open();
    Ok(())
}

fn shared_blocker() -> impl Fn() -> Blocker + Send + Sync + 'static {
    let blocker = Blocker::default();
    move || blocker.clone()
}

#[test]
fn blocked_step_counts_as_success() {
    init_tracing();
    let started = Instant::now();

    Lockstep::configure(shared_blocker())
        .first_starts_with(|_, _| Ok(()))
        .then_second_times_out_after(wait_for_gate, BLOCKED)
        .then_first(open_gate)
        .then_second_does_nothing()
        .run()
        .unwrap();

    assert!(started.elapsed() >= BLOCKED);
}

#[test]
fn completed_step_is_unexpected() {
    init_tracing();
    let result = Lockstep::configure(shared_blocker())
        .first_starts_with(open_gate)
        .then_second_times_out_after(wait_for_gate, Duration::from_secs(5))
        .run();

    let record = failure_of(result);
    assert_eq!(record.lane, LaneId::Second);
    assert_eq!(record.step_index(), Some(0));
    assert!(matches!(
        record.error,
        StepError::UnexpectedCompletion { timeout } if timeout == Duration::from_secs(5)
    ));
}

#[test]
fn collaborator_timeout_counts_as_success() {
    init_tracing();
    Lockstep::configure(|| ())
        .first_starts_with(|_, _| Ok(()))
        .then_second_times_out_after(
            |_, _| Err(StepError::timed_out("lock wait timeout exceeded")),
            Duration::from_secs(5),
        )
        .run()
        .unwrap();
}

#[test]
fn other_errors_are_not_timeouts() {
    init_tracing();
    let result = Lockstep::configure(|| ())
        .then_first_times_out_after(
            |_, _| Err(StepError::assertion("deadlock detected")),
            Duration::from_secs(5),
        )
        .then_second(|_, _| Ok(()))
        .run();

    let record = failure_of(result);
    assert_eq!(record.lane, LaneId::First);
    assert!(matches!(record.error, StepError::Assertion(ref m) if m == "deadlock detected"));
}

#[test]
fn default_deadline_from_config() {
    init_tracing();
    let config = LockstepConfig {
        expected_timeout_ms: 50,
        ..LockstepConfig::default()
    };
    let started = Instant::now();

    Lockstep::configure(shared_blocker())
        .with_config(config)
        .then_first_times_out(wait_for_gate)
        .then_second(open_gate)
        .run()
        .unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(2), "{:?}", elapsed);
}

#[test]
fn prebuilt_wrapper_as_step() {
    init_tracing();
    let wrapper = TimeoutExpected::new(wait_for_gate, BLOCKED);
    assert_eq!(wrapper.timeout(), BLOCKED);

    Lockstep::configure(shared_blocker())
        .first_starts_with(|_, _| Ok(()))
        .then_second_step(wrapper)
        .then_first(open_gate)
        .then_second_does_nothing()
        .run()
        .unwrap();
}

#[test]
fn background_thread_named_after_lane() {
    init_tracing();
    let name = Arc::new(parking_lot::Mutex::new(None));
    let seen = Arc::clone(&name);
    let config = LockstepConfig {
        thread_name_prefix: "bank".to_string(),
        ..LockstepConfig::default()
    };

    Lockstep::configure(|| ())
        .with_config(config)
        .first_starts_with(|_, _| Ok(()))
        .then_second_times_out_after(
            move |_, _| {
                *seen.lock() = std::thread::current().name().map(str::to_string);
                Err(StepError::timed_out("lock wait timeout exceeded"))
            },
            Duration::from_secs(5),
        )
        .run()
        .unwrap();

    assert_eq!(name.lock().as_deref(), Some("bank-T2-timeout"));
}
