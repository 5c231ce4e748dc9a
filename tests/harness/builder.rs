//! Builder validation

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn uneven_lanes_never_start_a_worker() {
    init_tracing();
    let executed = Arc::new(AtomicUsize::new(0));
    let counting_step = |executed: &Arc<AtomicUsize>| {
        let executed = Arc::clone(executed);
        move |_: &mut (), _: &mut ()| -> StepResult {
            executed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    };

    let err = Lockstep::configure(|| ())
        .first_starts_with(counting_step(&executed))
        .then_second(counting_step(&executed))
        .then_first(counting_step(&executed))
        .run()
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(matches!(
        err,
        LockstepError::UnevenSteps {
            first: 2,
            second: 1
        }
    ));
    assert_eq!(executed.load(Ordering::SeqCst), 0);
}

#[test]
fn uneven_lanes_reported_before_alternation() {
    let err = Lockstep::configure(|| ())
        .first_starts_with(|_, _| Ok(()))
        .then_first(|_, _| Ok(()))
        .then_first(|_, _| Ok(()))
        .then_second(|_, _| Ok(()))
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        LockstepError::UnevenSteps {
            first: 3,
            second: 1
        }
    ));
}

#[test]
fn out_of_turn_declaration_rejected() {
    let err = Lockstep::configure(|| ())
        .first_starts_with(|_, _| Ok(()))
        .then_second(|_, _| Ok(()))
        .then_second(|_, _| Ok(()))
        .then_first(|_, _| Ok(()))
        .build()
        .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(
        err.to_string(),
        "step declaration #2 belongs to the first lane, got second"
    );
}

#[test]
fn empty_configuration_rejected() {
    let err = Lockstep::configure(|| ()).run().unwrap_err();
    assert!(matches!(err, LockstepError::NoSteps));
}

#[test]
fn identical_lane_names_rejected() {
    let err = Lockstep::configure(|| ())
        .lane_names("T", "T")
        .first_starts_with(|_, _| Ok(()))
        .then_second(|_, _| Ok(()))
        .build()
        .unwrap_err();
    assert!(matches!(err, LockstepError::InvalidConfig(_)));
}

#[test]
fn declared_counts_declarations() {
    let builder = Lockstep::configure(|| ())
        .first_starts_with(|_, _| Ok(()))
        .then_second_does_nothing();
    assert_eq!(builder.declared(), 2);

    let lanes = builder.build().unwrap();
    assert_eq!(lanes.steps(), 1);
    assert_eq!(lanes.lane(LaneId::First).len(), 1);
    assert_eq!(lanes.lane(LaneId::Second).len(), 1);
}
