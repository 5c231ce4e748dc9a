//! Failure propagation across lanes

use crate::common::*;
use std::io;

fn fail(
    message: &'static str,
) -> impl Fn(&mut (), &mut Journal) -> StepResult + Send + Sync + 'static {
    move |_: &mut (), journal: &mut Journal| -> StepResult {
        journal.record(message);
        Err(StepError::assertion(message))
    }
}

#[test]
fn first_lane_failure_skips_paired_step() {
    init_tracing();
    let journal = Journal::new();

    let result = Lockstep::configure(journal.factory())
        .first_starts_with(log("T1 #1"))
        .then_second(log("T2 #1"))
        .then_first(fail("T1 #2 fails"))
        .then_second(log("T2 #2"))
        .then_first(log("T1 #3"))
        .then_second(log("T2 #3"))
        .run();

    let record = failure_of(result);
    assert_eq!(record.lane, LaneId::First);
    assert_eq!(record.lane_name, "T1");
    assert_eq!(record.point, FailurePoint::Step(1));
    assert!(matches!(record.error, StepError::Assertion(ref m) if m == "T1 #2 fails"));
    assert_eq!(journal.entries(), vec!["T1 #1", "T2 #1", "T1 #2 fails"]);
}

#[test]
fn second_lane_failure_stops_first_lane() {
    init_tracing();
    let journal = Journal::new();

    let result = Lockstep::configure(journal.factory())
        .first_starts_with(log("T1 #1"))
        .then_second(fail("T2 #1 fails"))
        .then_first(log("T1 #2"))
        .then_second(log("T2 #2"))
        .run();

    let record = failure_of(result);
    assert_eq!(record.lane, LaneId::Second);
    assert_eq!(record.step_index(), Some(0));
    assert_eq!(journal.entries(), vec!["T1 #1", "T2 #1 fails"]);
}

#[test]
fn failure_in_last_step_is_reported() {
    init_tracing();
    let journal = Journal::new();

    let result = Lockstep::configure(journal.factory())
        .first_starts_with(log("T1 #1"))
        .then_second(fail("T2 #1 fails"))
        .run();

    assert_eq!(failure_of(result).step_index(), Some(0));
}

#[test]
fn collaborator_error_forwarded_verbatim() {
    init_tracing();
    let result = Lockstep::configure(|| ())
        .first_starts_with(|_, _| {
            Err(StepError::failed(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "database is down",
            )))
        })
        .then_second(|_, _| Ok(()))
        .run();

    let record = failure_of(result);
    let io_err = record.error.downcast_ref::<io::Error>().unwrap();
    assert_eq!(io_err.kind(), io::ErrorKind::ConnectionRefused);
}

#[test]
fn panicking_step_fails_the_run() {
    init_tracing();
    let journal = Journal::new();

    let result = Lockstep::configure(journal.factory())
        .first_starts_with(log("T1 #1"))
        .then_second(|_, _| {
            assert_eq!(1 + 1, 3, "arithmetic is broken");
            Ok(())
        })
        .then_first(log("T1 #2"))
        .then_second(log("T2 #2"))
        .run();

    let record = failure_of(result);
    assert_eq!(record.lane, LaneId::Second);
    match record.error {
        StepError::Panicked(message) => assert!(message.contains("arithmetic is broken")),
        other => panic!("expected a panic, got {:?}", other),
    }
    assert_eq!(journal.entries(), vec!["T1 #1"]);
}

#[test]
fn error_message_names_lane_and_step() {
    init_tracing();
    let err = Lockstep::configure(|| ())
        .lane_names("reader", "writer")
        .first_starts_with(|_, _| Ok(()))
        .then_second(|_, _| Err(StepError::assertion("stale read")))
        .run()
        .unwrap_err();

    assert!(!err.is_configuration());
    let message = err.to_string();
    assert!(message.contains("writer"), "{}", message);
    assert!(message.contains("step #0"), "{}", message);
    assert!(message.contains("stale read"), "{}", message);
}

#[test]
fn run_after_failure_starts_clean() {
    init_tracing();
    let journal = Journal::new();
    let attempts = journal.clone();

    let lanes = Lockstep::configure(journal.factory())
        .first_starts_with(move |_, _| {
            attempts.record("attempt");
            if attempts.len() == 1 {
                return Err(StepError::assertion("first attempt fails"));
            }
            Ok(())
        })
        .then_second(log("T2 #1"))
        .build()
        .unwrap();

    assert!(lanes.run().is_err());
    lanes.run().unwrap();
    assert_eq!(journal.entries(), vec!["attempt", "attempt", "T2 #1"]);
}
