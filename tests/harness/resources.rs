//! Resource lifecycle around the steps

use crate::common::*;
use lockstep::{LaneOutcome, ResourceProvider};

/// Provider journaling its lifecycle calls
struct Recording {
    journal: Journal,
    fail_open: Option<LaneId>,
    fail_release: Option<LaneId>,
}

impl Recording {
    fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            fail_open: None,
            fail_release: None,
        }
    }
}

impl ResourceProvider for Recording {
    type Resource = LaneId;

    fn open(&self, lane: LaneId) -> Result<LaneId, StepError> {
        if self.fail_open == Some(lane) {
            return Err(StepError::failed("connection refused"));
        }
        self.journal.record(format!("open {}", lane));
        Ok(lane)
    }

    fn release(&self, lane: LaneId, _: LaneId, outcome: LaneOutcome) -> Result<(), StepError> {
        self.journal.record(format!("release {} {:?}", lane, outcome));
        if self.fail_release == Some(lane) {
            return Err(StepError::failed("connection lost"));
        }
        Ok(())
    }
}

fn lane_step(
    label: &'static str,
) -> impl Fn(&mut LaneId, &mut Journal) -> StepResult + Send + Sync + 'static {
    move |lane: &mut LaneId, journal: &mut Journal| -> StepResult {
        journal.record(format!("{} {}", lane, label));
        Ok(())
    }
}

fn sorted(entries: &[String]) -> Vec<String> {
    let mut entries = entries.to_vec();
    entries.sort();
    entries
}

#[test]
fn resources_open_before_and_release_after_all_steps() {
    init_tracing();
    let journal = Journal::new();

    Lockstep::configure_with(Recording::new(&journal), journal.factory())
        .first_starts_with(lane_step("step 1"))
        .then_second(lane_step("step 1"))
        .then_first(lane_step("step 2"))
        .then_second(lane_step("step 2"))
        .run()
        .unwrap();

    let entries = journal.entries();
    assert_eq!(entries.len(), 8);
    assert_eq!(sorted(&entries[..2]), vec!["open first", "open second"]);
    assert_eq!(
        entries[2..6].to_vec(),
        vec!["first step 1", "second step 1", "first step 2", "second step 2"]
    );
    assert_eq!(
        sorted(&entries[6..]),
        vec!["release first Completed", "release second Completed"]
    );
}

#[test]
fn failed_run_releases_with_failed_outcome() {
    init_tracing();
    let journal = Journal::new();

    let result = Lockstep::configure_with(Recording::new(&journal), journal.factory())
        .first_starts_with(lane_step("step 1"))
        .then_second(|_, _| Err(StepError::assertion("boom")))
        .run();

    assert_eq!(failure_of(result).lane, LaneId::Second);
    let entries = journal.entries();
    assert_eq!(
        sorted(&entries[entries.len() - 2..]),
        vec!["release first Failed", "release second Failed"]
    );
}

#[test]
fn open_failure_runs_no_step() {
    init_tracing();
    let journal = Journal::new();
    let provider = Recording {
        fail_open: Some(LaneId::First),
        ..Recording::new(&journal)
    };

    let result = Lockstep::configure_with(provider, journal.factory())
        .first_starts_with(lane_step("step 1"))
        .then_second(lane_step("step 1"))
        .run();

    let record = failure_of(result);
    assert_eq!(record.lane, LaneId::First);
    assert_eq!(record.point, FailurePoint::Open);
    assert_eq!(record.step_index(), None);
    // The lane that did open releases its resource.
    assert_eq!(journal.entries(), vec!["open second", "release second Failed"]);
}

#[test]
fn release_failure_fails_successful_run() {
    init_tracing();
    let journal = Journal::new();
    let provider = Recording {
        fail_release: Some(LaneId::Second),
        ..Recording::new(&journal)
    };

    let result = Lockstep::configure_with(provider, journal.factory())
        .first_starts_with(lane_step("step 1"))
        .then_second(lane_step("step 1"))
        .run();

    let record = failure_of(result);
    assert_eq!(record.lane, LaneId::Second);
    assert_eq!(record.point, FailurePoint::Release);
}

#[test]
fn release_failure_does_not_mask_step_failure() {
    init_tracing();
    let journal = Journal::new();
    let provider = Recording {
        fail_release: Some(LaneId::First),
        ..Recording::new(&journal)
    };

    let result = Lockstep::configure_with(provider, journal.factory())
        .first_starts_with(lane_step("step 1"))
        .then_second(|_, _| Err(StepError::assertion("original failure")))
        .run();

    let record = failure_of(result);
    assert_eq!(record.lane, LaneId::Second);
    assert_eq!(record.point, FailurePoint::Step(0));
}

#[test]
fn transactional_run_commits_both_lanes() {
    init_tracing();
    let ledger = bank(&[("alice", 100), ("bob", 100)]);

    let provider = ledger.session_provider(IsolationLevel::ReadCommitted);
    Lockstep::configure_transactional(provider, || ())
        .first_starts_with(|session, _| {
            session.deposit("alice", 10)?;
            Ok(())
        })
        .then_second(|session, _| {
            session.deposit("bob", 20)?;
            Ok(())
        })
        .run()
        .unwrap();

    assert_eq!(committed_balance(&ledger, "alice"), 110);
    assert_eq!(committed_balance(&ledger, "bob"), 120);
    assert_eq!(ledger.active_transactions(), 0);
}

#[test]
fn transactional_run_rolls_back_on_failure() {
    init_tracing();
    let ledger = bank(&[("alice", 100), ("bob", 100)]);

    let result = Lockstep::configure_transactional(
        ledger.session_provider(IsolationLevel::ReadCommitted),
        || (),
    )
    .first_starts_with(|session, _| {
        session.deposit("alice", 10)?;
        Ok(())
    })
    .then_second(|session, _| {
        session.deposit("bob", 20)?;
        Err(StepError::assertion("abort"))
    })
    .run();

    assert!(result.is_err());
    assert_eq!(committed_balance(&ledger, "alice"), 100);
    assert_eq!(committed_balance(&ledger, "bob"), 100);
    assert_eq!(ledger.active_transactions(), 0);
}

#[test]
fn rollback_only_transaction_is_not_committed() {
    init_tracing();
    let ledger = bank(&[("alice", 100)]);

    let provider = ledger.session_provider(IsolationLevel::ReadCommitted);
    Lockstep::configure_transactional(provider, || ())
        .first_starts_with(|session, _| {
            session.deposit("alice", 10)?;
            session.set_rollback_only()?;
            Ok(())
        })
        .then_second_does_nothing()
        .run()
        .unwrap();

    assert_eq!(committed_balance(&ledger, "alice"), 100);
}

#[test]
fn plain_session_provider_rolls_back_leftovers() {
    init_tracing();
    let ledger = bank(&[("alice", 100)]);

    let provider = ledger.session_provider(IsolationLevel::ReadCommitted);
    Lockstep::configure_with(provider, || ())
        .first_starts_with(|session, _| {
            session.deposit("alice", 10)?;
            Ok(())
        })
        .then_second_does_nothing()
        .run()
        .unwrap();

    assert_eq!(committed_balance(&ledger, "alice"), 100);
    assert_eq!(ledger.active_transactions(), 0);
}
