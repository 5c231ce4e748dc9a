//! Optimistic locking with row versions

use crate::common::*;

/// What a lane read before deciding on its update
type Seen = Option<AccountState>;

fn read_row(session: &mut Session, seen: &mut Seen) -> StepResult {
    *seen = Some(session.read("acct")?);
    Ok(())
}

fn withdraw_if_unchanged(
    amount: i64,
) -> impl Fn(&mut Session, &mut Seen) -> StepResult + Send + Sync + 'static {
    move |session: &mut Session, seen: &mut Seen| -> StepResult {
        let row = seen.ok_or_else(|| StepError::assertion("row was not read first"))?;
        session.set_balance_if_version("acct", row.version, row.balance - amount)?;
        Ok(())
    }
}

#[test]
fn concurrent_update_detected_by_version() {
    init_tracing();
    let ledger = bank(&[("acct", 100)]);
    let provider = ledger.session_provider(IsolationLevel::ReadCommitted);

    let result = Lockstep::configure_transactional(provider, || Seen::None)
        .first_starts_with(read_row)
        .then_second(read_row)
        .then_first(withdraw_if_unchanged(30))
        .then_second_does_nothing()
        .then_first_commits()
        .then_second(withdraw_if_unchanged(50))
        .run();

    let record = failure_of(result);
    assert_eq!(record.lane, LaneId::Second);
    assert_eq!(
        record.error.downcast_ref::<StorageError>(),
        Some(&StorageError::OptimisticConflict {
            account: "acct".to_string(),
            expected: 0,
            actual: 1,
        })
    );
    assert_eq!(
        ledger.committed("acct").unwrap(),
        AccountState {
            balance: 70,
            version: 1
        }
    );
}

#[test]
fn sequential_updates_both_apply() {
    init_tracing();
    let ledger = bank(&[("acct", 100)]);
    let provider = ledger.session_provider(IsolationLevel::ReadCommitted);

    Lockstep::configure_transactional(provider, || Seen::None)
        .first_starts_with(read_row)
        .then_second_does_nothing()
        .then_first(withdraw_if_unchanged(30))
        .then_second_does_nothing()
        .then_first_commits()
        .then_second(read_row)
        .then_first_does_nothing()
        .then_second(withdraw_if_unchanged(50))
        .run()
        .unwrap();

    assert_eq!(
        ledger.committed("acct").unwrap(),
        AccountState {
            balance: 20,
            version: 2
        }
    );
}
