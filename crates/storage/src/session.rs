//! Sessions and the session provider
//!
//! A [`Session`] is a handle to one ledger transaction. Clones share the
//! transaction. A timeout-expected step works on a detached handle
//! ([`Detach`]): once its step is abandoned, the ledger refuses every
//! statement issued through that handle, including a lock wait still in
//! progress, with `TransactionNotActive`. Pending lock waits of any handle
//! also give up that way once the transaction ends.

use crate::error::{Result, StorageError};
use crate::ledger::{AccountState, IsolationLevel, Ledger};
use crate::locks::{LockMode, LockWait, TxnId};
use lockstep_core::{
    AbandonFlag, Detach, LaneId, LaneOutcome, ResourceProvider, StepError, Transactional,
};
use std::sync::Arc;
use tracing::{debug, warn};

struct SessionInner {
    ledger: Ledger,
    id: TxnId,
    isolation: IsolationLevel,
    lock_wait: LockWait,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if self.ledger.is_active(self.id) {
            debug!(txn = self.id, "last session handle dropped; rolling back");
            if let Err(e) = self.ledger.rollback(self.id) {
                warn!(txn = self.id, error = %e, "rollback on drop failed");
            }
        }
    }
}

/// Handle to one ledger transaction
///
/// Dropping the last handle of an active transaction rolls it back.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
    /// Set on handles lent to a timeout-expected step
    abandoned: Option<AbandonFlag>,
}

impl Session {
    pub(crate) fn new(ledger: Ledger, id: TxnId, isolation: IsolationLevel, lock_wait: LockWait) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                ledger,
                id,
                isolation,
                lock_wait,
            }),
            abandoned: None,
        }
    }

    /// Transaction id
    pub fn id(&self) -> TxnId {
        self.inner.id
    }

    /// Isolation level of the transaction
    pub fn isolation(&self) -> IsolationLevel {
        self.inner.isolation
    }

    /// Lock wait policy used by writes and [`lock`](Self::lock)
    pub fn lock_wait(&self) -> LockWait {
        self.inner.lock_wait
    }

    /// The ledger this session belongs to
    pub fn ledger(&self) -> &Ledger {
        &self.inner.ledger
    }

    /// Balance as seen by this transaction
    pub fn balance(&self, account: &str) -> Result<i64> {
        Ok(self.read(account)?.balance)
    }

    /// Balance and version as seen by this transaction
    pub fn read(&self, account: &str) -> Result<AccountState> {
        self.inner
            .ledger
            .read(self.inner.id, self.abandoned.as_ref(), account)
    }

    /// Add `amount` to the balance; returns the new balance
    ///
    /// # Errors
    ///
    /// `BalanceOverflow` if the new balance does not fit an `i64`.
    pub fn deposit(&self, account: &str, amount: i64) -> Result<i64> {
        let state = self.write(account, |current| {
            current
                .balance
                .checked_add(amount)
                .ok_or_else(|| StorageError::BalanceOverflow {
                    account: account.to_string(),
                    amount,
                })
        })?;
        Ok(state.balance)
    }

    /// Overwrite the balance
    pub fn set_balance(&self, account: &str, balance: i64) -> Result<()> {
        self.write(account, |_| Ok(balance))?;
        Ok(())
    }

    /// Overwrite the balance if the row still has `expected_version`
    ///
    /// # Errors
    ///
    /// `OptimisticConflict` if a concurrent transaction committed a write to
    /// the row after the caller read it.
    pub fn set_balance_if_version(&self, account: &str, expected_version: u64, balance: i64) -> Result<()> {
        self.write(account, |current| {
            if current.version != expected_version {
                return Err(StorageError::OptimisticConflict {
                    account: account.to_string(),
                    expected: expected_version,
                    actual: current.version,
                });
            }
            Ok(balance)
        })?;
        Ok(())
    }

    fn write<F>(&self, account: &str, update: F) -> Result<AccountState>
    where
        F: FnOnce(AccountState) -> Result<i64>,
    {
        self.inner.ledger.write(
            self.inner.id,
            self.abandoned.as_ref(),
            account,
            self.inner.lock_wait,
            update,
        )
    }

    /// Lock a row with the session's lock wait policy
    pub fn lock(&self, account: &str, mode: LockMode) -> Result<()> {
        self.lock_with(account, mode, self.inner.lock_wait)
    }

    /// Lock a row with an explicit lock wait policy
    pub fn lock_with(&self, account: &str, mode: LockMode, wait: LockWait) -> Result<()> {
        self.inner
            .ledger
            .lock(self.inner.id, self.abandoned.as_ref(), account, mode, wait)
    }

    /// Commit the transaction and release its locks
    pub fn commit(&self) -> Result<()> {
        self.inner.ledger.commit(self.inner.id)
    }

    /// Roll the transaction back and release its locks
    pub fn rollback(&self) -> Result<()> {
        self.inner.ledger.rollback(self.inner.id)
    }

    /// Mark the transaction so that it can only be rolled back
    pub fn set_rollback_only(&self) -> Result<()> {
        self.inner.ledger.set_rollback_only(self.inner.id)
    }

    /// Whether the transaction is still open
    pub fn is_active(&self) -> bool {
        self.inner.ledger.is_active(self.inner.id)
    }

    /// Whether the transaction was marked rollback-only
    pub fn is_rollback_only(&self) -> bool {
        self.inner.ledger.is_rollback_only(self.inner.id)
    }
}

impl Detach for Session {
    fn detach(&self, flag: &AbandonFlag) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            abandoned: Some(flag.clone()),
        }
    }
}

impl Transactional for Session {
    fn commit(&mut self) -> std::result::Result<(), StepError> {
        Session::commit(self).map_err(StepError::from)
    }

    fn rollback(&mut self) -> std::result::Result<(), StepError> {
        Session::rollback(self).map_err(StepError::from)
    }

    fn is_active(&self) -> bool {
        Session::is_active(self)
    }

    fn is_rollback_only(&self) -> bool {
        Session::is_rollback_only(self)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("isolation", &self.inner.isolation)
            .field("lock_wait", &self.inner.lock_wait)
            .finish()
    }
}

/// Opens one ledger session per lane
///
/// On release, a transaction the steps left open is rolled back. Wrap the
/// provider in `TransactionalProvider` to commit it instead when the run
/// succeeded.
#[derive(Debug, Clone)]
pub struct SessionProvider {
    ledger: Ledger,
    isolation: IsolationLevel,
    lock_wait: LockWait,
}

impl SessionProvider {
    /// Provider for sessions at `isolation` whose locks wait forever
    pub fn new(ledger: Ledger, isolation: IsolationLevel) -> Self {
        Self {
            ledger,
            isolation,
            lock_wait: LockWait::Forever,
        }
    }

    /// Use a different default lock wait policy
    pub fn with_lock_wait(mut self, lock_wait: LockWait) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    /// The ledger sessions are opened on
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

impl ResourceProvider for SessionProvider {
    type Resource = Session;

    fn open(&self, lane: LaneId) -> std::result::Result<Session, StepError> {
        let session = self.ledger.begin_with(self.isolation, self.lock_wait);
        debug!(%lane, txn = session.id(), "session opened");
        Ok(session)
    }

    fn release(
        &self,
        lane: LaneId,
        session: Session,
        _outcome: LaneOutcome,
    ) -> std::result::Result<(), StepError> {
        if session.is_active() {
            debug!(%lane, txn = session.id(), "rolling back transaction left open");
            session.rollback()?;
        }
        Ok(())
    }
}
