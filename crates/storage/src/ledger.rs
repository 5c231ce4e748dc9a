//! In-memory account ledger
//!
//! A tiny transactional store standing in for a relational database in
//! lockstep scenarios. It keeps named accounts, each a balance with a
//! version counter, and supports:
//!
//! - three isolation levels (see [`IsolationLevel`])
//! - shared / exclusive row locks with NOWAIT, bounded and unbounded waits
//! - optimistic updates against a row version
//!
//! # Concurrency
//!
//! All state lives behind one `parking_lot::Mutex`. Lock waiters park on a
//! single condvar that is notified whenever a transaction ends, so a waiter
//! re-checks the lock table, whether its own transaction is still active and
//! whether its handle was abandoned after every wake-up.
//!
//! # Writes
//!
//! A write takes an exclusive row lock, records the new balance as an
//! uncommitted overlay of its transaction and is applied, with a version
//! bump, at commit. Rollback discards the overlay.

use crate::error::{Result, StorageError};
use crate::locks::{LockMode, LockTable, LockWait, TxnId};
use crate::session::{Session, SessionProvider};
use lockstep_core::AbandonFlag;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Committed (or visible) state of one account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountState {
    /// Current balance
    pub balance: i64,
    /// Incremented by every commit that wrote the account
    pub version: u64,
}

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// Reads see uncommitted writes of other transactions (dirty reads)
    ReadUncommitted,
    /// Reads see the latest committed state plus the transaction's own writes
    #[default]
    ReadCommitted,
    /// Reads see a snapshot taken at the transaction's first statement;
    /// writing a row that a concurrent transaction changed and committed
    /// since then fails with `SerializationFailure`
    RepeatableRead,
}

#[derive(Debug)]
struct Txn {
    isolation: IsolationLevel,
    writes: BTreeMap<String, i64>,
    snapshot: Option<BTreeMap<String, AccountState>>,
    rollback_only: bool,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: BTreeMap<String, AccountState>,
    active: HashMap<TxnId, Txn>,
    locks: LockTable,
}

impl LedgerState {
    fn committed(&self, account: &str) -> Result<AccountState> {
        self.accounts
            .get(account)
            .copied()
            .ok_or_else(|| StorageError::AccountNotFound(account.to_string()))
    }

    fn txn(&self, txn: TxnId) -> Result<&Txn> {
        self.active
            .get(&txn)
            .ok_or(StorageError::TransactionNotActive(txn))
    }

    fn txn_mut(&mut self, txn: TxnId) -> Result<&mut Txn> {
        self.active
            .get_mut(&txn)
            .ok_or(StorageError::TransactionNotActive(txn))
    }

    /// Fail a statement of an ended transaction or of an abandoned handle
    fn check_live(&self, txn: TxnId, abandoned: Option<&AbandonFlag>) -> Result<()> {
        self.txn(txn)?;
        if abandoned.map_or(false, AbandonFlag::is_abandoned) {
            return Err(StorageError::TransactionNotActive(txn));
        }
        Ok(())
    }

    /// Take the repeatable-read snapshot if this is the first statement
    fn begin_statement(&mut self, txn: TxnId, abandoned: Option<&AbandonFlag>) -> Result<()> {
        self.check_live(txn, abandoned)?;
        let accounts = &self.accounts;
        let t = self
            .active
            .get_mut(&txn)
            .ok_or(StorageError::TransactionNotActive(txn))?;
        if t.isolation == IsolationLevel::RepeatableRead && t.snapshot.is_none() {
            t.snapshot = Some(accounts.clone());
        }
        Ok(())
    }

    /// What `txn` reads for `account`
    fn visible(&self, txn: TxnId, account: &str) -> Result<AccountState> {
        let committed = self.committed(account)?;
        let t = self.txn(txn)?;

        if let Some(&balance) = t.writes.get(account) {
            return Ok(AccountState {
                balance,
                version: committed.version,
            });
        }

        match t.isolation {
            IsolationLevel::ReadCommitted => Ok(committed),
            IsolationLevel::ReadUncommitted => {
                let dirty = self
                    .locks
                    .exclusive_holder(account)
                    .and_then(|holder| self.active.get(&holder))
                    .and_then(|writer| writer.writes.get(account).copied());
                Ok(AccountState {
                    balance: dirty.unwrap_or(committed.balance),
                    version: committed.version,
                })
            }
            IsolationLevel::RepeatableRead => t
                .snapshot
                .as_ref()
                .and_then(|snapshot| snapshot.get(account).copied())
                .ok_or_else(|| StorageError::AccountNotFound(account.to_string())),
        }
    }

    /// Fail a repeatable-read write on a row changed since the snapshot
    fn check_serializable(&self, txn: TxnId, account: &str) -> Result<()> {
        let t = self.txn(txn)?;
        if t.isolation != IsolationLevel::RepeatableRead {
            return Ok(());
        }
        let committed = self.committed(account)?;
        let seen = t
            .snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.get(account));
        match seen {
            Some(seen) if seen.version == committed.version => Ok(()),
            _ => Err(StorageError::SerializationFailure(account.to_string())),
        }
    }

    /// Row state a write builds on: own overlay, else latest committed
    fn current_for_write(&self, txn: TxnId, account: &str) -> Result<AccountState> {
        let committed = self.committed(account)?;
        let balance = self
            .txn(txn)?
            .writes
            .get(account)
            .copied()
            .unwrap_or(committed.balance);
        Ok(AccountState {
            balance,
            version: committed.version,
        })
    }
}

struct LedgerInner {
    state: Mutex<LedgerState>,
    /// Notified whenever a transaction ends and its locks are released
    released: Condvar,
    next_txn: AtomicU64,
}

/// Shared handle to an in-memory ledger
///
/// Cloning is cheap; all clones see the same accounts.
#[derive(Clone)]
pub struct Ledger {
    inner: Arc<LedgerInner>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                state: Mutex::new(LedgerState::default()),
                released: Condvar::new(),
                next_txn: AtomicU64::new(1),
            }),
        }
    }

    /// Create an account with an opening balance (version 0)
    ///
    /// # Errors
    ///
    /// `AccountExists` if the name is taken.
    pub fn open_account(&self, name: impl Into<String>, balance: i64) -> Result<()> {
        let name = name.into();
        let mut state = self.inner.state.lock();
        if state.accounts.contains_key(&name) {
            return Err(StorageError::AccountExists(name));
        }
        state
            .accounts
            .insert(name, AccountState { balance, version: 0 });
        Ok(())
    }

    /// Committed state of an account, outside any transaction
    pub fn committed(&self, account: &str) -> Result<AccountState> {
        self.inner.state.lock().committed(account)
    }

    /// Names of all accounts
    pub fn accounts(&self) -> Vec<String> {
        self.inner.state.lock().accounts.keys().cloned().collect()
    }

    /// Number of transactions that neither committed nor rolled back
    pub fn active_transactions(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    /// Start a transaction whose lock requests wait forever
    pub fn begin(&self, isolation: IsolationLevel) -> Session {
        self.begin_with(isolation, LockWait::Forever)
    }

    /// Start a transaction with a default lock wait policy
    pub fn begin_with(&self, isolation: IsolationLevel, lock_wait: LockWait) -> Session {
        let id = self.inner.next_txn.fetch_add(1, Ordering::Relaxed);
        self.inner.state.lock().active.insert(
            id,
            Txn {
                isolation,
                writes: BTreeMap::new(),
                snapshot: None,
                rollback_only: false,
            },
        );
        debug!(txn = id, ?isolation, ?lock_wait, "begin");
        Session::new(self.clone(), id, isolation, lock_wait)
    }

    /// Resource provider opening one session per lane
    pub fn session_provider(&self, isolation: IsolationLevel) -> SessionProvider {
        SessionProvider::new(self.clone(), isolation)
    }

    pub(crate) fn is_active(&self, txn: TxnId) -> bool {
        self.inner.state.lock().active.contains_key(&txn)
    }

    pub(crate) fn is_rollback_only(&self, txn: TxnId) -> bool {
        self.inner
            .state
            .lock()
            .active
            .get(&txn)
            .map_or(false, |t| t.rollback_only)
    }

    pub(crate) fn set_rollback_only(&self, txn: TxnId) -> Result<()> {
        self.inner.state.lock().txn_mut(txn)?.rollback_only = true;
        Ok(())
    }

    pub(crate) fn read(
        &self,
        txn: TxnId,
        abandoned: Option<&AbandonFlag>,
        account: &str,
    ) -> Result<AccountState> {
        let mut state = self.inner.state.lock();
        state.committed(account)?;
        state.begin_statement(txn, abandoned)?;
        state.visible(txn, account)
    }

    pub(crate) fn lock(
        &self,
        txn: TxnId,
        abandoned: Option<&AbandonFlag>,
        account: &str,
        mode: LockMode,
        wait: LockWait,
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.committed(account)?;
        state.begin_statement(txn, abandoned)?;
        self.acquire(&mut state, txn, abandoned, account, mode, wait)
    }

    /// Lock the row exclusively and buffer the balance computed by `update`
    ///
    /// `update` receives the row the write builds on and returns the new
    /// balance. Returns the state the transaction now sees.
    pub(crate) fn write<F>(
        &self,
        txn: TxnId,
        abandoned: Option<&AbandonFlag>,
        account: &str,
        wait: LockWait,
        update: F,
    ) -> Result<AccountState>
    where
        F: FnOnce(AccountState) -> Result<i64>,
    {
        let mut state = self.inner.state.lock();
        state.committed(account)?;
        state.begin_statement(txn, abandoned)?;
        self.acquire(&mut state, txn, abandoned, account, LockMode::Exclusive, wait)?;
        state.check_serializable(txn, account)?;

        let current = state.current_for_write(txn, account)?;
        let balance = update(current)?;
        state
            .txn_mut(txn)?
            .writes
            .insert(account.to_string(), balance);
        Ok(AccountState {
            balance,
            version: current.version,
        })
    }

    fn acquire(
        &self,
        state: &mut MutexGuard<'_, LedgerState>,
        txn: TxnId,
        abandoned: Option<&AbandonFlag>,
        account: &str,
        mode: LockMode,
        wait: LockWait,
    ) -> Result<()> {
        let started = Instant::now();
        let mut waiting = false;

        loop {
            state.check_live(txn, abandoned)?;
            if state.locks.try_acquire(txn, account, mode) {
                if waiting {
                    debug!(txn, account, ?mode, waited = ?started.elapsed(), "lock granted");
                }
                return Ok(());
            }
            if !waiting {
                debug!(txn, account, ?mode, ?wait, "lock wait");
                waiting = true;
            }

            match wait {
                LockWait::NoWait => {
                    return Err(StorageError::LockNotAvailable(account.to_string()));
                }
                LockWait::Forever => self.inner.released.wait(state),
                LockWait::Timeout(timeout) => {
                    let deadline = started + timeout;
                    if Instant::now() >= deadline {
                        return Err(StorageError::LockTimeout {
                            account: account.to_string(),
                            timeout,
                        });
                    }
                    self.inner.released.wait_until(state, deadline);
                }
            }
        }
    }

    pub(crate) fn commit(&self, txn: TxnId) -> Result<()> {
        let mut state = self.inner.state.lock();
        let t = state
            .active
            .remove(&txn)
            .ok_or(StorageError::TransactionNotActive(txn))?;

        let result = if t.rollback_only {
            debug!(txn, "commit of rollback-only transaction; rolled back");
            Err(StorageError::RollbackOnly(txn))
        } else {
            for (account, balance) in t.writes {
                if let Some(row) = state.accounts.get_mut(&account) {
                    row.balance = balance;
                    row.version += 1;
                }
            }
            debug!(txn, "commit");
            Ok(())
        };

        state.locks.release_all(txn);
        drop(state);
        self.inner.released.notify_all();
        result
    }

    pub(crate) fn rollback(&self, txn: TxnId) -> Result<()> {
        let mut state = self.inner.state.lock();
        state
            .active
            .remove(&txn)
            .ok_or(StorageError::TransactionNotActive(txn))?;
        state.locks.release_all(txn);
        drop(state);
        self.inner.released.notify_all();
        debug!(txn, "rollback");
        Ok(())
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Ledger")
            .field("accounts", &state.accounts)
            .field("active", &state.active.len())
            .finish()
    }
}
