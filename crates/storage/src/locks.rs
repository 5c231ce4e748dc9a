//! Row lock table
//!
//! Pure bookkeeping of which transaction holds which row lock. Waiting for a
//! lock is done by the ledger, which owns the mutex and condvar guarding
//! this table.
//!
//! Compatibility:
//!
//! | held \ requested | Shared | Exclusive |
//! |------------------|--------|-----------|
//! | none             | grant  | grant     |
//! | Shared (others)  | grant  | wait      |
//! | Exclusive (other)| wait   | wait      |
//!
//! Locks are re-entrant. A shared holder that is the only holder may
//! upgrade to exclusive.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Transaction identifier
pub type TxnId = u64;

/// Row lock mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Compatible with other shared locks (`FOR SHARE`)
    Shared,
    /// Incompatible with every other lock (`FOR UPDATE`)
    Exclusive,
}

/// What a lock request does when the row is locked by someone else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockWait {
    /// Fail immediately
    NoWait,
    /// Wait up to the given duration
    Timeout(Duration),
    /// Wait until the lock is granted or the transaction ends
    #[default]
    Forever,
}

#[derive(Debug, Default)]
struct RowLock {
    shared: BTreeSet<TxnId>,
    exclusive: Option<TxnId>,
}

impl RowLock {
    fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }
}

/// Lock holders per account
#[derive(Debug, Default)]
pub struct LockTable {
    rows: HashMap<String, RowLock>,
}

impl LockTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to grant `mode` on `account` to `txn` without waiting
    ///
    /// Returns false if the request conflicts with another holder.
    pub fn try_acquire(&mut self, txn: TxnId, account: &str, mode: LockMode) -> bool {
        let row = self.rows.entry(account.to_string()).or_default();

        match row.exclusive {
            Some(holder) if holder == txn => return true,
            Some(_) => return false,
            None => {}
        }

        match mode {
            LockMode::Shared => {
                row.shared.insert(txn);
                true
            }
            LockMode::Exclusive => {
                let others = row.shared.iter().any(|holder| *holder != txn);
                if others {
                    return false;
                }
                row.shared.remove(&txn);
                row.exclusive = Some(txn);
                true
            }
        }
    }

    /// Strongest mode `txn` holds on `account`
    pub fn held(&self, txn: TxnId, account: &str) -> Option<LockMode> {
        let row = self.rows.get(account)?;
        if row.exclusive == Some(txn) {
            Some(LockMode::Exclusive)
        } else if row.shared.contains(&txn) {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    /// Exclusive holder of `account`, if any
    pub fn exclusive_holder(&self, account: &str) -> Option<TxnId> {
        self.rows.get(account).and_then(|row| row.exclusive)
    }

    /// Drop every lock held by `txn`; returns how many rows were released
    pub fn release_all(&mut self, txn: TxnId) -> usize {
        let mut released = 0;
        for row in self.rows.values_mut() {
            let shared = row.shared.remove(&txn);
            let exclusive = row.exclusive == Some(txn);
            if exclusive {
                row.exclusive = None;
            }
            if shared || exclusive {
                released += 1;
            }
        }
        self.rows.retain(|_, row| !row.is_free());
        released
    }
}
