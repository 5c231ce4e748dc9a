//! In-memory transactional ledger for lockstep scenarios
//!
//! This crate implements a small database stand-in with:
//! - Ledger: named accounts with balance and version
//! - Sessions: one transaction each, cloneable handles
//! - Isolation levels: read uncommitted, read committed, repeatable read
//! - Row locks: shared / exclusive, NOWAIT, bounded and unbounded waits
//! - Optimistic updates against a row version
//!
//! [`SessionProvider`] plugs the ledger into the harness as a
//! `ResourceProvider`, and [`StorageError`] converts into `StepError` so
//! step bodies can use `?` on ledger calls.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ledger;
pub mod locks;
pub mod session;

pub use error::{Result, StorageError};
pub use ledger::{AccountState, IsolationLevel, Ledger};
pub use locks::{LockMode, LockTable, LockWait, TxnId};
pub use session::{Session, SessionProvider};
