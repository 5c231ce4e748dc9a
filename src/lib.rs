//! Lockstep - deterministic two-lane execution for reproducing races
//!
//! Two scripted participants run on their own threads while the harness
//! forces a fixed interleaving of their steps, so isolation anomalies and
//! lock conflicts become reproducible instead of probabilistic.
//!
//! # Quick Start
//!
//! ```
//! use lockstep::ledger::{IsolationLevel, Ledger};
//! use lockstep::Lockstep;
//!
//! let ledger = Ledger::new();
//! ledger.open_account("acct", 100).unwrap();
//!
//! Lockstep::configure_transactional(ledger.session_provider(IsolationLevel::ReadCommitted), || ())
//!     .first_starts_with(|session, _| {
//!         session.deposit("acct", 100)?;
//!         Ok(())
//!     })
//!     .then_second(|session, _| {
//!         assert_eq!(session.balance("acct")?, 100);
//!         Ok(())
//!     })
//!     .then_first_commits()
//!     .then_second(|session, _| {
//!         assert_eq!(session.balance("acct")?, 200);
//!         Ok(())
//!     })
//!     .run()
//!     .unwrap();
//! ```
//!
//! # Architecture
//!
//! - `lockstep-core`: ids, error taxonomy, collaborator traits, configuration
//! - `lockstep-concurrency`: gates, lanes, workers, coordinator and builder
//! - `lockstep-storage` (re-exported as [`ledger`]): in-memory transactional
//!   collaborator used by scenario tests

pub use lockstep_concurrency::*;
pub use lockstep_core::*;

/// In-memory transactional ledger
pub use lockstep_storage as ledger;
