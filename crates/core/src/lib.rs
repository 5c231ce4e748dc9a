//! Core types and traits for the lockstep harness
//!
//! This crate defines the foundational types used throughout the workspace:
//! - RunId: Unique identifier for one run
//! - LaneId: First or second participant
//! - FailurePoint / FailureRecord: The single failure surviving a run
//! - Error: StepError (step bodies) and LockstepError (build/run)
//! - Traits: ResourceProvider and Transactional (collaborator boundary)
//! - Config: LockstepConfig loaded from `lockstep.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{LockstepConfig, CONFIG_FILE_NAME};
pub use error::{BoxError, LockstepError, Result, StepError, StepResult};
pub use traits::{
    AbandonFlag, Detach, LaneOutcome, NoResource, ResourceProvider, Transactional,
    TransactionalProvider,
};
pub use types::{FailurePoint, FailureRecord, LaneId, RunId};
