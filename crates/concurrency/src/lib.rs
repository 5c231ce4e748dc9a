//! Deterministic two-lane lockstep execution
//!
//! This crate runs two scripted participants ("lanes") on separate threads
//! and forces a fixed interleaving of their steps:
//!
//! - [`gate`]: one-shot gates, rendezvous latches and the per-run gate wiring
//! - [`step`]: step actions and lanes
//! - [`timeout`]: the timeout-expected step wrapper
//! - [`coordinator`]: [`TwoLanes`], which spawns the workers and collects the first failure
//! - [`builder`]: the fluent [`Lockstep`] surface
//!
//! Step *i* of the first lane happens-before step *i* of the second lane,
//! which happens-before step *i+1* of the first lane.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod coordinator;
pub mod gate;
pub mod step;
pub mod timeout;
mod worker;

pub use builder::{Lockstep, LockstepBuilder};
pub use coordinator::{ContextFactory, RunSummary, TwoLanes};
pub use gate::{Gate, GateSet, Latch};
pub use step::{BoxedStep, Commit, Idle, Lane, StepAction};
pub use timeout::TimeoutExpected;
