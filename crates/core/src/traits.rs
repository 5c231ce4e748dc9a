//! Core traits for the external collaborator boundary
//!
//! The harness never talks to a database directly. Each lane obtains an
//! opaque resource (a session, a connection, a transaction handle) from a
//! [`ResourceProvider`] and threads it through its step bodies. The provider
//! owns the resource lifecycle: it opens the resource before the lane starts
//! and releases it once both lanes are done with their steps.

use crate::error::StepError;
use crate::types::LaneId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How a run ended, as seen by a lane when its resource is released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneOutcome {
    /// Every step of both lanes completed
    Completed,
    /// Some lane recorded a failure; remaining steps were abandoned
    Failed,
}

impl LaneOutcome {
    /// Whether the run is failing
    pub fn is_failed(&self) -> bool {
        matches!(self, LaneOutcome::Failed)
    }
}

/// Supplies one resource per lane and owns its lifecycle
///
/// `open` runs on the lane's worker thread before the start signal.
/// `release` runs on the same thread after both lanes reached the
/// steps-finished rendezvous, so a lane's transaction is never finalized
/// while the other lane may still be using its own.
pub trait ResourceProvider: Send + Sync {
    /// Resource handed to every step of one lane
    type Resource: Send;

    /// Open the resource for a lane
    fn open(&self, lane: LaneId) -> Result<Self::Resource, StepError>;

    /// Release the resource once both lanes finished their steps
    fn release(
        &self,
        lane: LaneId,
        resource: Self::Resource,
        outcome: LaneOutcome,
    ) -> Result<(), StepError>;
}

/// Provider for lanes that need no external resource
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResource;

impl ResourceProvider for NoResource {
    type Resource = ();

    fn open(&self, _lane: LaneId) -> Result<(), StepError> {
        Ok(())
    }

    fn release(&self, _lane: LaneId, _resource: (), _outcome: LaneOutcome) -> Result<(), StepError> {
        Ok(())
    }
}

/// A resource carrying a transaction that can be finished explicitly
///
/// Steps may commit the transaction themselves (e.g. "first lane commits");
/// whatever is still active when the lane is released gets committed or
/// rolled back by [`TransactionalProvider`](crate::TransactionalProvider).
pub trait Transactional {
    /// Commit the transaction
    fn commit(&mut self) -> Result<(), StepError>;

    /// Roll the transaction back
    fn rollback(&mut self) -> Result<(), StepError>;

    /// Whether the transaction is still open
    fn is_active(&self) -> bool;

    /// Whether the transaction was marked to be rolled back
    fn is_rollback_only(&self) -> bool {
        false
    }
}

/// Adapter finishing transactional resources with commit-or-rollback
///
/// On release: an active transaction is committed when the run completed
/// and it was not marked rollback-only; otherwise it is rolled back.
/// A rollback failure is returned like any release failure; the worker only
/// records it when the run has no earlier failure, so it never masks one.
#[derive(Debug, Clone)]
pub struct TransactionalProvider<P> {
    inner: P,
}

impl<P> TransactionalProvider<P> {
    /// Wrap a provider
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    /// Access the wrapped provider
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P> ResourceProvider for TransactionalProvider<P>
where
    P: ResourceProvider,
    P::Resource: Transactional,
{
    type Resource = P::Resource;

    fn open(&self, lane: LaneId) -> Result<Self::Resource, StepError> {
        self.inner.open(lane)
    }

    fn release(
        &self,
        lane: LaneId,
        mut resource: Self::Resource,
        outcome: LaneOutcome,
    ) -> Result<(), StepError> {
        let finished = if !resource.is_active() {
            Ok(())
        } else if outcome.is_failed() || resource.is_rollback_only() {
            resource.rollback()
        } else {
            resource.commit()
        };
        let released = self.inner.release(lane, resource, outcome);
        finished.and(released)
    }
}

/// Raised once a timeout-expected step gave up on its background work
///
/// Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct AbandonFlag(Arc<AtomicBool>);

impl AbandonFlag {
    /// A flag that is not raised yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag
    pub fn abandon(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the work was abandoned
    pub fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A resource that can be lent to background work the lane may abandon
///
/// A timeout-expected step runs its body on a separate thread over a
/// detached handle. Once `flag` is raised the resource must refuse every
/// further operation issued through that handle, so that abandoned work can
/// no longer change what the lane commits.
pub trait Detach: Sized {
    /// A handle to the same resource, cut off when `flag` is raised
    fn detach(&self, flag: &AbandonFlag) -> Self;
}

impl Detach for () {
    fn detach(&self, _flag: &AbandonFlag) -> Self {}
}
