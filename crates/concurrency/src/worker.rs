//! Lane worker loop
//!
//! Each lane runs on its own worker thread:
//!
//! ```text
//! 1. open resource, create context, arrive at `ready`
//! 2. for each step: wait gate → check failure → execute → fire successor
//! 3. arrive at `steps_finished`, wait for the other lane
//! 4. release resource (commit / rollback lives in the provider)
//! ```
//!
//! A lane that stops early (own failure, failure observed in the other lane,
//! resource open failure, panic) opens every remaining successor gate, so
//! the other lane is never parked on a gate nobody will open.

use crate::gate::{GateSet, Latch};
use crate::step::Lane;
use lockstep_core::{
    FailurePoint, FailureRecord, LaneId, LaneOutcome, ResourceProvider, RunId, StepError,
};
use once_cell::sync::OnceCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

/// Synchronization state shared by both workers of one run
pub(crate) struct RunState {
    pub(crate) run_id: RunId,
    pub(crate) gates: GateSet,
    /// Both lanes opened their resources
    pub(crate) ready: Latch,
    /// Both lanes are done with their steps
    pub(crate) steps_finished: Latch,
    failure: OnceCell<FailureRecord>,
}

impl RunState {
    pub(crate) fn new(steps: usize) -> Self {
        Self {
            run_id: RunId::new(),
            gates: GateSet::new(steps),
            ready: Latch::new(2),
            steps_finished: Latch::new(2),
            failure: OnceCell::new(),
        }
    }

    /// Whether any lane recorded a failure
    pub(crate) fn failed(&self) -> bool {
        self.failure.get().is_some()
    }

    /// Record a failure; the first writer wins
    ///
    /// Returns false if a failure was already recorded.
    pub(crate) fn record(&self, record: FailureRecord) -> bool {
        match self.failure.set(record) {
            Ok(()) => true,
            Err(rejected) => {
                debug!(
                    run_id = %self.run_id,
                    lane = %rejected.lane_name,
                    point = %rejected.point,
                    error = %rejected.error,
                    "failure already recorded; discarding later failure"
                );
                false
            }
        }
    }

    pub(crate) fn into_failure(self) -> Option<FailureRecord> {
        self.failure.into_inner()
    }
}

/// One lane's worker
///
/// Dropping the worker (normally or while unwinding) signals every
/// rendezvous the lane has not signalled yet and opens its remaining
/// successor gates.
pub(crate) struct LaneWorker<'a, P: ResourceProvider, C> {
    lane_id: LaneId,
    lane: &'a Lane<P::Resource, C>,
    state: &'a RunState,
    ready_signalled: bool,
    finished_signalled: bool,
}

impl<'a, P, C> LaneWorker<'a, P, C>
where
    P: ResourceProvider,
{
    pub(crate) fn new(lane_id: LaneId, lane: &'a Lane<P::Resource, C>, state: &'a RunState) -> Self {
        Self {
            lane_id,
            lane,
            state,
            ready_signalled: false,
            finished_signalled: false,
        }
    }

    fn name(&self) -> &str {
        self.lane.name()
    }

    fn fail(&self, point: FailurePoint, error: StepError) {
        self.state.record(FailureRecord {
            lane: self.lane_id,
            lane_name: self.name().to_string(),
            point,
            error,
        });
    }

    fn signal_ready(&mut self) {
        if !self.ready_signalled {
            self.ready_signalled = true;
            self.state.ready.count_down();
        }
    }

    fn signal_steps_finished(&mut self) {
        if !self.finished_signalled {
            self.finished_signalled = true;
            self.state.steps_finished.count_down();
        }
    }

    /// Run the lane to completion
    pub(crate) fn run(mut self, provider: &P, context_factory: &(dyn Fn() -> C + Sync)) {
        let run_id = self.state.run_id;

        let resource = match provider.open(self.lane_id) {
            Ok(resource) => Some(resource),
            Err(e) => {
                error!(run_id = %run_id, lane = %self.name(), error = %e, "failed to open resource");
                self.fail(FailurePoint::Open, e);
                None
            }
        };
        let mut context = context_factory();
        self.signal_ready();

        let Some(mut resource) = resource else {
            self.state.gates.release_from(self.lane_id, 0);
            self.signal_steps_finished();
            self.state.steps_finished.wait();
            return;
        };

        self.execute_steps(&mut resource, &mut context);

        info!(run_id = %run_id, lane = %self.name(), "FINISH: awaiting the other lane");
        self.signal_steps_finished();
        // The other lane may still be using its resource.
        self.state.steps_finished.wait();

        let outcome = if self.state.failed() {
            LaneOutcome::Failed
        } else {
            LaneOutcome::Completed
        };
        if let Err(e) = provider.release(self.lane_id, resource, outcome) {
            warn!(run_id = %run_id, lane = %self.name(), error = %e, "failed to release resource");
            self.fail(FailurePoint::Release, e);
        }

        info!(run_id = %run_id, lane = %self.name(), "FINISH: finished");
    }

    fn execute_steps(&self, resource: &mut P::Resource, context: &mut C) {
        let run_id = self.state.run_id;
        let gates = &self.state.gates;

        for (index, step) in self.lane.steps().iter().enumerate() {
            let number = index + 1;

            debug!(run_id = %run_id, lane = %self.name(), step = number, "await");
            gates.entry(self.lane_id, index).wait();

            if self.state.failed() {
                info!(
                    run_id = %run_id,
                    lane = %self.name(),
                    step = number,
                    "detected failure in the other lane; abandon"
                );
                gates.release_from(self.lane_id, index);
                return;
            }

            debug!(run_id = %run_id, lane = %self.name(), step = number, "execute");
            let result = catch_unwind(AssertUnwindSafe(|| step.execute(resource, context)))
                .unwrap_or_else(|payload| Err(StepError::from_panic(payload)));

            match result {
                Ok(()) => {
                    debug!(run_id = %run_id, lane = %self.name(), step = number, "done");
                    gates.fire(self.lane_id, index);
                }
                Err(e) => {
                    error!(run_id = %run_id, lane = %self.name(), step = number, error = %e, "error");
                    self.fail(FailurePoint::Step(index), e);
                    gates.release_from(self.lane_id, index);
                    return;
                }
            }
        }
    }
}

impl<'a, P, C> Drop for LaneWorker<'a, P, C>
where
    P: ResourceProvider,
{
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.fail(
                FailurePoint::Worker,
                StepError::Panicked(format!("worker of lane {} panicked", self.name())),
            );
        }
        // Whatever happened, do not let the other lane or the caller wait forever.
        self.state.gates.release_from(self.lane_id, 0);
        self.signal_ready();
        self.signal_steps_finished();
    }
}
