//! Lockstep coordinator
//!
//! [`TwoLanes`] owns two equal-length lanes, the resource provider and the
//! context factory. Every call to [`TwoLanes::run`]:
//!
//! 1. allocates fresh gates, rendezvous latches and failure slot
//! 2. spawns one worker thread per lane
//! 3. waits until both lanes opened their resources, then fires the start signal
//! 4. joins both workers
//! 5. returns a [`RunSummary`] or the first recorded failure
//!
//! The interleaving is fully determined by the gate wiring: first lane step
//! i happens-before second lane step i happens-before first lane step i+1.

use crate::step::Lane;
use crate::worker::{LaneWorker, RunState};
use lockstep_core::{
    FailurePoint, FailureRecord, LaneId, LockstepError, ResourceProvider, Result, RunId, StepError,
};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Boxed zero-argument context factory
pub type ContextFactory<C> = Box<dyn Fn() -> C + Send + Sync>;

/// Report of a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Identifier attached to every trace line of the run
    pub run_id: RunId,
    /// Number of paired steps executed by each lane
    pub steps: usize,
    /// Wall time from spawning the workers to joining them
    pub elapsed: Duration,
}

/// A runnable two-lane configuration
pub struct TwoLanes<P: ResourceProvider, C> {
    provider: P,
    context_factory: ContextFactory<C>,
    first: Lane<P::Resource, C>,
    second: Lane<P::Resource, C>,
    thread_name_prefix: String,
}

impl<P, C> TwoLanes<P, C>
where
    P: ResourceProvider,
{
    /// Create a configuration from two lanes
    ///
    /// # Errors
    ///
    /// `NoSteps` if both lanes are empty, `UnevenSteps` if their lengths differ.
    pub fn new<F>(
        provider: P,
        context_factory: F,
        first: Lane<P::Resource, C>,
        second: Lane<P::Resource, C>,
    ) -> Result<Self>
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self::from_factory(provider, Box::new(context_factory), first, second)
    }

    pub(crate) fn from_factory(
        provider: P,
        context_factory: ContextFactory<C>,
        first: Lane<P::Resource, C>,
        second: Lane<P::Resource, C>,
    ) -> Result<Self> {
        if first.len() != second.len() {
            return Err(LockstepError::UnevenSteps {
                first: first.len(),
                second: second.len(),
            });
        }
        if first.is_empty() {
            return Err(LockstepError::NoSteps);
        }
        if first.name() == second.name() {
            return Err(LockstepError::InvalidConfig(format!(
                "lane names must differ, both are '{}'",
                first.name()
            )));
        }
        Ok(Self {
            provider,
            context_factory,
            first,
            second,
            thread_name_prefix: "lockstep".to_string(),
        })
    }

    /// Set the worker thread name prefix
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Number of paired steps
    pub fn steps(&self) -> usize {
        self.first.len()
    }

    /// Access one lane
    pub fn lane(&self, lane: LaneId) -> &Lane<P::Resource, C> {
        match lane {
            LaneId::First => &self.first,
            LaneId::Second => &self.second,
        }
    }

    /// Access the resource provider
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run both lanes in lockstep and block until both finished
    ///
    /// # Errors
    ///
    /// `StepFailed` carrying the first failure recorded by either lane, or
    /// `Sync` if a worker could not be spawned or died outside a step body.
    pub fn run(&self) -> Result<RunSummary> {
        let steps = self.steps();
        let state = RunState::new(steps);
        let run_id = state.run_id;
        let started = Instant::now();

        info!(
            run_id = %run_id,
            steps,
            first = %self.first.name(),
            second = %self.second.name(),
            "Configured with {} steps",
            steps
        );

        let worker_died = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(2);

            for lane_id in LaneId::BOTH {
                let lane = self.lane(lane_id);
                let state = &state;
                let provider = &self.provider;
                let factory: &(dyn Fn() -> C + Sync) = &*self.context_factory;

                let spawned = thread::Builder::new()
                    .name(format!("{}-{}", self.thread_name_prefix, lane.name()))
                    .spawn_scoped(scope, move || {
                        LaneWorker::<P, C>::new(lane_id, lane, state).run(provider, factory)
                    });

                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        error!(run_id = %run_id, lane = %lane.name(), error = %e, "failed to spawn worker");
                        state.record(FailureRecord {
                            lane: lane_id,
                            lane_name: lane.name().to_string(),
                            point: FailurePoint::Worker,
                            error: StepError::failed(e),
                        });
                        // Stand in for the missing worker at every rendezvous.
                        state.gates.release_from(lane_id, 0);
                        state.ready.count_down();
                        state.steps_finished.count_down();
                    }
                }
            }

            state.ready.wait();
            info!(run_id = %run_id, "Start lanes");
            state.gates.open_start();

            let mut died = false;
            for handle in handles {
                died |= handle.join().is_err();
            }
            died
        });

        let elapsed = started.elapsed();
        match state.into_failure() {
            None if worker_died => Err(LockstepError::Sync(
                "lane worker died without recording a failure".to_string(),
            )),
            None => {
                info!(run_id = %run_id, ?elapsed, "Lanes finished successfully");
                Ok(RunSummary {
                    run_id,
                    steps,
                    elapsed,
                })
            }
            Some(record) if record.point == FailurePoint::Worker => {
                error!(run_id = %run_id, failure = %record, "Lane worker failed");
                Err(LockstepError::Sync(record.to_string()))
            }
            Some(record) => {
                info!(
                    run_id = %run_id,
                    lane = %record.lane_name,
                    point = %record.point,
                    error = %record.error,
                    "Lane {} failed in {}",
                    record.lane_name,
                    record.point
                );
                Err(record.into())
            }
        }
    }
}

impl<P, C> std::fmt::Debug for TwoLanes<P, C>
where
    P: ResourceProvider,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoLanes")
            .field("first", &self.first)
            .field("second", &self.second)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .finish()
    }
}
