//! Fluent construction of lockstep runs
//!
//! Declarations alternate between the lanes, starting with the first lane:
//!
//! ```
//! use lockstep_concurrency::Lockstep;
//!
//! let summary = Lockstep::configure(|| 0u32)
//!     .first_starts_with(|_, n| { *n += 1; Ok(()) })
//!     .then_second(|_, n| { *n += 1; Ok(()) })
//!     .then_first_does_nothing()
//!     .then_second(|_, n| { *n += 1; Ok(()) })
//!     .run()
//!     .unwrap();
//! assert_eq!(summary.steps, 2);
//! ```
//!
//! Alternation and equal lane lengths are checked once, by [`LockstepBuilder::build`].

use crate::coordinator::{ContextFactory, RunSummary, TwoLanes};
use crate::step::{BoxedStep, Commit, Idle, Lane, StepAction};
use crate::timeout::TimeoutExpected;
use lockstep_core::{
    Detach, LaneId, LockstepConfig, LockstepError, NoResource, ResourceProvider, Result,
    StepResult, Transactional, TransactionalProvider,
};
use std::time::Duration;
use tracing::debug;

/// Entry points of the builder
#[derive(Debug, Clone, Copy)]
pub struct Lockstep;

impl Lockstep {
    /// Configure a run whose steps only use the context
    pub fn configure<C, F>(context_factory: F) -> LockstepBuilder<NoResource, C>
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        LockstepBuilder::new(NoResource, context_factory)
    }

    /// Configure a run where every lane opens a resource from `provider`
    pub fn configure_with<P, C, F>(provider: P, context_factory: F) -> LockstepBuilder<P, C>
    where
        P: ResourceProvider,
        F: Fn() -> C + Send + Sync + 'static,
    {
        LockstepBuilder::new(provider, context_factory)
    }

    /// Configure a run over transactional resources
    ///
    /// Each lane's transaction is committed after both lanes finished their
    /// steps, or rolled back if the run failed.
    pub fn configure_transactional<P, C, F>(
        provider: P,
        context_factory: F,
    ) -> LockstepBuilder<TransactionalProvider<P>, C>
    where
        P: ResourceProvider,
        P::Resource: Transactional,
        F: Fn() -> C + Send + Sync + 'static,
    {
        LockstepBuilder::new(TransactionalProvider::new(provider), context_factory)
    }
}

type DeferredStep<R, C> = Box<dyn FnOnce(Duration) -> BoxedStep<R, C>>;

enum Declared<R, C> {
    Step(BoxedStep<R, C>),
    /// Timeout-expected step using the configured default deadline
    TimesOut(DeferredStep<R, C>),
}

impl<R, C> Declared<R, C> {
    fn resolve(self, default_timeout: Duration) -> BoxedStep<R, C> {
        match self {
            Declared::Step(step) => step,
            Declared::TimesOut(make) => make(default_timeout),
        }
    }
}

/// Accumulates alternating declarations for both lanes
pub struct LockstepBuilder<P: ResourceProvider, C> {
    provider: P,
    context_factory: ContextFactory<C>,
    declarations: Vec<(LaneId, Declared<P::Resource, C>)>,
    config: LockstepConfig,
    names: Option<(String, String)>,
}

impl<P, C> LockstepBuilder<P, C>
where
    P: ResourceProvider,
{
    fn new<F>(provider: P, context_factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            provider,
            context_factory: Box::new(context_factory),
            declarations: Vec::new(),
            config: LockstepConfig::default(),
            names: None,
        }
    }

    fn declare(mut self, lane: LaneId, step: Declared<P::Resource, C>) -> Self {
        self.declarations.push((lane, step));
        self
    }

    /// First declaration; always belongs to the first lane
    pub fn first_starts_with<F>(self, step: F) -> Self
    where
        F: Fn(&mut P::Resource, &mut C) -> StepResult + Send + Sync + 'static,
    {
        self.then_first(step)
    }

    /// Next step of the first lane
    pub fn then_first<F>(self, step: F) -> Self
    where
        F: Fn(&mut P::Resource, &mut C) -> StepResult + Send + Sync + 'static,
    {
        self.then_first_step(step)
    }

    /// Next step of the second lane
    pub fn then_second<F>(self, step: F) -> Self
    where
        F: Fn(&mut P::Resource, &mut C) -> StepResult + Send + Sync + 'static,
    {
        self.then_second_step(step)
    }

    /// Next step of the first lane, given as a prebuilt action
    pub fn then_first_step<S>(self, step: S) -> Self
    where
        S: StepAction<P::Resource, C> + 'static,
    {
        self.declare(LaneId::First, Declared::Step(Box::new(step)))
    }

    /// Next step of the second lane, given as a prebuilt action
    pub fn then_second_step<S>(self, step: S) -> Self
    where
        S: StepAction<P::Resource, C> + 'static,
    {
        self.declare(LaneId::Second, Declared::Step(Box::new(step)))
    }

    /// Filler step for the first lane
    pub fn then_first_does_nothing(self) -> Self {
        self.then_first_step(Idle)
    }

    /// Filler step for the second lane
    pub fn then_second_does_nothing(self) -> Self {
        self.then_second_step(Idle)
    }

    /// Override the diagnostic lane names
    pub fn lane_names(mut self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.names = Some((first.into(), second.into()));
        self
    }

    /// Use a loaded configuration
    ///
    /// Lane names set with [`lane_names`](Self::lane_names) take precedence.
    pub fn with_config(mut self, config: LockstepConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of declarations so far
    pub fn declared(&self) -> usize {
        self.declarations.len()
    }

    fn check_declarations(&self) -> Result<()> {
        if self.declarations.is_empty() {
            return Err(LockstepError::NoSteps);
        }

        let first = self
            .declarations
            .iter()
            .filter(|(lane, _)| *lane == LaneId::First)
            .count();
        let second = self.declarations.len() - first;
        if first != second {
            return Err(LockstepError::UnevenSteps { first, second });
        }

        for (position, (found, _)) in self.declarations.iter().enumerate() {
            let expected = if position % 2 == 0 {
                LaneId::First
            } else {
                LaneId::Second
            };
            if *found != expected {
                return Err(LockstepError::OutOfTurn {
                    position,
                    expected,
                    found: *found,
                });
            }
        }
        Ok(())
    }

    /// Validate the declarations and produce a runnable configuration
    ///
    /// # Errors
    ///
    /// `InvalidConfig`, `NoSteps`, `UnevenSteps` or `OutOfTurn`. No worker
    /// thread is started.
    pub fn build(self) -> Result<TwoLanes<P, C>> {
        self.config.validate()?;
        self.check_declarations()?;

        let (first_name, second_name) = self.names.unwrap_or_else(|| {
            (
                self.config.first_lane_name.clone(),
                self.config.second_lane_name.clone(),
            )
        });
        let default_timeout = self.config.expected_timeout();

        let mut first = Lane::new(first_name);
        let mut second = Lane::new(second_name);
        for (lane, declared) in self.declarations {
            let step = declared.resolve(default_timeout);
            match lane {
                LaneId::First => first.push(step),
                LaneId::Second => second.push(step),
            }
        }

        debug!(
            steps = first.len(),
            first = %first.name(),
            second = %second.name(),
            "built lockstep configuration"
        );

        Ok(TwoLanes::from_factory(self.provider, self.context_factory, first, second)?
            .with_thread_name_prefix(self.config.thread_name_prefix))
    }

    /// Build and run once
    ///
    /// # Errors
    ///
    /// Any error of [`build`](Self::build) or [`TwoLanes::run`].
    pub fn run(self) -> Result<RunSummary> {
        self.build()?.run()
    }
}

impl<P, C> LockstepBuilder<P, C>
where
    P: ResourceProvider,
    P::Resource: Detach + 'static,
    C: Clone + Send + 'static,
{
    /// Next step of the first lane, expected to still be blocked after `timeout`
    pub fn then_first_times_out_after<F>(self, step: F, timeout: Duration) -> Self
    where
        F: Fn(&mut P::Resource, &mut C) -> StepResult + Send + Sync + 'static,
    {
        self.then_first_step(TimeoutExpected::new(step, timeout))
    }

    /// Next step of the second lane, expected to still be blocked after `timeout`
    pub fn then_second_times_out_after<F>(self, step: F, timeout: Duration) -> Self
    where
        F: Fn(&mut P::Resource, &mut C) -> StepResult + Send + Sync + 'static,
    {
        self.then_second_step(TimeoutExpected::new(step, timeout))
    }

    /// Like [`then_first_times_out_after`](Self::then_first_times_out_after)
    /// with the configured `expected_timeout_ms`
    pub fn then_first_times_out<F>(self, step: F) -> Self
    where
        F: Fn(&mut P::Resource, &mut C) -> StepResult + Send + Sync + 'static,
    {
        self.declare(LaneId::First, Self::deferred_timeout(step))
    }

    /// Like [`then_second_times_out_after`](Self::then_second_times_out_after)
    /// with the configured `expected_timeout_ms`
    pub fn then_second_times_out<F>(self, step: F) -> Self
    where
        F: Fn(&mut P::Resource, &mut C) -> StepResult + Send + Sync + 'static,
    {
        self.declare(LaneId::Second, Self::deferred_timeout(step))
    }

    fn deferred_timeout<F>(step: F) -> Declared<P::Resource, C>
    where
        F: Fn(&mut P::Resource, &mut C) -> StepResult + Send + Sync + 'static,
    {
        Declared::TimesOut(Box::new(move |timeout| {
            Box::new(TimeoutExpected::new(step, timeout)) as BoxedStep<P::Resource, C>
        }))
    }
}

impl<P, C> LockstepBuilder<P, C>
where
    P: ResourceProvider,
    P::Resource: Transactional,
{
    /// The first lane commits its transaction
    pub fn then_first_commits(self) -> Self {
        self.then_first_step(Commit)
    }

    /// The second lane commits its transaction
    pub fn then_second_commits(self) -> Self {
        self.then_second_step(Commit)
    }
}

impl<P, C> std::fmt::Debug for LockstepBuilder<P, C>
where
    P: ResourceProvider,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lanes: Vec<LaneId> = self.declarations.iter().map(|(lane, _)| *lane).collect();
        f.debug_struct("LockstepBuilder")
            .field("declarations", &lanes)
            .field("config", &self.config)
            .field("names", &self.names)
            .finish()
    }
}
