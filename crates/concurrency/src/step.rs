//! Step actions and lanes
//!
//! A step is an opaque unit of work: it receives the lane's resource and the
//! lane's context, and either returns normally or fails with a
//! [`StepError`]. Any `Fn(&mut R, &mut C) -> StepResult` closure is a step.

use lockstep_core::{StepError, StepResult, Transactional};

/// A unit of work run by one lane
pub trait StepAction<R, C>: Send + Sync {
    /// Run the step against the lane's resource and context
    fn execute(&self, resource: &mut R, context: &mut C) -> StepResult;
}

impl<R, C, F> StepAction<R, C> for F
where
    F: Fn(&mut R, &mut C) -> StepResult + Send + Sync,
{
    fn execute(&self, resource: &mut R, context: &mut C) -> StepResult {
        self(resource, context)
    }
}

/// Boxed step as stored in a lane
pub type BoxedStep<R, C> = Box<dyn StepAction<R, C>>;

/// Filler step that does nothing
///
/// Still hands over to the other lane like any completed step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Idle;

impl<R, C> StepAction<R, C> for Idle {
    fn execute(&self, _resource: &mut R, _context: &mut C) -> StepResult {
        Ok(())
    }
}

/// Step committing the lane's transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct Commit;

impl<R, C> StepAction<R, C> for Commit
where
    R: Transactional,
{
    fn execute(&self, resource: &mut R, _context: &mut C) -> StepResult {
        if !resource.is_active() {
            return Err(StepError::assertion("no active transaction to commit"));
        }
        resource.commit()
    }
}

/// One participant's ordered script of steps
pub struct Lane<R, C> {
    name: String,
    steps: Vec<BoxedStep<R, C>>,
}

impl<R, C> Lane<R, C> {
    /// Create an empty lane with a diagnostic name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a closure step
    pub fn step<F>(self, step: F) -> Self
    where
        F: Fn(&mut R, &mut C) -> StepResult + Send + Sync + 'static,
    {
        self.action(step)
    }

    /// Append any step action
    pub fn action<S>(mut self, action: S) -> Self
    where
        S: StepAction<R, C> + 'static,
    {
        self.steps.push(Box::new(action));
        self
    }

    /// Append an already boxed step
    pub fn push(&mut self, step: BoxedStep<R, C>) {
        self.steps.push(step);
    }

    /// Diagnostic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the lane has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[BoxedStep<R, C>] {
        &self.steps
    }
}

impl<R, C> std::fmt::Debug for Lane<R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .finish()
    }
}
