//! Timeout-expected step wrapper
//!
//! Wraps a step that is supposed to block, typically because the other lane
//! holds a lock it needs. The wrapped step runs on its own thread against a
//! detached handle to the lane's resource and a clone of its context, and the
//! wrapper waits for it with a hard deadline:
//!
//! | inner step before the deadline       | wrapper result                 |
//! |--------------------------------------|--------------------------------|
//! | still running when the deadline hits | `Ok(())`, inner step abandoned |
//! | gave up with a timeout indication    | `Ok(())`                       |
//! | returned normally                    | `Err(UnexpectedCompletion)`    |
//! | failed with any other error          | that error, unchanged          |
//!
//! The background thread gets a detached handle to the resource (see
//! [`Detach`]). When the deadline hits, the wrapper raises the handle's
//! [`AbandonFlag`] and the resource refuses anything the abandoned step still
//! tries, so its outcome can never leak into the lane's transaction.
//!
//! The background thread is named after the lane's worker thread with a
//! `-timeout` suffix.

use crate::step::StepAction;
use lockstep_core::{AbandonFlag, Detach, StepError, StepResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Step asserting that the wrapped step does NOT finish within `timeout`
pub struct TimeoutExpected<S> {
    inner: Arc<S>,
    timeout: Duration,
}

impl<S> TimeoutExpected<S> {
    /// Wrap a step with the deadline it is expected to exceed
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
        }
    }

    /// The deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<R, C, S> StepAction<R, C> for TimeoutExpected<S>
where
    S: StepAction<R, C> + 'static,
    R: Detach + Send + 'static,
    C: Clone + Send + 'static,
{
    fn execute(&self, resource: &mut R, context: &mut C) -> StepResult {
        let (tx, rx) = mpsc::sync_channel::<StepResult>(1);
        let inner = Arc::clone(&self.inner);
        let abandoned = AbandonFlag::new();
        let mut resource = resource.detach(&abandoned);
        let mut context = context.clone();

        thread::Builder::new()
            .name(timeout_thread_name())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    inner.execute(&mut resource, &mut context)
                }))
                .unwrap_or_else(|payload| Err(StepError::from_panic(payload)));
                // The receiver is gone once the deadline passed.
                let _ = tx.send(result);
            })
            .map_err(StepError::failed)?;

        match rx.recv_timeout(self.timeout) {
            Err(RecvTimeoutError::Timeout) => {
                abandoned.abandon();
                debug!(timeout = ?self.timeout, "wrapped step still blocked at deadline; abandoned");
                Ok(())
            }
            Ok(Ok(())) => Err(StepError::UnexpectedCompletion {
                timeout: self.timeout,
            }),
            Ok(Err(error)) if error.is_timeout() => {
                debug!(%error, "wrapped step gave up waiting before the deadline");
                Ok(())
            }
            Ok(Err(error)) => Err(error),
            Err(RecvTimeoutError::Disconnected) => Err(StepError::Panicked(
                "timeout-expected step exited without reporting".to_string(),
            )),
        }
    }
}

fn timeout_thread_name() -> String {
    format!("{}-timeout", thread::current().name().unwrap_or("lockstep"))
}

impl<S> std::fmt::Debug for TimeoutExpected<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutExpected")
            .field("timeout", &self.timeout)
            .finish()
    }
}
