//! Incremental task engine
//!
//! A long remote-bound operation is modelled as a [`LongTask`]: an explicit
//! state object that advances by one bounded step per [`LongTask::take_step`]
//! call. The driver owns the loop, so it decides when to stop:
//!
//! ```ignore
//! while !cancel.is_cancelled() && task.has_more_steps() {
//!     match task.take_step()? {
//!         StepResult::Continue(progress) => report(progress),
//!         StepResult::Complete(result) => return Ok(result),
//!     }
//! }
//! ```
//!
//! Tasks are single-use. Partial results stay valid between steps, so a
//! driver that stops early can still read what was produced.

mod process;
mod search;

pub use process::{EmailProcessingTask, ProcessEmailResult, ProcessStep};
pub use search::{DEFAULT_PAGE_SIZE, MetadataSearchTask, SearchState};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::TaskError;

/// Position of a task after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepProgress {
    /// Steps completed so far
    pub current: usize,
    /// Best-effort total, never below `current`
    pub total: usize,
}

impl StepProgress {
    pub fn new(current: usize, total: usize) -> Self {
        Self {
            current,
            total: total.max(current),
        }
    }

    /// Completion in whole percent; an empty task counts as done
    pub fn percent(&self) -> u64 {
        if self.total == 0 {
            100
        } else {
            (100 * self.current / self.total) as u64
        }
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult<R> {
    /// More steps remain
    Continue(StepProgress),
    /// The task finished with its final result
    Complete(R),
}

impl<R> StepResult<R> {
    pub fn is_complete(&self) -> bool {
        matches!(self, StepResult::Complete(_))
    }
}

/// A resumable, cooperatively cancellable unit of long-running work
pub trait LongTask {
    type Output;

    /// Estimated number of steps; 0 when nothing is left to do
    fn number_of_steps(&self) -> usize;

    /// Whether another `take_step` call is allowed
    fn has_more_steps(&self) -> bool;

    /// Perform one bounded increment of work
    ///
    /// Fails with [`TaskError::Exhausted`] once `has_more_steps` is false.
    fn take_step(&mut self) -> Result<StepResult<Self::Output>, TaskError>;
}

/// Shared flag a driver sets to stop work between steps
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drive a task until it completes or `cancel` is set
///
/// `on_step` sees every intermediate progress report. Returns `None` when
/// the loop stopped because of cancellation.
pub fn run_until_cancelled<T, F>(
    task: &mut T,
    cancel: &CancellationToken,
    mut on_step: F,
) -> Result<Option<T::Output>, TaskError>
where
    T: LongTask,
    F: FnMut(StepProgress),
{
    while !cancel.is_cancelled() && task.has_more_steps() {
        match task.take_step()? {
            StepResult::Continue(progress) => on_step(progress),
            StepResult::Complete(output) => return Ok(Some(output)),
        }
    }
    Ok(None)
}
