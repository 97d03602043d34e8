//! Processing orchestrator
//!
//! Runs one [`EmailProcessingTask`] at a time over the selected emails.
//! Messages are processed strictly in order, never concurrently, which keeps
//! the remote request rate bounded and the byte progress monotonic.
//!
//! A failing message is marked `Failed` with the error as its note and the
//! run moves on. Cancellation is checked before each message and between
//! steps; a message that has already modified the remote mailbox is always
//! finished first. Any other error ends the run in [`RunState::Failed`].

use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::mpsc::Sender;

use super::ProcessingServices;
use crate::error::TaskError;
use crate::models::{BYTES_IN_MEGABYTE, Email, EmailStatus, MessageId};
use crate::task::{
    CancellationToken, EmailProcessingTask, LongTask, ProcessEmailResult, StepProgress,
    StepResult,
};

/// Note recorded on a message abandoned because of cancellation
pub const CANCELLED_NOTE: &str = "Cancelled before completion";

/// Lifecycle of one processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    CancelledPartial,
    /// Stopped by an error that is not tied to a single message
    Failed,
}

/// Aggregate progress of a run; counters only ever grow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounters {
    pub bytes_processed: u64,
    pub total_bytes: u64,
    pub items_total: usize,
    pub items_processed: usize,
    pub items_failed: usize,
    pub items_cancelled: usize,
}

impl ProgressCounters {
    /// Share of selected bytes processed, in whole percent
    ///
    /// A selection with no bytes at all counts as fully processed.
    pub fn percent_by_size(&self) -> u64 {
        if self.total_bytes == 0 {
            100
        } else {
            100 * self.bytes_processed / self.total_bytes
        }
    }

    /// Byte progress as a (current, total) pair
    pub fn byte_progress(&self) -> (u64, u64) {
        (self.bytes_processed, self.total_bytes)
    }

    /// "processed 3 of 5, 12MB / 40MB, 30% by size, 1 failed"
    pub fn status_text(&self) -> String {
        format!(
            "processed {} of {}, {}MB / {}MB, {}% by size, {} failed",
            self.items_processed,
            self.items_total,
            self.bytes_processed / BYTES_IN_MEGABYTE,
            self.total_bytes / BYTES_IN_MEGABYTE,
            self.percent_by_size(),
            self.items_failed
        )
    }
}

/// Final outcome of a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub state: RunState,
    pub counters: ProgressCounters,
    pub results: Vec<ProcessEmailResult>,
}

/// Events emitted while a run is in progress
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// An email changed status; `index` is its position in the run's list
    EmailStatusChanged {
        index: usize,
        id: MessageId,
        status: EmailStatus,
        note: Option<String>,
    },
    /// A step of the current email finished
    Step { index: usize, progress: StepProgress },
    /// Aggregate counters after a message finished (or at start)
    Progress(ProgressCounters),
    Finished(RunSummary),
}

enum Outcome {
    Done(ProcessEmailResult),
    Failed(TaskError),
    Cancelled,
}

/// Drives a sequential processing run over selected emails
pub struct ProcessingOrchestrator {
    services: ProcessingServices,
    cancel: CancellationToken,
    events: Option<Sender<ProgressEvent>>,
    state: RunState,
    counters: ProgressCounters,
}

impl ProcessingOrchestrator {
    pub fn new(services: ProcessingServices, cancel: CancellationToken) -> Self {
        Self {
            services,
            cancel,
            events: None,
            state: RunState::Idle,
            counters: ProgressCounters::default(),
        }
    }

    /// Send progress events to `tx` as the run advances
    pub fn with_events(mut self, tx: Sender<ProgressEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Snapshot of the current counters
    pub fn snapshot(&self) -> ProgressCounters {
        self.counters
    }

    /// Process every email in `emails` whose status is `ToProcess`
    ///
    /// Other emails are left untouched. An orchestrator runs once; a second
    /// call fails with [`TaskError::AlreadyStarted`].
    pub fn run(&mut self, emails: &mut [Email]) -> Result<RunSummary, TaskError> {
        if self.state != RunState::Idle {
            return Err(TaskError::AlreadyStarted);
        }

        let selected: Vec<usize> = emails
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status() == EmailStatus::ToProcess)
            .map(|(i, _)| i)
            .collect();

        self.counters = ProgressCounters {
            total_bytes: selected.iter().map(|&i| emails[i].size_bytes).sum(),
            items_total: selected.len(),
            ..Default::default()
        };
        self.state = RunState::Running;
        info!(
            "Processing {} email(s), {} bytes ({:?})",
            self.counters.items_total,
            self.counters.total_bytes,
            self.services.config.action()
        );
        self.emit(ProgressEvent::Progress(self.counters));

        let mut results = Vec::new();
        let outcome = self.process_selected(emails, &selected, &mut results);
        self.conclude(outcome, results)
    }

    /// Settle the final state and emit [`ProgressEvent::Finished`]
    fn conclude(
        &mut self,
        outcome: Result<bool, TaskError>,
        results: Vec<ProcessEmailResult>,
    ) -> Result<RunSummary, TaskError> {
        match outcome {
            Ok(true) => Ok(self.finish(RunState::CancelledPartial, results)),
            Ok(false) => Ok(self.finish(RunState::Completed, results)),
            Err(err) => {
                warn!("Processing aborted: {}", err);
                self.finish(RunState::Failed, results);
                Err(err)
            }
        }
    }

    /// Process `selected` in order; returns whether the run was cancelled
    ///
    /// A message-level failure is recorded on the email and the loop moves
    /// on. Any other error ends the loop and is returned.
    fn process_selected(
        &mut self,
        emails: &mut [Email],
        selected: &[usize],
        results: &mut Vec<ProcessEmailResult>,
    ) -> Result<bool, TaskError> {
        for &index in selected {
            if self.cancel.is_cancelled() {
                return Ok(true);
            }

            let email = &mut emails[index];
            email.transition(EmailStatus::Processing)?;
            self.emit_status(index, email);

            let mut task = EmailProcessingTask::new(email, self.services.clone());
            let outcome = self.drive(&mut task, index);

            // Removal replaces the message; follow it even when a later step failed
            if task.current_id() != &email.id {
                debug!("{} is now {}", email.id, task.current_id());
                email.id = task.current_id().clone();
            }

            let mut cancelled = false;
            match outcome {
                Outcome::Done(result) => {
                    email.transition(EmailStatus::Processed)?;
                    email.set_note(result.summary());
                    self.counters.bytes_processed += email.size_bytes;
                    self.counters.items_processed += 1;
                    results.push(result);
                }
                Outcome::Failed(err @ TaskError::Message { .. }) => {
                    warn!("{}", err);
                    email.fail(err.note())?;
                    self.counters.items_failed += 1;
                }
                Outcome::Failed(err) => {
                    email.fail(err.note())?;
                    self.counters.items_failed += 1;
                    self.emit_status(index, email);
                    self.emit(ProgressEvent::Progress(self.counters));
                    return Err(err);
                }
                Outcome::Cancelled => {
                    email.fail(cancelled_note(&task.saved_files()))?;
                    self.counters.items_cancelled += 1;
                    cancelled = true;
                }
            }

            self.emit_status(index, email);
            self.emit(ProgressEvent::Progress(self.counters));
            if cancelled {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn finish(&mut self, state: RunState, results: Vec<ProcessEmailResult>) -> RunSummary {
        self.state = state;
        info!("Processing {:?}: {}", self.state, self.counters.status_text());

        let summary = RunSummary {
            state,
            counters: self.counters,
            results,
        };
        self.emit(ProgressEvent::Finished(summary.clone()));
        summary
    }

    fn drive(&self, task: &mut EmailProcessingTask, index: usize) -> Outcome {
        let mut steps_taken = 0;
        while task.has_more_steps() {
            if steps_taken > 0 && self.cancel.is_cancelled() && task.can_stop_early() {
                debug!("Stopping {} before {:?}", task.email_id(), task.next_step());
                return Outcome::Cancelled;
            }
            match task.take_step() {
                Ok(StepResult::Continue(progress)) => {
                    self.emit(ProgressEvent::Step { index, progress });
                }
                Ok(StepResult::Complete(result)) => return Outcome::Done(result),
                Err(err) => return Outcome::Failed(err),
            }
            steps_taken += 1;
        }
        Outcome::Failed(TaskError::Exhausted)
    }

    fn emit_status(&self, index: usize, email: &Email) {
        self.emit(ProgressEvent::EmailStatusChanged {
            index,
            id: email.id.clone(),
            status: email.status(),
            note: email.note().map(str::to_string),
        });
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.events {
            // A driver that stopped listening doesn't stop the run
            let _ = tx.send(event);
        }
    }
}

/// Note for a message abandoned mid-way; names any files already written
fn cancelled_note(saved: &[PathBuf]) -> String {
    if saved.is_empty() {
        return CANCELLED_NOTE.to_string();
    }
    let paths: Vec<String> = saved.iter().map(|p| p.display().to_string()).collect();
    format!("{}; kept {}", CANCELLED_NOTE, paths.join(", "))
}
