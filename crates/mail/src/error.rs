//! Error types for the task engine
//!
//! Transport and filesystem plumbing uses `anyhow`; the engine surfaces
//! those through [`TaskError`] so the driver can tell a programming error
//! (stepping an exhausted task) apart from a remote failure it may want
//! to report or retry.

use crate::models::{EmailStatus, MessageId};

/// Errors produced by long tasks and the processing orchestrator
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// `take_step` was called after `has_more_steps` returned false
    #[error("no more steps: the task is exhausted or has already failed")]
    Exhausted,

    /// A processing run was started twice on the same orchestrator
    #[error("processing run already started; create a new orchestrator")]
    AlreadyStarted,

    /// An email status change that the lifecycle does not allow
    #[error("invalid status transition for {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: MessageId,
        from: EmailStatus,
        to: EmailStatus,
    },

    /// The processing configuration cannot describe a valid run
    #[error("invalid processing configuration: {0}")]
    InvalidConfiguration(String),

    /// A remote call failed while fetching a search batch
    #[error("search batch {batch} failed: {source:#}")]
    Search {
        batch: usize,
        #[source]
        source: anyhow::Error,
    },

    /// A step of a single message's processing failed
    #[error("failed to process message {id}: {source:#}")]
    Message {
        id: MessageId,
        #[source]
        source: anyhow::Error,
    },
}

impl TaskError {
    /// The message this error is attached to, if any
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            TaskError::Message { id, .. } | TaskError::InvalidTransition { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Short text suitable for an email's note column
    ///
    /// Uses the underlying cause rather than the wrapper so the note doesn't
    /// repeat the message id that is already shown next to it.
    pub fn note(&self) -> String {
        match self {
            TaskError::Message { source, .. } | TaskError::Search { source, .. } => {
                format!("{:#}", source)
            }
            other => other.to_string(),
        }
    }
}

/// Error returned by a label backend when a label with the requested name
/// already exists (Gmail answers 409 Conflict)
#[derive(Debug, thiserror::Error)]
#[error("Label already exists: {0}")]
pub struct LabelExistsError(pub String);

/// A rewritten copy of a message was stored, but the original could not be
/// moved to trash. Both messages now exist in the mailbox.
#[derive(Debug, thiserror::Error)]
#[error("Inserted {replacement} but failed to trash {original}")]
pub struct ReplacementNotTrashedError {
    pub original: MessageId,
    pub replacement: MessageId,
}
