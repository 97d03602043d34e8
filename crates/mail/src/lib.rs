//! Mail crate - Business logic for finding and detaching large attachments
//!
//! This crate provides:
//! - Domain models (Email, EmailStatus, Label)
//! - An incremental task engine ([`LongTask`]) with cooperative cancellation
//! - A paged metadata search task and a per-message processing task
//! - A sequential processing orchestrator with progress events
//! - Filename schemas and attachment sinks for saving parts locally
//! - A Gmail REST adapter behind the remote collaborator traits
//!
//! This crate has no UI dependencies; drivers call into it from a worker
//! thread and observe progress through events or counter snapshots.

pub mod config;
pub mod error;
pub mod gmail;
pub mod labels;
pub mod models;
pub mod processing;
pub mod query;
pub mod remote;
pub mod storage;
pub mod task;

pub use config::Settings;
pub use error::{LabelExistsError, ReplacementNotTrashedError, TaskError};
pub use gmail::{GmailClient, StaticToken, TokenSource, default_token_source};
pub use labels::{REMOVED_LABEL_NAME, RemovedLabelResolver};
pub use models::{
    BYTES_IN_MEGABYTE, Email, EmailAddress, EmailStatus, Label, LabelId, MessageId, select_all,
    selection_caption, user_label_names,
};
pub use processing::{
    ProcessAction, ProcessConfiguration, ProcessingOrchestrator, ProcessingServices,
    ProgressCounters, ProgressEvent, RunState, RunSummary,
};
pub use query::compose_basic_query;
pub use remote::{
    AttachmentPart, AttachmentRemote, LabelRemote, MailSearch, MessageMetadata, PageCursor,
    PartRemoval, SearchPage,
};
pub use storage::{
    AttachmentSink, FileAttachmentSink, FilenameSchema, InMemoryAttachmentSink,
};
pub use task::{
    CancellationToken, EmailProcessingTask, LongTask, MetadataSearchTask, ProcessEmailResult,
    StepProgress, StepResult, run_until_cancelled,
};
