//! Processing runs over selected emails
//!
//! A run is configured once ([`ProcessConfiguration`]), wired to its remote
//! collaborators ([`ProcessingServices`]) and then driven to the end by a
//! [`ProcessingOrchestrator`].

mod orchestrator;
mod settings;

pub use orchestrator::{
    CANCELLED_NOTE, ProcessingOrchestrator, ProgressCounters, ProgressEvent, RunState, RunSummary,
};
pub use settings::{ProcessAction, ProcessConfiguration};

use std::sync::Arc;

use crate::remote::{AttachmentRemote, LabelRemote};
use crate::storage::AttachmentSink;

/// Collaborators shared by every task of a processing run
#[derive(Clone)]
pub struct ProcessingServices {
    pub attachments: Arc<dyn AttachmentRemote>,
    pub labels: Arc<dyn LabelRemote>,
    pub sink: Arc<dyn AttachmentSink>,
    pub config: Arc<ProcessConfiguration>,
}

impl ProcessingServices {
    /// Wire one backend that implements both remote traits
    pub fn new<R>(
        remote: Arc<R>,
        sink: Arc<dyn AttachmentSink>,
        config: ProcessConfiguration,
    ) -> Self
    where
        R: AttachmentRemote + LabelRemote + 'static,
    {
        Self {
            attachments: remote.clone(),
            labels: remote,
            sink,
            config: Arc::new(config),
        }
    }
}
