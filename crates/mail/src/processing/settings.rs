//! Processing run configuration

use std::path::{Path, PathBuf};

use crate::error::TaskError;
use crate::models::LabelId;
use crate::storage::FilenameSchema;

/// What a processing run does to each selected email
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessAction {
    Download,
    Delete,
    DownloadAndDelete,
}

impl ProcessAction {
    pub fn downloads(self) -> bool {
        matches!(self, ProcessAction::Download | ProcessAction::DownloadAndDelete)
    }

    pub fn deletes(self) -> bool {
        matches!(self, ProcessAction::Delete | ProcessAction::DownloadAndDelete)
    }
}

/// Immutable description of one processing run
///
/// Shared read-only (behind an `Arc`) by every per-message task of the run.
#[derive(Debug, Clone)]
pub struct ProcessConfiguration {
    action: ProcessAction,
    target_directory: PathBuf,
    filename_schema: FilenameSchema,
    add_metadata: bool,
    backup: bool,
    removed_label_id: Option<LabelId>,
}

impl ProcessConfiguration {
    /// Configuration for a download-only run
    pub fn download(target_directory: impl Into<PathBuf>, filename_schema: FilenameSchema) -> Self {
        Self {
            action: ProcessAction::Download,
            target_directory: target_directory.into(),
            filename_schema,
            add_metadata: false,
            backup: false,
            removed_label_id: None,
        }
    }

    /// Configuration for a run that removes attachments
    ///
    /// `removed_label_id` tags every message whose attachments were removed.
    pub fn removing(
        action: ProcessAction,
        target_directory: impl Into<PathBuf>,
        filename_schema: FilenameSchema,
        removed_label_id: LabelId,
    ) -> Result<Self, TaskError> {
        if !action.deletes() {
            return Err(TaskError::InvalidConfiguration(format!(
                "{:?} does not remove attachments",
                action
            )));
        }
        Ok(Self {
            action,
            target_directory: target_directory.into(),
            filename_schema,
            add_metadata: false,
            backup: false,
            removed_label_id: Some(removed_label_id),
        })
    }

    /// Describe saved files and sizes in the placeholder left behind
    pub fn with_metadata(mut self, add_metadata: bool) -> Self {
        self.add_metadata = add_metadata;
        self
    }

    /// Save the whole original message before removing anything
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn action(&self) -> ProcessAction {
        self.action
    }

    pub fn downloads(&self) -> bool {
        self.action.downloads()
    }

    pub fn deletes(&self) -> bool {
        self.action.deletes()
    }

    pub fn target_directory(&self) -> &Path {
        &self.target_directory
    }

    pub fn filename_schema(&self) -> &FilenameSchema {
        &self.filename_schema
    }

    pub fn add_metadata(&self) -> bool {
        self.add_metadata
    }

    /// Backups only matter when something is removed
    pub fn backup(&self) -> bool {
        self.backup && self.deletes()
    }

    pub fn removed_label_id(&self) -> Option<&LabelId> {
        self.removed_label_id.as_ref()
    }
}
