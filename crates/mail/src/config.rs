//! Persistent user settings
//!
//! Settings live in `settings.json` in the shared config directory. A
//! missing file yields the defaults. Individual fields the driver changes
//! during a session are persisted through the `save_*` helpers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::TaskError;
use crate::models::LabelId;
use crate::processing::{ProcessAction, ProcessConfiguration};
use crate::storage::FilenameSchema;
use crate::task::DEFAULT_PAGE_SIZE;

/// Settings filename in the config directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Minimum attachment size offered by basic search, in megabytes
pub const DEFAULT_MIN_SIZE_MB: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where downloaded attachments (and backups) are written
    pub target_directory: Option<PathBuf>,
    pub filename_schema: FilenameSchema,
    /// Last query the user searched for
    pub search_query: Option<String>,
    /// Removed label id resolved in an earlier session
    pub removed_label_id: Option<LabelId>,
    pub add_metadata: bool,
    pub backup: bool,
    pub page_size: usize,
    pub min_size_mb: u64,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_directory: None,
            filename_schema: FilenameSchema::default(),
            search_query: None,
            removed_label_id: None,
            add_metadata: false,
            backup: false,
            page_size: DEFAULT_PAGE_SIZE,
            min_size_mb: DEFAULT_MIN_SIZE_MB,
            path: None,
        }
    }
}

impl Settings {
    /// Load settings from the default config directory
    pub fn load() -> Result<Self> {
        let path =
            config::config_path(SETTINGS_FILE).context("Could not determine config directory")?;
        Self::load_from(&path)
    }

    /// Load settings from a specific file; later saves go to the same file
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut settings: Settings = config::load_json_file_or_default(path)?;
        settings.path = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Where these settings are saved
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => config::save_json_file(path, self),
            None => config::save_json(SETTINGS_FILE, self),
        }
    }

    pub fn save_search_query(&mut self, query: impl Into<String>) -> Result<()> {
        self.search_query = Some(query.into());
        self.save()
    }

    pub fn save_target_directory(&mut self, dir: impl Into<PathBuf>) -> Result<()> {
        self.target_directory = Some(dir.into());
        self.save()
    }

    pub fn save_removed_label_id(&mut self, id: LabelId) -> Result<()> {
        self.removed_label_id = Some(id);
        self.save()
    }

    pub fn save_filename_schema(&mut self, schema: FilenameSchema) -> Result<()> {
        self.filename_schema = schema;
        self.save()
    }

    /// Build a run configuration for `action` from these settings
    ///
    /// Delete actions need `removed_label`, resolved by the caller.
    pub fn process_configuration(
        &self,
        action: ProcessAction,
        removed_label: Option<LabelId>,
    ) -> Result<ProcessConfiguration, TaskError> {
        let target = self.target_directory.clone().ok_or_else(|| {
            TaskError::InvalidConfiguration("no target directory configured".to_string())
        })?;

        let configuration = if action.deletes() {
            let label = removed_label.ok_or_else(|| {
                TaskError::InvalidConfiguration("removed label id is required".to_string())
            })?;
            ProcessConfiguration::removing(action, target, self.filename_schema.clone(), label)?
        } else {
            ProcessConfiguration::download(target, self.filename_schema.clone())
        };

        Ok(configuration
            .with_metadata(self.add_metadata)
            .with_backup(self.backup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(&dir.path().join(SETTINGS_FILE)).unwrap();

        assert_eq!(settings.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(settings.filename_schema, FilenameSchema::default());
        assert!(settings.search_query.is_none());
    }

    #[test]
    fn test_save_helpers_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE);

        let mut settings = Settings::load_from(&path).unwrap();
        settings.save_search_query("has:attachment size:20m").unwrap();
        settings.save_removed_label_id(LabelId::new("Label_42")).unwrap();
        settings.save_target_directory(dir.path().join("out")).unwrap();

        let reloaded = Settings::load_from(&path).unwrap();
        assert_eq!(reloaded.search_query.as_deref(), Some("has:attachment size:20m"));
        assert_eq!(reloaded.removed_label_id, Some(LabelId::new("Label_42")));
        assert_eq!(reloaded.target_directory, Some(dir.path().join("out")));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{"add_metadata": true}"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert!(settings.add_metadata);
        assert_eq!(settings.min_size_mb, DEFAULT_MIN_SIZE_MB);
    }

    #[test]
    fn test_process_configuration_requirements() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.process_configuration(ProcessAction::Download, None),
            Err(TaskError::InvalidConfiguration(_))
        ));

        settings.target_directory = Some(PathBuf::from("/out"));
        settings.backup = true;
        assert!(matches!(
            settings.process_configuration(ProcessAction::Delete, None),
            Err(TaskError::InvalidConfiguration(_))
        ));

        let config = settings
            .process_configuration(ProcessAction::Delete, Some(LabelId::new("Label_1")))
            .unwrap();
        assert!(config.backup());
        assert_eq!(config.removed_label_id(), Some(&LabelId::new("Label_1")));
    }
}
