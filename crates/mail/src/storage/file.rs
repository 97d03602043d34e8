//! Filesystem attachment sink

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use super::sink::AttachmentSink;

/// Writes attachments to the local filesystem
///
/// Parent directories are created on demand. Files are written to a
/// temporary sibling first and renamed into place, so a failed write never
/// leaves a truncated attachment under its final name.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileAttachmentSink;

impl FileAttachmentSink {
    pub fn new() -> Self {
        Self
    }
}

impl AttachmentSink for FileAttachmentSink {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn save(&self, data: &[u8], path: &Path) -> Result<u64> {
        if path.exists() {
            anyhow::bail!("Refusing to overwrite {}", path.display());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".part");
        let temp_path = path.with_file_name(temp_name);

        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        file.write_all(data)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to move attachment into {}", path.display()))?;

        Ok(data.len() as u64)
    }
}
