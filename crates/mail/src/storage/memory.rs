//! In-memory attachment sink
//!
//! Used by tests and for dry runs where nothing should touch the disk.

use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::sink::AttachmentSink;

/// Keeps saved attachments in a map keyed by path
#[derive(Default)]
pub struct InMemoryAttachmentSink {
    files: RwLock<HashMap<PathBuf, Vec<u8>>>,
}

impl InMemoryAttachmentSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents stored at `path`, if any
    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.read().ok()?.get(path).cloned()
    }

    /// All stored paths, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .read()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }
}

impl AttachmentSink for InMemoryAttachmentSink {
    fn exists(&self, path: &Path) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    fn save(&self, data: &[u8], path: &Path) -> Result<u64> {
        let mut files = self
            .files
            .write()
            .map_err(|_| anyhow::anyhow!("attachment sink lock poisoned"))?;
        if files.contains_key(path) {
            anyhow::bail!("Refusing to overwrite {}", path.display());
        }
        files.insert(path.to_path_buf(), data.to_vec());
        Ok(data.len() as u64)
    }
}
