//! Attachment sink trait for writing downloaded parts

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Destination for downloaded attachment bytes
///
/// Implementations only write; choosing a free filename is done by the
/// caller through [`avoid_collision`] using [`AttachmentSink::exists`].
pub trait AttachmentSink: Send + Sync {
    /// Whether something is already stored at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Store `data` at `path` and return the number of bytes written
    ///
    /// Must not overwrite an existing file.
    fn save(&self, data: &[u8], path: &Path) -> Result<u64>;
}

/// Pick a path that doesn't exist yet.
///
/// `report.pdf` becomes `report (1).pdf`, `report (2).pdf`, ... until
/// `exists` returns false.
pub fn avoid_collision(path: &Path, exists: impl Fn(&Path) -> bool) -> PathBuf {
    if !exists(path) {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 1u32;
    loop {
        let name = match &extension {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        let candidate = path.with_file_name(name);
        if !exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
