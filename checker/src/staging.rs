//! Snapshots of unsaved buffer content on disk.
//!
//! External tools only read files, so every check writes the buffer's
//! current text to a uniquely named file first. The returned [`StagedFile`]
//! is the single cleanup point: dropping it removes the file, whichever path
//! the check took.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use makecheck_types::{BufferSnapshot, ToolKind};
use tempfile::Builder;

use crate::error::CheckError;

const RANDOM_NAME_BYTES: usize = 8;

/// A staged snapshot. Removed from disk on drop.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the staged file; tools run with it as their cwd.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        unstage(&self.path);
    }
}

/// Where a snapshot of `snapshot` should be written.
///
/// An explicit directory wins. Otherwise the snapshot sits next to the file
/// the buffer visits so relative `include` directives still resolve, and
/// file-less buffers fall back to the system temp directory.
#[must_use]
pub fn staging_dir(snapshot: &BufferSnapshot, configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }
    match snapshot.path().and_then(Path::parent) {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
        Some(parent) => parent.to_path_buf(),
        None => std::env::temp_dir(),
    }
}

/// Write the buffer's full current text to a fresh file in `dir`.
///
/// The name is `<stem>_<random>_<tool suffix>`: derived from the buffer and
/// tool so it is recognizable, randomized so a superseded run's file and the
/// new run's file can coexist.
pub fn stage(
    snapshot: &BufferSnapshot,
    tool: ToolKind,
    dir: &Path,
) -> Result<StagedFile, CheckError> {
    let staging_err = |source: io::Error| CheckError::Staging {
        dir: dir.to_path_buf(),
        source,
    };

    let dir = fs::canonicalize(dir).map_err(staging_err)?;
    let prefix = format!("{}_", snapshot.stem());
    let suffix = format!("_{}", tool.staging_suffix());

    let mut tmp = Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .rand_bytes(RANDOM_NAME_BYTES)
        .tempfile_in(&dir)
        .map_err(staging_err)?;
    tmp.write_all(snapshot.text().as_bytes())
        .and_then(|()| tmp.flush())
        .map_err(staging_err)?;

    let (_file, path) = tmp.keep().map_err(|e| staging_err(e.error))?;
    tracing::debug!(
        buffer = %snapshot.id(),
        tool = %tool,
        path = %path.display(),
        "Staged buffer snapshot"
    );
    Ok(StagedFile { path })
}

/// Remove a staged file if it still exists.
///
/// Idempotent: a missing file is not an error. Other failures are logged and
/// swallowed. Returns whether a file was actually removed.
pub fn unstage(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed staged snapshot");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to remove staged snapshot: {e}");
            false
        }
    }
}
