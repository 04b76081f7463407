use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::BufferId;

/// Point-in-time copy of an editor buffer, including unsaved edits.
///
/// Cloning is cheap: the text is shared.
#[derive(Debug, Clone)]
pub struct BufferSnapshot {
    id: BufferId,
    name: String,
    path: Option<PathBuf>,
    text: Arc<str>,
}

impl BufferSnapshot {
    #[must_use]
    pub fn new(id: BufferId, name: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
            path: None,
            text: text.into(),
        }
    }

    /// Attach the file the buffer is visiting.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// File-name stem used to derive staged file names.
    ///
    /// Falls back to the buffer name, then to `buffer-<id>`, and keeps only
    /// characters that are safe in a file name.
    #[must_use]
    pub fn stem(&self) -> String {
        let raw = self
            .path
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .unwrap_or(&self.name);
        let cleaned: String = raw
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if cleaned.trim_matches(['_', '.']).is_empty() {
            format!("buffer-{}", self.id)
        } else {
            cleaned
        }
    }
}
