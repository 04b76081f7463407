//! Lexical path helpers shared by the sandbox launcher and the build-tool parser.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` without touching the filesystem.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut out = Vec::new();
    for c in path.components() {
        match c {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// Expand a path as a tool printed it: `~` to the home directory, relative
/// paths against `base` (the tool's working directory), then normalize.
pub(crate) fn expand_path(raw: &str, base: &Path) -> PathBuf {
    let expanded = if raw == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw))
    } else if let Some(rest) = raw.strip_prefix("~/") {
        dirs::home_dir().map_or_else(|| PathBuf::from(raw), |home| home.join(rest))
    } else {
        PathBuf::from(raw)
    };
    if expanded.is_absolute() {
        normalize_path(&expanded)
    } else {
        normalize_path(&base.join(expanded))
    }
}

/// Canonical form when the path exists, lexical form otherwise.
pub(crate) fn resolve_existing(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| normalize_path(path))
}
