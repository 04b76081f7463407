//! Errors raised synchronously from a check request.
//!
//! Everything that happens after a process is launched (stale discards,
//! unparseable lines, abnormal exits) is handled inside the completion path
//! and never surfaces here.

use std::path::PathBuf;

use makecheck_types::ToolKind;

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("{tool} checks are disabled")]
    BackendDisabled { tool: ToolKind },
    #[error("missing dependency: {what} is not configured")]
    NotConfigured { what: &'static str },
    #[error("missing dependency: {what} executable `{program}` not found")]
    MissingDependency {
        what: &'static str,
        program: String,
        #[source]
        source: which::Error,
    },
    #[error(
        "sandbox misconfigured: staging directory {} is outside the read-only root {}",
        staging_dir.display(),
        root.display()
    )]
    SandboxUnreachable { staging_dir: PathBuf, root: PathBuf },
    #[error("sandbox misconfigured: no read-only root (home directory unknown)")]
    SandboxNoRoot,
    #[error("failed to stage buffer snapshot in {}: {source}", dir.display())]
    Staging {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl CheckError {
    /// Configuration and environment problems: a missing or unconfigured
    /// executable. The host reports these once and does not retry.
    #[must_use]
    pub fn is_missing_dependency(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured { .. } | Self::MissingDependency { .. }
        )
    }
}
