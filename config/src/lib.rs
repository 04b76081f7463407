//! Configuration surface for makecheck.
//!
//! Consumed read-only by the checker: executable paths for each backend and
//! the sandbox, per-backend enable flags, and where staged snapshots go.
//!
//! ```toml
//! [make]
//! executable = "/usr/bin/gmake"
//!
//! [checkmake]
//! enabled = true
//! [checkmake.rule_severity]
//! maxbodylength = "warning"
//!
//! [sandbox]
//! enabled = true
//! executable = "firejail"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use makecheck_types::{Severity, ToolKind};
use serde::Deserialize;

/// Target passed to `make` so that it parses the file without building
/// anything the user wrote.
pub const DEFAULT_MAKE_TARGET: &str = "makecheck-dummy-target";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    pub make: MakeConfig,
    pub checkmake: CheckmakeConfig,
    pub sandbox: SandboxConfig,
    pub staging: StagingConfig,
}

/// Build-tool backend: `make -f <staged> <target>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MakeConfig {
    pub enabled: bool,
    /// Command name or path. `None` means "not configured".
    pub executable: Option<String>,
    pub target: String,
}

impl Default for MakeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            executable: Some("make".to_string()),
            target: DEFAULT_MAKE_TARGET.to_string(),
        }
    }
}

/// Lint-tool backend: `checkmake --format=<template> <staged>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckmakeConfig {
    pub enabled: bool,
    /// Command name or path. `None` means "not configured".
    pub executable: Option<String>,
    /// Rule name -> severity, layered over the built-in table.
    pub rule_severity: BTreeMap<String, Severity>,
}

impl Default for CheckmakeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            executable: Some("checkmake".to_string()),
            rule_severity: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub enabled: bool,
    pub executable: Option<String>,
    /// Root granted read-only to sandboxed tools. Defaults to `$HOME`.
    pub read_only_root: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            executable: Some("firejail".to_string()),
            read_only_root: None,
        }
    }
}

impl SandboxConfig {
    #[must_use]
    pub fn read_only_root(&self) -> Option<PathBuf> {
        self.read_only_root.clone().or_else(dirs::home_dir)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Directory for staged snapshots. When unset, snapshots go next to the
    /// buffer's file, or to the system temp directory for file-less buffers.
    pub dir: Option<PathBuf>,
}

/// Borrowed view of one backend's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendSettings<'a> {
    pub enabled: bool,
    pub executable: Option<&'a str>,
}

impl CheckerConfig {
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let path = match config_path() {
            Some(path) => path,
            None => return Ok(None),
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {}: {err}", path.display());
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {}: {err}", path.display());
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn backend(&self, tool: ToolKind) -> BackendSettings<'_> {
        match tool {
            ToolKind::Make => BackendSettings {
                enabled: self.make.enabled,
                executable: self.make.executable.as_deref(),
            },
            ToolKind::Checkmake => BackendSettings {
                enabled: self.checkmake.enabled,
                executable: self.checkmake.executable.as_deref(),
            },
        }
    }

    /// Backends that are switched on, in a stable order.
    #[must_use]
    pub fn enabled_tools(&self) -> Vec<ToolKind> {
        ToolKind::ALL
            .into_iter()
            .filter(|tool| self.backend(*tool).enabled)
            .collect()
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".makecheck").join("config.toml"))
}
