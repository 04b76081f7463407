//! Sandbox launcher: turns a tool invocation into the argv actually executed.
//!
//! With the sandbox enabled the tool runs under `firejail` with no profile,
//! no capabilities, a seccomp filter, no root inside the jail, and the user's
//! home mounted read-only. Makefiles can run `$(shell ...)` at parse time,
//! so the build-tool backend in particular executes untrusted input.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use makecheck_config::SandboxConfig;

use crate::error::CheckError;
use crate::paths::resolve_existing;

/// Fixed wrapper flags, in order, before the read-only bind.
pub const SANDBOX_FLAGS: &[&str] = &[
    "--quiet",
    "--noprofile",
    "--caps.drop=all",
    "--seccomp",
    "--noroot",
];

/// Launch-time sandbox configuration. Not mutated during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPolicy {
    enabled: bool,
    executable: Option<String>,
    read_only_root: Option<PathBuf>,
}

impl SandboxPolicy {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            executable: None,
            read_only_root: None,
        }
    }

    #[must_use]
    pub fn enabled(executable: impl Into<String>, read_only_root: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            executable: Some(executable.into()),
            read_only_root: Some(read_only_root.into()),
        }
    }

    #[must_use]
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            enabled: config.enabled,
            executable: config.executable.clone(),
            read_only_root: config.read_only_root(),
        }
    }

    /// Locate the sandbox executable and read-only root.
    ///
    /// `Ok(None)` when the policy is disabled. Runs before anything is
    /// staged, so a missing sandbox never leaves a file behind.
    pub fn resolve(&self) -> Result<Option<Sandbox>, CheckError> {
        if !self.enabled {
            return Ok(None);
        }
        let program = self
            .executable
            .as_deref()
            .ok_or(CheckError::NotConfigured { what: "sandbox" })?;
        let executable =
            which::which(program).map_err(|source| CheckError::MissingDependency {
                what: "sandbox",
                program: program.to_string(),
                source,
            })?;
        let root = self
            .read_only_root
            .as_deref()
            .ok_or(CheckError::SandboxNoRoot)?;
        Ok(Some(Sandbox {
            executable,
            root: resolve_existing(root),
        }))
    }
}

/// A located sandbox, ready to wrap invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    executable: PathBuf,
    root: PathBuf,
}

impl Sandbox {
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fail fast unless `dir` lies under the read-only root. A staged file
    /// outside it would be invisible to the jailed tool.
    pub fn ensure_reachable(&self, dir: &Path) -> Result<(), CheckError> {
        let resolved = resolve_existing(dir);
        if resolved.starts_with(&self.root) {
            Ok(())
        } else {
            Err(CheckError::SandboxUnreachable {
                staging_dir: resolved,
                root: self.root.clone(),
            })
        }
    }

    fn read_only_flag(&self) -> OsString {
        let mut flag = OsString::from("--read-only=");
        flag.push(&self.root);
        flag
    }
}

/// Build the argv for one tool run.
///
/// Without a sandbox this is `[tool_path, ...tool_args]`; with one, the
/// wrapper invocation comes first.
#[must_use]
pub fn build_command(
    tool_path: &Path,
    tool_args: Vec<OsString>,
    sandbox: Option<&Sandbox>,
) -> Vec<OsString> {
    let mut argv = Vec::with_capacity(tool_args.len() + SANDBOX_FLAGS.len() + 3);
    if let Some(sandbox) = sandbox {
        argv.push(sandbox.executable.clone().into_os_string());
        argv.extend(SANDBOX_FLAGS.iter().map(OsString::from));
        argv.push(sandbox.read_only_flag());
    }
    argv.push(tool_path.as_os_str().to_os_string());
    argv.extend(tool_args);
    argv
}
