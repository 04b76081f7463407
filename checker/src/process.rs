//! Tool processes: launch, capture, termination, completion events.
//!
//! Each launch spawns a watcher task that owns the child. The task waits for
//! exit (or a kill request), collects stdout and stderr, and posts exactly one
//! [`CompletedRun`] back to the supervisor's event channel. The supervisor
//! keeps only a [`ProcessHandle`]: an identity plus a way to ask for a kill.

use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use makecheck_types::SessionKey;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use crate::error::CheckError;

/// Environment variables never passed to tool processes.
/// Patterns: `*_SUFFIX`, `PREFIX_*`, `*_INFIX*`, or exact names.
pub(crate) const ENV_SECRET_DENYLIST: &[&str] = &[
    "*_KEY",
    "*_TOKEN",
    "*_SECRET*",
    "*_PASSWORD*",
    "*_CREDENTIAL*",
    "AWS_*",
    "AZURE_*",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "SSH_AUTH_SOCK",
];

/// Both pattern and key are compared in uppercase.
fn env_glob_matches(pattern: &str, key_upper: &str) -> bool {
    let pat = pattern.to_uppercase();
    match (pat.starts_with('*'), pat.ends_with('*')) {
        (true, true) => {
            let inner = &pat[1..pat.len() - 1];
            key_upper.contains(inner)
        }
        (true, false) => key_upper.ends_with(&pat[1..]),
        (false, true) => key_upper.starts_with(&pat[..pat.len() - 1]),
        (false, false) => key_upper == pat,
    }
}

fn strip_secret_env(cmd: &mut Command) {
    for (key, _) in std::env::vars_os() {
        let Some(name) = key.to_str() else { continue };
        let upper = name.to_uppercase();
        if ENV_SECRET_DENYLIST
            .iter()
            .any(|pat| env_glob_matches(pat, &upper))
        {
            cmd.env_remove(&key);
        }
    }
}

/// Identity of one tool run. Monotonic per supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl RunId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a watcher task reports when its process has terminated.
#[derive(Debug)]
pub(crate) struct CompletedRun {
    pub key: SessionKey,
    pub run: RunId,
    /// stdout followed by stderr, lossily decoded.
    pub output: String,
    /// `None` if waiting on the child failed.
    pub status: Option<ExitStatus>,
}

/// Handle to a live tool process, owned by its check session.
///
/// Dropping the handle requests termination, so a session that goes away
/// never leaves its process running.
#[derive(Debug)]
pub struct ProcessHandle {
    run: RunId,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    #[must_use]
    pub fn run(&self) -> RunId {
        self.run
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// A handle with no process behind it.
    #[cfg(test)]
    pub(crate) fn detached(run: RunId) -> Self {
        Self {
            run,
            pid: None,
            kill_tx: None,
        }
    }

    /// Ask the watcher to kill the process. Best-effort and asynchronous:
    /// the run's completion event still arrives afterwards.
    pub(crate) fn terminate(&mut self) {
        let Some(kill_tx) = self.kill_tx.take() else {
            return;
        };
        if kill_tx.send(()).is_err() {
            tracing::debug!(run = %self.run, "Process already finished before kill request");
        } else {
            tracing::debug!(run = %self.run, pid = ?self.pid, "Requested termination");
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
    }
}

/// Start `argv` in `cwd` and register its completion with `event_tx`.
pub(crate) fn launch(
    key: SessionKey,
    run: RunId,
    argv: &[OsString],
    cwd: &Path,
    event_tx: mpsc::Sender<CompletedRun>,
) -> Result<ProcessHandle, CheckError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(CheckError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group so a kill reaches recipes and sandbox children too.
    #[cfg(unix)]
    cmd.process_group(0);
    strip_secret_env(&mut cmd);

    let child = cmd.spawn().map_err(|source| CheckError::Spawn {
        program: program.to_string_lossy().into_owned(),
        source,
    })?;
    let pid = child.id();
    let (kill_tx, kill_rx) = oneshot::channel();

    tracing::info!(session = %key, run = %run, pid = ?pid, "Launched {}", program.to_string_lossy());
    tokio::spawn(watch(child, key, run, kill_rx, event_tx));

    Ok(ProcessHandle {
        run,
        pid,
        kill_tx: Some(kill_tx),
    })
}

async fn watch(
    mut child: Child,
    key: SessionKey,
    run: RunId,
    mut kill_rx: oneshot::Receiver<()>,
    event_tx: mpsc::Sender<CompletedRun>,
) {
    // The child leads its own group, so its pid is the group id. The id
    // stays valid after the leader exits for as long as any member lives.
    let pgid = child.id();
    let mut capture = tokio::spawn(capture_output(child.stdout.take(), child.stderr.take()));

    // A dropped sender means the owning session is gone: kill as well.
    let mut kill_requested = false;
    let status = tokio::select! {
        status = child.wait() => status,
        _ = &mut kill_rx => {
            kill_requested = true;
            kill(&mut child, pgid);
            child.wait().await
        }
    };
    let status = match status {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!(session = %key, run = %run, "Failed to wait on tool process: {e}");
            None
        }
    };

    // Anything the tool left running in its group (`$(shell cmd &)`) would
    // outlive the run and hold the output pipes open.
    if kill_group(pgid) {
        tracing::debug!(session = %key, run = %run, "Killed leftover processes in tool group");
    }

    let output = tokio::select! {
        joined = &mut capture => match joined {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(session = %key, run = %run, "Output capture task failed: {e}");
                String::new()
            }
        },
        _ = &mut kill_rx, if !kill_requested => {
            // A process that left the group can still hold a pipe; give up
            // on its output rather than wait for it.
            kill_group(pgid);
            capture.abort();
            tracing::debug!(session = %key, run = %run, "Abandoned output capture after kill request");
            String::new()
        }
    };

    let completed = CompletedRun {
        key,
        run,
        output,
        status,
    };
    if event_tx.send(completed).await.is_err() {
        tracing::debug!(session = %key, run = %run, "Supervisor gone; completion dropped");
    }
}

/// SIGKILL the process group, falling back to the child alone.
fn kill(child: &mut Child, pgid: Option<u32>) {
    if kill_group(pgid) {
        return;
    }
    if let Err(e) = child.start_kill() {
        tracing::warn!("Failed to kill tool process: {e}");
    }
}

/// SIGKILL every process in group `pgid`. False when the group is already
/// empty or groups are unsupported.
#[cfg(unix)]
fn kill_group(pgid: Option<u32>) -> bool {
    let Some(pgid) = pgid else {
        return false;
    };
    let rc = unsafe { libc::killpg(pgid as i32, libc::SIGKILL) };
    if rc != 0 {
        tracing::trace!(pgid, "killpg: {}", std::io::Error::last_os_error());
    }
    rc == 0
}

#[cfg(not(unix))]
fn kill_group(_pgid: Option<u32>) -> bool {
    false
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream
        && let Err(e) = stream.read_to_end(&mut buf).await
    {
        tracing::debug!("Error reading tool output: {e}");
    }
    buf
}

async fn capture_output(
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
) -> String {
    let (mut out, err) = tokio::join!(read_stream(stdout), read_stream(stderr));
    if !err.is_empty() {
        if !out.is_empty() && !out.ends_with(b"\n") {
            out.push(b'\n');
        }
        out.extend_from_slice(&err);
    }
    String::from_utf8_lossy(&out).into_owned()
}
