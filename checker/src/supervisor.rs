//! CheckSupervisor facade: the host's single entry point.
//!
//! The host calls [`CheckSupervisor::run_check`] whenever a buffer should be
//! checked, and drains completions from its main loop with
//! [`CheckSupervisor::poll_events`] (or awaits them with
//! [`CheckSupervisor::next_outcome`]). Session state is only touched from
//! those calls, never from the watcher tasks, so no locking is needed.
//!
//! The last check started for a (buffer, tool) pair is the implicit
//! cancellation token: starting a new one terminates the old process and
//! marks its results stale.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use makecheck_config::CheckerConfig;
use makecheck_types::{BufferId, BufferSnapshot, SessionKey, ToolKind};
use tokio::sync::mpsc;

use crate::error::CheckError;
use crate::parser::{self, CHECKMAKE_FORMAT, ParseContext, RuleSeverities};
use crate::process::{self, CompletedRun, RunId};
use crate::reporter::{self, LineRangeResolver, RangeResolver, ReportFn};
use crate::sandbox::{SandboxPolicy, build_command};
use crate::session::{ActiveRun, CheckSession, Completion};
use crate::staging::{stage, staging_dir};

/// Channel capacity for completion events from watcher tasks.
const EVENT_CHANNEL_CAPACITY: usize = 64;

const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

/// What happened to a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Results were delivered to the run's sink.
    Reported { count: usize },
    /// A newer check superseded the run; nothing was delivered.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOutcome {
    pub key: SessionKey,
    pub run: RunId,
    pub disposition: Disposition,
}

pub struct CheckSupervisor {
    config: CheckerConfig,
    sandbox: SandboxPolicy,
    rule_severities: RuleSeverities,
    resolver: Box<dyn RangeResolver>,
    sessions: HashMap<SessionKey, CheckSession>,
    next_run: u64,
    event_rx: mpsc::Receiver<CompletedRun>,
    event_tx: mpsc::Sender<CompletedRun>,
}

impl CheckSupervisor {
    #[must_use]
    pub fn new(config: CheckerConfig) -> Self {
        Self::with_resolver(config, LineRangeResolver)
    }

    #[must_use]
    pub fn with_resolver(config: CheckerConfig, resolver: impl RangeResolver + 'static) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sandbox: SandboxPolicy::from_config(&config.sandbox),
            rule_severities: RuleSeverities::with_overrides(&config.checkmake.rule_severity),
            config,
            resolver: Box::new(resolver),
            sessions: HashMap::new(),
            next_run: 0,
            event_rx,
            event_tx,
        }
    }

    /// Replace the sandbox policy for subsequent runs.
    pub fn set_sandbox(&mut self, policy: SandboxPolicy) {
        self.sandbox = policy;
    }

    /// Start checking `snapshot` with `tool`.
    ///
    /// Any run already in flight for the same (buffer, tool) pair is
    /// terminated first and its results will never be reported. Returns the
    /// new run's id once the process is running; `report` is called later,
    /// from the completion path, with the full batch.
    ///
    /// Configuration and staging failures are returned here and no process
    /// is started.
    pub fn run_check(
        &mut self,
        snapshot: BufferSnapshot,
        tool: ToolKind,
        report: ReportFn,
    ) -> Result<RunId, CheckError> {
        let key = SessionKey::new(snapshot.id(), tool);

        if let Some(session) = self.sessions.get_mut(&key) {
            session.supersede();
        }

        let settings = self.config.backend(tool);
        if !settings.enabled {
            return Err(CheckError::BackendDisabled { tool });
        }
        let program = settings
            .executable
            .ok_or(CheckError::NotConfigured { what: tool.name() })?;
        let tool_path = which::which(program).map_err(|source| CheckError::MissingDependency {
            what: tool.name(),
            program: program.to_string(),
            source,
        })?;
        let sandbox = self.sandbox.resolve()?;

        let dir = staging_dir(&snapshot, self.config.staging.dir.as_deref());
        if let Some(sandbox) = &sandbox {
            sandbox.ensure_reachable(&dir)?;
        }
        let staged = stage(&snapshot, tool, &dir)?;

        let argv = build_command(
            &tool_path,
            self.tool_args(tool, staged.path()),
            sandbox.as_ref(),
        );
        let run = self.next_run_id();
        // On failure `staged` drops here and the snapshot is removed.
        let handle = process::launch(key, run, &argv, staged.dir(), self.event_tx.clone())?;

        self.sessions.entry(key).or_default().start(ActiveRun {
            handle,
            staged,
            snapshot,
            report,
        });
        Ok(run)
    }

    fn tool_args(&self, tool: ToolKind, staged: &Path) -> Vec<OsString> {
        match tool {
            ToolKind::Make => vec![
                "-f".into(),
                staged.as_os_str().to_os_string(),
                self.config.make.target.clone().into(),
            ],
            ToolKind::Checkmake => vec![
                format!("--format={CHECKMAKE_FORMAT}").into(),
                staged.as_os_str().to_os_string(),
            ],
        }
    }

    fn next_run_id(&mut self) -> RunId {
        self.next_run += 1;
        RunId::new(self.next_run)
    }

    /// Handle pending completions, up to `budget`, without waiting.
    ///
    /// Returns the outcomes of the runs handled.
    pub fn poll_events(&mut self, budget: usize) -> Vec<CheckOutcome> {
        let mut outcomes = Vec::new();
        let mut handled = 0;
        while handled < budget {
            match self.event_rx.try_recv() {
                Ok(done) => {
                    handled += 1;
                    outcomes.extend(self.handle_completion(done));
                }
                Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => {
                    break;
                }
            }
        }
        outcomes
    }

    /// Wait for the next run to finish and handle it.
    ///
    /// Returns `None` immediately when nothing is in flight.
    pub async fn next_outcome(&mut self) -> Option<CheckOutcome> {
        while self.pending_runs() > 0 {
            let done = self.event_rx.recv().await?;
            if let Some(outcome) = self.handle_completion(done) {
                return Some(outcome);
            }
        }
        None
    }

    /// Completion handler. Runs once per finished process.
    ///
    /// Whatever branch is taken, the run's `ActiveRun` drops at the end,
    /// removing its staged snapshot, and the captured output is released.
    fn handle_completion(&mut self, done: CompletedRun) -> Option<CheckOutcome> {
        let CompletedRun {
            key,
            run,
            output,
            status,
        } = done;
        let Some(session) = self.sessions.get_mut(&key) else {
            tracing::debug!(session = %key, run = %run, "Completion for closed buffer");
            return None;
        };

        match session.complete(run) {
            Completion::Current(active) => {
                let ctx = ParseContext {
                    staged_path: active.staged.path(),
                    working_dir: active.staged.dir(),
                    rule_severities: &self.rule_severities,
                };
                let diagnostics = parser::parse(key.tool, &output, ctx);
                let count = reporter::report(
                    &active.snapshot,
                    key.tool,
                    diagnostics,
                    self.resolver.as_ref(),
                    active.report,
                );
                tracing::info!(
                    session = %key,
                    run = %run,
                    status = ?status,
                    count,
                    "Check finished"
                );
                Some(CheckOutcome {
                    key,
                    run,
                    disposition: Disposition::Reported { count },
                })
            }
            Completion::Superseded(stale) => {
                tracing::debug!(
                    session = %key,
                    run = %run,
                    staged = %stale.staged.path().display(),
                    "Discarding superseded result"
                );
                Some(CheckOutcome {
                    key,
                    run,
                    disposition: Disposition::Discarded,
                })
            }
            Completion::Unknown => {
                tracing::debug!(session = %key, run = %run, "Completion for unknown run");
                None
            }
        }
    }

    #[must_use]
    pub fn session(&self, buffer: BufferId, tool: ToolKind) -> Option<&CheckSession> {
        self.sessions.get(&SessionKey::new(buffer, tool))
    }

    /// Runs started but not yet handled, across all sessions.
    #[must_use]
    pub fn pending_runs(&self) -> usize {
        self.sessions.values().map(CheckSession::pending_runs).sum()
    }

    /// End a buffer's lifetime: kill its processes and drop its sessions,
    /// removing their snapshots.
    pub fn close_buffer(&mut self, buffer: BufferId) {
        self.sessions.retain(|key, _| key.buffer != buffer);
        tracing::debug!(buffer = %buffer, "Closed buffer sessions");
    }

    /// Terminate every run and wait, bounded, for their completions so each
    /// snapshot is cleaned up through the normal path.
    pub async fn shutdown(&mut self) {
        for session in self.sessions.values_mut() {
            session.terminate_all();
        }
        let drained = tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), async {
            while self.next_outcome().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::debug!(
                pending = self.pending_runs(),
                "Tool processes didn't exit in time"
            );
        }
        self.sessions.clear();
    }
}
