//! Per-(buffer, tool) check state.

use std::collections::HashMap;
use std::path::Path;

use makecheck_types::BufferSnapshot;

use crate::process::{ProcessHandle, RunId};
use crate::reporter::ReportFn;
use crate::staging::StagedFile;

/// Everything one run owns. Dropping it kills the process (if still alive)
/// and removes the staged snapshot.
pub(crate) struct ActiveRun {
    pub handle: ProcessHandle,
    pub staged: StagedFile,
    pub snapshot: BufferSnapshot,
    pub report: ReportFn,
}

/// How a completion relates to the session that launched it.
pub(crate) enum Completion {
    /// The session's current run: report it.
    Current(ActiveRun),
    /// A run a newer check replaced: discard it.
    Superseded(ActiveRun),
    /// Not ours (already handled, or the session was reset).
    Unknown,
}

/// Check state for one (buffer, tool) pair.
///
/// At most one run is current. Runs replaced by a newer check wait in
/// `superseded` until their own completion event arrives, so a superseded
/// snapshot and the current one can briefly coexist on disk.
#[derive(Default)]
pub struct CheckSession {
    active: Option<ActiveRun>,
    superseded: HashMap<RunId, ActiveRun>,
}

impl CheckSession {
    /// The run whose results will be reported, if any.
    #[must_use]
    pub fn current_run(&self) -> Option<RunId> {
        self.active.as_ref().map(|run| run.handle.run())
    }

    /// Snapshot path of the current run.
    #[must_use]
    pub fn staged_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|run| run.staged.path())
    }

    /// Runs still waiting for their completion event.
    #[must_use]
    pub fn pending_runs(&self) -> usize {
        usize::from(self.active.is_some()) + self.superseded.len()
    }

    /// Terminate the current run and demote it; its completion will be
    /// discarded.
    pub(crate) fn supersede(&mut self) {
        if let Some(mut run) = self.active.take() {
            run.handle.terminate();
            self.superseded.insert(run.handle.run(), run);
        }
    }

    pub(crate) fn start(&mut self, run: ActiveRun) {
        self.supersede();
        self.active = Some(run);
    }

    pub(crate) fn complete(&mut self, run: RunId) -> Completion {
        if self.current_run() == Some(run)
            && let Some(active) = self.active.take()
        {
            return Completion::Current(active);
        }
        match self.superseded.remove(&run) {
            Some(stale) => Completion::Superseded(stale),
            None => Completion::Unknown,
        }
    }

    /// Terminate every run; completions still arrive and are discarded.
    pub(crate) fn terminate_all(&mut self) {
        self.supersede();
        for run in self.superseded.values_mut() {
            run.handle.terminate();
        }
    }
}
