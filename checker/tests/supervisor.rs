//! End-to-end checks through `CheckSupervisor` with scripted stand-ins for
//! the real tools.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use makecheck_checker::{
    CheckError, CheckOutcome, CheckSupervisor, Disposition, ReportFn, SandboxPolicy,
};
use makecheck_config::CheckerConfig;
use makecheck_types::{BufferId, BufferSnapshot, ReportedDiagnostic, Severity, ToolKind};
use tempfile::TempDir;

/// Prints a diagnostic for the staged file (`$2`) and one for an included
/// file, the way make does on stderr. Sleeps when the snapshot says "slow";
/// leaves a background child holding the output pipes when it says "orphan".
const FAKE_MAKE: &str = r#"#!/bin/sh
if grep -q slow "$2"; then sleep 30; fi
if grep -q orphan "$2"; then (sleep 30 &); fi
echo "$2:7: *** missing separator.  Stop." >&2
echo "/usr/share/mk/common.mk:3: *** included file error.  Stop." >&2
exit 2
"#;

const FAKE_CHECKMAKE: &str = r#"#!/bin/sh
if grep -q slow "$2"; then sleep 30; fi
echo "12:minphony:Missing required phony target \"all\""
echo "not a diagnostic line"
"#;

/// Drops leading `--flags` and runs the rest, like a jail that lets
/// everything through.
const FAKE_FIREJAIL: &str = r#"#!/bin/sh
while [ "${1#--}" != "$1" ]; do shift; done
exec "$@"
"#;

const WAIT: Duration = Duration::from_secs(20);

type Reports = Arc<Mutex<Vec<(&'static str, Vec<ReportedDiagnostic>)>>>;

struct Harness {
    _tools: TempDir,
    staging: TempDir,
    tools_dir: PathBuf,
    reports: Reports,
}

impl Harness {
    fn new() -> Self {
        let tools = tempfile::tempdir().unwrap();
        let tools_dir = tools.path().to_path_buf();
        for (name, body) in [
            ("make", FAKE_MAKE),
            ("checkmake", FAKE_CHECKMAKE),
            ("firejail", FAKE_FIREJAIL),
        ] {
            let path = tools_dir.join(name);
            fs::write(&path, body).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        Self {
            _tools: tools,
            staging: tempfile::tempdir().unwrap(),
            tools_dir,
            reports: Arc::default(),
        }
    }

    fn tool(&self, name: &str) -> String {
        self.tools_dir.join(name).to_string_lossy().into_owned()
    }

    fn config(&self) -> CheckerConfig {
        let mut config = CheckerConfig::default();
        config.make.executable = Some(self.tool("make"));
        config.checkmake.executable = Some(self.tool("checkmake"));
        config.staging.dir = Some(self.staging.path().to_path_buf());
        config
    }

    fn supervisor(&self) -> CheckSupervisor {
        CheckSupervisor::new(self.config())
    }

    fn sink(&self, tag: &'static str) -> ReportFn {
        let reports = self.reports.clone();
        Box::new(move |batch| reports.lock().unwrap().push((tag, batch)))
    }

    fn reports(&self) -> Vec<(&'static str, Vec<ReportedDiagnostic>)> {
        self.reports.lock().unwrap().clone()
    }

    fn staged_files(&self) -> usize {
        fs::read_dir(self.staging.path()).unwrap().count()
    }
}

fn makefile(extra: &str) -> BufferSnapshot {
    let mut text = String::new();
    for i in 1..=14 {
        text.push_str(&format!("line{i}: dep\n"));
    }
    text.push_str(extra);
    BufferSnapshot::new(BufferId::new(1), "Makefile", text)
}

async fn drain(supervisor: &mut CheckSupervisor) -> Vec<CheckOutcome> {
    let mut outcomes = Vec::new();
    tokio::time::timeout(WAIT, async {
        while let Some(outcome) = supervisor.next_outcome().await {
            outcomes.push(outcome);
        }
    })
    .await
    .unwrap();
    outcomes
}

#[tokio::test]
async fn test_make_reports_only_staged_file_errors() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor();

    let run = supervisor
        .run_check(makefile(""), ToolKind::Make, harness.sink("make"))
        .unwrap();
    let outcomes = drain(&mut supervisor).await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].run, run);
    assert_eq!(outcomes[0].disposition, Disposition::Reported { count: 1 });

    let reports = harness.reports();
    assert_eq!(reports.len(), 1);
    let diag = &reports[0].1[0];
    assert_eq!(diag.line(), 7);
    assert_eq!(diag.severity(), Severity::Error);
    assert_eq!(diag.message(), "*** missing separator.  Stop.");
    assert_eq!(diag.tool(), ToolKind::Make);
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn test_checkmake_reports_rule_violation() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor();

    supervisor
        .run_check(makefile(""), ToolKind::Checkmake, harness.sink("lint"))
        .unwrap();
    drain(&mut supervisor).await;

    let reports = harness.reports();
    assert_eq!(reports.len(), 1);
    let batch = &reports[0].1;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].line(), 12);
    assert_eq!(batch[0].severity(), Severity::Warning);
    assert_eq!(
        batch[0].message(),
        "minphony: Missing required phony target \"all\""
    );
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn test_superseded_run_is_never_reported() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor();

    let stale = supervisor
        .run_check(makefile("slow\n"), ToolKind::Make, harness.sink("stale"))
        .unwrap();
    let fresh = supervisor
        .run_check(makefile(""), ToolKind::Make, harness.sink("fresh"))
        .unwrap();
    assert_ne!(stale, fresh);
    assert_eq!(supervisor.pending_runs(), 2);

    let outcomes = drain(&mut supervisor).await;
    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        if outcome.run == stale {
            assert_eq!(outcome.disposition, Disposition::Discarded);
        } else {
            assert_eq!(outcome.run, fresh);
            assert!(matches!(outcome.disposition, Disposition::Reported { .. }));
        }
    }

    let reports = harness.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "fresh");
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn test_tools_for_same_buffer_run_independently() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor();

    supervisor
        .run_check(makefile(""), ToolKind::Make, harness.sink("make"))
        .unwrap();
    supervisor
        .run_check(makefile(""), ToolKind::Checkmake, harness.sink("lint"))
        .unwrap();
    let outcomes = drain(&mut supervisor).await;

    assert_eq!(outcomes.len(), 2);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o.disposition, Disposition::Reported { count: 1 }))
    );
    let mut tags: Vec<_> = harness.reports().into_iter().map(|(tag, _)| tag).collect();
    tags.sort_unstable();
    assert_eq!(tags, vec!["lint", "make"]);
}

#[tokio::test]
async fn test_missing_lint_executable_starts_nothing() {
    let harness = Harness::new();
    let mut config = harness.config();
    config.checkmake.executable = Some("makecheck-no-such-checkmake".to_string());
    let mut supervisor = CheckSupervisor::new(config);

    let err = supervisor
        .run_check(makefile(""), ToolKind::Checkmake, harness.sink("lint"))
        .unwrap_err();
    assert!(err.is_missing_dependency());
    assert!(err.to_string().contains("makecheck-no-such-checkmake"));
    assert_eq!(supervisor.pending_runs(), 0);
    assert_eq!(harness.staged_files(), 0);
    assert!(harness.reports().is_empty());
}

#[tokio::test]
async fn test_close_buffer_kills_and_cleans_up() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor();

    supervisor
        .run_check(makefile("slow\n"), ToolKind::Make, harness.sink("make"))
        .unwrap();
    assert_eq!(harness.staged_files(), 1);

    supervisor.close_buffer(BufferId::new(1));
    assert_eq!(supervisor.pending_runs(), 0);
    assert_eq!(harness.staged_files(), 0);
    assert!(supervisor.session(BufferId::new(1), ToolKind::Make).is_none());
    assert_eq!(supervisor.next_outcome().await, None);
    assert!(harness.reports().is_empty());
}

#[tokio::test]
async fn test_shutdown_discards_in_flight_runs() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor();

    supervisor
        .run_check(makefile("slow\n"), ToolKind::Checkmake, harness.sink("lint"))
        .unwrap();
    tokio::time::timeout(WAIT, supervisor.shutdown())
        .await
        .unwrap();

    assert_eq!(supervisor.pending_runs(), 0);
    assert_eq!(harness.staged_files(), 0);
    assert!(harness.reports().is_empty());
}

#[tokio::test]
async fn test_sandboxed_run_reports() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor();
    supervisor.set_sandbox(SandboxPolicy::enabled(
        harness.tool("firejail"),
        harness.staging.path(),
    ));

    supervisor
        .run_check(makefile(""), ToolKind::Make, harness.sink("make"))
        .unwrap();
    let outcomes = drain(&mut supervisor).await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].disposition, Disposition::Reported { count: 1 });
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn test_sandbox_unreachable_staging_dir() {
    let harness = Harness::new();
    let jail_root = tempfile::tempdir().unwrap();
    let mut supervisor = harness.supervisor();
    supervisor.set_sandbox(SandboxPolicy::enabled(
        harness.tool("firejail"),
        jail_root.path(),
    ));

    let err = supervisor
        .run_check(makefile(""), ToolKind::Make, harness.sink("make"))
        .unwrap_err();
    assert!(matches!(err, CheckError::SandboxUnreachable { .. }));
    assert_eq!(supervisor.pending_runs(), 0);
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn test_poll_events_respects_budget() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor();

    supervisor
        .run_check(makefile(""), ToolKind::Make, harness.sink("make"))
        .unwrap();
    supervisor
        .run_check(makefile(""), ToolKind::Checkmake, harness.sink("lint"))
        .unwrap();

    let mut handled = Vec::new();
    tokio::time::timeout(WAIT, async {
        while supervisor.pending_runs() > 0 {
            let batch = supervisor.poll_events(1);
            assert!(batch.len() <= 1);
            handled.extend(batch);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(handled.len(), 2);
    assert_eq!(harness.reports().len(), 2);
}

#[tokio::test]
async fn test_background_child_does_not_delay_report() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor();

    supervisor
        .run_check(makefile("orphan\n"), ToolKind::Make, harness.sink("make"))
        .unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(10), supervisor.next_outcome())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.disposition, Disposition::Reported { count: 1 });
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn test_superseded_run_with_background_child_is_reclaimed() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor();

    let stale = supervisor
        .run_check(makefile("orphan\n"), ToolKind::Make, harness.sink("stale"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    let fresh = supervisor
        .run_check(makefile(""), ToolKind::Make, harness.sink("fresh"))
        .unwrap();

    let mut outcomes = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(outcome) = supervisor.next_outcome().await {
            outcomes.push(outcome);
        }
    })
    .await
    .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(
        outcomes
            .iter()
            .any(|o| o.run == stale && o.disposition == Disposition::Discarded)
    );
    assert!(
        outcomes
            .iter()
            .any(|o| o.run == fresh && matches!(o.disposition, Disposition::Reported { .. }))
    );
    let reports = harness.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "fresh");
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn test_finished_but_unhandled_run_is_discarded_when_superseded() {
    let harness = Harness::new();
    let mut supervisor = harness.supervisor();

    let stale = supervisor
        .run_check(makefile(""), ToolKind::Checkmake, harness.sink("stale"))
        .unwrap();
    // Let the first run finish so its completion sits in the channel.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let fresh = supervisor
        .run_check(makefile(""), ToolKind::Checkmake, harness.sink("fresh"))
        .unwrap();

    let outcomes = drain(&mut supervisor).await;
    assert_eq!(outcomes.len(), 2);
    let stale_outcome = outcomes.iter().find(|o| o.run == stale).unwrap();
    assert_eq!(stale_outcome.disposition, Disposition::Discarded);
    let fresh_outcome = outcomes.iter().find(|o| o.run == fresh).unwrap();
    assert_eq!(fresh_outcome.disposition, Disposition::Reported { count: 1 });

    let reports = harness.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, "fresh");
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn test_staging_failure_starts_nothing() {
    let harness = Harness::new();
    let mut config = harness.config();
    config.staging.dir = Some(harness.staging.path().join("missing"));
    let mut supervisor = CheckSupervisor::new(config);

    let err = supervisor
        .run_check(makefile(""), ToolKind::Make, harness.sink("make"))
        .unwrap_err();
    assert!(matches!(err, CheckError::Staging { .. }));
    assert!(!err.is_missing_dependency());
    assert_eq!(supervisor.pending_runs(), 0);
    assert!(supervisor.session(BufferId::new(1), ToolKind::Make).is_none());
    assert_eq!(supervisor.next_outcome().await, None);
    assert_eq!(harness.staged_files(), 0);
    assert!(harness.reports().is_empty());
}
