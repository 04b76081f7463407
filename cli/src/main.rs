//! makecheck CLI - checks makefiles on disk through the checker core.
//!
//! Every FILE becomes a buffer snapshot and is handed to each selected
//! backend. Results print one per line:
//!
//! ```text
//! Makefile:7:1: error: *** missing separator.  Stop. [make]
//! Makefile:12:1: warning: minphony: Missing required phony target "all" [checkmake]
//! ```
//!
//! Exit status is 0 when clean, 1 when any error diagnostic was reported,
//! 2 when a check could not be run at all.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use makecheck_checker::{CheckSupervisor, LineRangeResolver, ReportFn};
use makecheck_config::CheckerConfig;
use makecheck_types::{BufferId, BufferSnapshot, ReportedDiagnostic, ToolKind};

#[derive(Parser)]
#[command(name = "makecheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (default: ~/.makecheck/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend to run; repeat for several. Defaults to every enabled backend.
    #[arg(short, long = "tool", value_enum)]
    tools: Vec<ToolArg>,

    /// Run tools inside the sandbox
    #[arg(long, overrides_with = "no_sandbox")]
    sandbox: bool,

    /// Run tools without the sandbox
    #[arg(long, overrides_with = "sandbox")]
    no_sandbox: bool,

    /// Makefiles to check
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ToolArg {
    Make,
    Checkmake,
}

impl From<ToolArg> for ToolKind {
    fn from(arg: ToolArg) -> Self {
        match arg {
            ToolArg::Make => ToolKind::Make,
            ToolArg::Checkmake => ToolKind::Checkmake,
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout carries diagnostics; logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<CheckerConfig> {
    match path {
        Some(path) => CheckerConfig::load_from(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(CheckerConfig::load()
            .context("loading default config")?
            .unwrap_or_default()),
    }
}

struct Summary {
    errors: usize,
    fatal: bool,
}

impl Summary {
    fn exit_status(&self) -> u8 {
        if self.fatal {
            2
        } else if self.errors > 0 {
            1
        } else {
            0
        }
    }
}

async fn run(cli: Cli) -> Result<Summary> {
    let mut config = load_config(cli.config.as_deref())?;
    if cli.sandbox {
        config.sandbox.enabled = true;
    } else if cli.no_sandbox {
        config.sandbox.enabled = false;
    }

    let tools: Vec<ToolKind> = if cli.tools.is_empty() {
        config.enabled_tools()
    } else {
        let mut selected: Vec<ToolKind> = cli.tools.iter().copied().map(Into::into).collect();
        selected.sort_unstable();
        selected.dedup();
        selected
    };

    let mut supervisor = CheckSupervisor::new(config);
    let (tx, rx) = mpsc::channel::<(usize, Vec<ReportedDiagnostic>)>();
    let mut snapshots = Vec::with_capacity(cli.files.len());
    let mut unavailable = HashSet::new();
    let mut fatal = false;

    for (index, path) in cli.files.iter().enumerate() {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("makecheck: {}: {e}", path.display());
                fatal = true;
                continue;
            }
        };
        let snapshot =
            BufferSnapshot::new(BufferId::new(index as u64), path.display().to_string(), text)
                .with_path(path);

        for &tool in &tools {
            if unavailable.contains(&tool) {
                continue;
            }
            let sink = tx.clone();
            let report: ReportFn = Box::new(move |batch| {
                let _ = sink.send((index, batch));
            });
            if let Err(e) = supervisor.run_check(snapshot.clone(), tool, report) {
                eprintln!("makecheck: {}: {e}", path.display());
                fatal = true;
                // Missing tools are reported once, not once per file.
                if e.is_missing_dependency() {
                    unavailable.insert(tool);
                }
            }
        }
        snapshots.push((index, snapshot));
    }
    drop(tx);

    while let Some(outcome) = supervisor.next_outcome().await {
        tracing::debug!(session = %outcome.key, run = %outcome.run, "{:?}", outcome.disposition);
    }
    supervisor.shutdown().await;

    let mut results: Vec<(usize, ReportedDiagnostic)> = rx
        .try_iter()
        .flat_map(|(index, batch)| batch.into_iter().map(move |diag| (index, diag)))
        .collect();
    results.sort_by_key(|(index, diag)| (*index, diag.line(), diag.tool()));

    let mut errors = 0;
    for (index, diag) in &results {
        let Some((_, snapshot)) = snapshots.iter().find(|(i, _)| i == index) else {
            continue;
        };
        let line_start = LineRangeResolver::line_bounds(snapshot.text(), diag.line())
            .map_or(0, |bounds| bounds.start);
        let path = snapshot.path().unwrap_or_else(|| Path::new(snapshot.name()));
        println!("{}", diag.display_with_path(path, line_start));
        if diag.severity().is_error() {
            errors += 1;
        }
    }

    Ok(Summary { errors, fatal })
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(summary) => ExitCode::from(summary.exit_status()),
        Err(err) => {
            eprintln!("makecheck: {err:#}");
            ExitCode::from(2)
        }
    }
}
