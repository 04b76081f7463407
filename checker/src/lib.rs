//! Asynchronous, cancellable `make` and `checkmake` runs against unsaved
//! makefile buffers.
//!
//! The host hands [`CheckSupervisor`] a [`makecheck_types::BufferSnapshot`]
//! and a sink; the snapshot is staged to disk, the tool runs (optionally
//! inside a firejail sandbox), and its output is parsed into diagnostics
//! reported against the buffer. Starting a new check for the same buffer and
//! tool cancels the previous one.

pub mod error;
pub mod parser;
pub mod reporter;
pub mod sandbox;
pub mod staging;

pub(crate) mod process;
pub(crate) mod session;

mod paths;
mod supervisor;

pub use error::CheckError;
pub use parser::{CHECKMAKE_FORMAT, Diagnostics, ParseContext, RuleSeverities, parse};
pub use process::{ProcessHandle, RunId};
pub use reporter::{LineRangeResolver, RangeResolver, ReportFn, report};
pub use sandbox::{Sandbox, SandboxPolicy, build_command};
pub use session::CheckSession;
pub use staging::{StagedFile, stage, staging_dir, unstage};
pub use supervisor::{CheckOutcome, CheckSupervisor, Disposition};
