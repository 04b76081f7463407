//! Core domain types for makecheck.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! The checker, the config loader and the binary all speak in these values.

mod buffer;
mod diagnostic;
mod ids;
mod tool;

pub use buffer::BufferSnapshot;
pub use diagnostic::{Diagnostic, ReportedDiagnostic, Severity, TextRange};
pub use ids::{BufferId, SessionKey};
pub use tool::ToolKind;
