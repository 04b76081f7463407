//! Diagnostic values produced by the output parsers and handed to the sink.

use serde::Deserialize;

use crate::ToolKind;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl Severity {
    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A single issue parsed from tool output.
///
/// Immutable after construction; consumed once by the reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based line number.
    line: u32,
    severity: Severity,
    message: String,
}

impl Diagnostic {
    /// Returns `None` for line 0: tool output lines are 1-based and a zero
    /// means the match was not a real location.
    #[must_use]
    pub fn new(line: u32, severity: Severity, message: impl Into<String>) -> Option<Self> {
        if line == 0 {
            return None;
        }
        Some(Self {
            line,
            severity,
            message: message.into(),
        })
    }

    /// 1-based line number.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Byte range within a buffer snapshot, `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A diagnostic resolved to a highlightable range, ready for the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedDiagnostic {
    range: TextRange,
    severity: Severity,
    message: String,
    line: u32,
    tool: ToolKind,
}

impl ReportedDiagnostic {
    #[must_use]
    pub fn new(diagnostic: Diagnostic, range: TextRange, tool: ToolKind) -> Self {
        Self {
            range,
            severity: diagnostic.severity,
            message: diagnostic.message,
            line: diagnostic.line,
            tool,
        }
    }

    #[must_use]
    pub fn range(&self) -> TextRange {
        self.range
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 1-based line the range was resolved from.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Backend that produced the diagnostic.
    #[must_use]
    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    /// Format as `path:line:col: severity: message [tool]`, with a 1-based
    /// column computed from `line_start`, the byte offset where the line begins.
    #[must_use]
    pub fn display_with_path(&self, path: &std::path::Path, line_start: usize) -> String {
        format!(
            "{}:{}:{}: {}: {} [{}]",
            path.display(),
            self.line,
            self.range.start.saturating_sub(line_start) + 1,
            self.severity.label(),
            self.message,
            self.tool,
        )
    }
}
