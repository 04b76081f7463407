//! Output parsers: tool text in, [`Diagnostic`]s out.
//!
//! Each backend has a grammar, a list of line patterns paired with an
//! extractor that turns captures into a diagnostic under the backend's
//! severity policy. Lines no pattern accepts are skipped silently.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::Lines;
use std::sync::LazyLock;

use makecheck_types::{Diagnostic, Severity, ToolKind};
use regex::{Captures, Regex};

use crate::paths::{expand_path, normalize_path};

/// Output template handed to `checkmake --format`; one violation per line.
pub const CHECKMAKE_FORMAT: &str = "{{.LineNumber}}:{{.Rule}}:{{.Violation}}\n";

/// Built-in checkmake rule severities.
pub const DEFAULT_RULE_SEVERITIES: &[(&str, Severity)] = &[
    ("maxbodylength", Severity::Note),
    ("minphony", Severity::Warning),
    ("phonydeclared", Severity::Warning),
    ("timestampexpanded", Severity::Warning),
];

/// Severity for rules missing from the table.
pub const DEFAULT_RULE_SEVERITY: Severity = Severity::Warning;

/// Rule name -> severity lookup for the lint-tool backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSeverities {
    table: HashMap<String, Severity>,
}

impl Default for RuleSeverities {
    fn default() -> Self {
        Self {
            table: DEFAULT_RULE_SEVERITIES
                .iter()
                .map(|(rule, severity)| ((*rule).to_string(), *severity))
                .collect(),
        }
    }
}

impl RuleSeverities {
    /// Built-in table with `overrides` layered on top.
    #[must_use]
    pub fn with_overrides(overrides: &BTreeMap<String, Severity>) -> Self {
        let mut severities = Self::default();
        for (rule, severity) in overrides {
            severities.table.insert(rule.clone(), *severity);
        }
        severities
    }

    #[must_use]
    pub fn severity_for(&self, rule: &str) -> Severity {
        self.table
            .get(rule)
            .copied()
            .unwrap_or(DEFAULT_RULE_SEVERITY)
    }
}

/// Per-run facts a grammar may consult.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    /// The snapshot this run checked. Build-tool lines must name it.
    pub staged_path: &'a Path,
    /// The tool's working directory, for expanding relative paths.
    pub working_dir: &'a Path,
    pub rule_severities: &'a RuleSeverities,
}

type Extractor = fn(&Captures<'_>, &ParseContext<'_>) -> Option<Diagnostic>;

struct LinePattern {
    regex: Regex,
    extract: Extractor,
}

impl LinePattern {
    fn new(pattern: &str, extract: Extractor) -> Self {
        Self {
            regex: Regex::new(pattern).expect("grammar patterns are valid"),
            extract,
        }
    }
}

struct Grammar {
    patterns: Vec<LinePattern>,
}

impl Grammar {
    fn match_line(&self, line: &str, ctx: &ParseContext<'_>) -> Option<Diagnostic> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .regex
                .captures(line)
                .and_then(|caps| (pattern.extract)(&caps, ctx))
        })
    }
}

static MAKE_GRAMMAR: LazyLock<Grammar> = LazyLock::new(|| Grammar {
    patterns: vec![LinePattern::new(
        r"^(?P<path>[^:]+):(?P<line>\d+):(?P<message>.*)$",
        extract_make,
    )],
});

static CHECKMAKE_GRAMMAR: LazyLock<Grammar> = LazyLock::new(|| Grammar {
    patterns: vec![LinePattern::new(
        r"^(?P<line>\d+):(?P<rule>[^:]+):(?P<violation>.*)$",
        extract_checkmake,
    )],
});

fn grammar(tool: ToolKind) -> &'static Grammar {
    match tool {
        ToolKind::Make => &MAKE_GRAMMAR,
        ToolKind::Checkmake => &CHECKMAKE_GRAMMAR,
    }
}

/// `<path>:<line>:<message>`, kept only when `<path>` is this run's snapshot.
/// Makefiles pull in other files; their errors are not about this buffer.
fn extract_make(caps: &Captures<'_>, ctx: &ParseContext<'_>) -> Option<Diagnostic> {
    let path = expand_path(&caps["path"], ctx.working_dir);
    if path != normalize_path(ctx.staged_path) {
        tracing::trace!(path = %path.display(), "Skipping diagnostic for another file");
        return None;
    }
    let line = caps["line"].parse().ok()?;
    Diagnostic::new(line, Severity::Error, caps["message"].trim())
}

/// `<line>:<rule>:<violation>`, severity looked up by rule name.
fn extract_checkmake(caps: &Captures<'_>, ctx: &ParseContext<'_>) -> Option<Diagnostic> {
    let line = caps["line"].parse().ok()?;
    let rule = caps["rule"].trim();
    let violation = caps["violation"].trim();
    Diagnostic::new(
        line,
        ctx.rule_severities.severity_for(rule),
        format!("{rule}: {violation}"),
    )
}

/// Lazily parsed diagnostics. Single pass: once consumed, it is done.
pub struct Diagnostics<'a> {
    lines: Lines<'a>,
    grammar: &'static Grammar,
    ctx: ParseContext<'a>,
}

impl Iterator for Diagnostics<'_> {
    type Item = Diagnostic;

    fn next(&mut self) -> Option<Diagnostic> {
        for line in self.lines.by_ref() {
            if let Some(diagnostic) = self.grammar.match_line(line, &self.ctx) {
                return Some(diagnostic);
            }
        }
        None
    }
}

/// Parse captured tool output for `tool`.
#[must_use]
pub fn parse<'a>(tool: ToolKind, raw: &'a str, ctx: ParseContext<'a>) -> Diagnostics<'a> {
    Diagnostics {
        lines: raw.lines(),
        grammar: grammar(tool),
        ctx,
    }
}
