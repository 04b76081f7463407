//! Diagnostic reporter: maps parsed lines to buffer ranges and hands the
//! batch to the host's sink in one call.

use makecheck_types::{BufferSnapshot, Diagnostic, ReportedDiagnostic, TextRange, ToolKind};

/// Sink for one check's results. Called at most once per run, with the full
/// batch; stale runs never call it.
pub type ReportFn = Box<dyn FnOnce(Vec<ReportedDiagnostic>) + Send>;

/// Translates a 1-based line into a highlightable range of a snapshot.
///
/// `None` means the line does not exist (e.g. past the end of the buffer);
/// the reporter drops that diagnostic and keeps the rest.
pub trait RangeResolver: Send {
    fn resolve_range(&self, snapshot: &BufferSnapshot, line: u32) -> Option<TextRange>;
}

/// Default resolver: the non-blank text of the line, or the whole line when
/// it is blank. Offsets are bytes into the snapshot text.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineRangeResolver;

impl LineRangeResolver {
    /// Byte range of the full line (without its terminator).
    #[must_use]
    pub fn line_bounds(text: &str, line: u32) -> Option<TextRange> {
        let index = usize::try_from(line.checked_sub(1)?).ok()?;
        let mut start = 0;
        for (i, raw) in text.split_inclusive('\n').enumerate() {
            if i == index {
                let content = raw.trim_end_matches(['\n', '\r']);
                return Some(TextRange::new(start, start + content.len()));
            }
            start += raw.len();
        }
        None
    }
}

impl RangeResolver for LineRangeResolver {
    fn resolve_range(&self, snapshot: &BufferSnapshot, line: u32) -> Option<TextRange> {
        let text = snapshot.text();
        let bounds = Self::line_bounds(text, line)?;
        let content = &text[bounds.start..bounds.end];
        let trimmed_start = content.len() - content.trim_start().len();
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Some(bounds);
        }
        let start = bounds.start + trimmed_start;
        Some(TextRange::new(start, start + trimmed.len()))
    }
}

/// Resolve every diagnostic and deliver the batch. Returns how many were
/// delivered.
pub fn report(
    snapshot: &BufferSnapshot,
    tool: ToolKind,
    diagnostics: impl IntoIterator<Item = Diagnostic>,
    resolver: &dyn RangeResolver,
    report_fn: ReportFn,
) -> usize {
    let mut batch = Vec::new();
    for diagnostic in diagnostics {
        match resolver.resolve_range(snapshot, diagnostic.line()) {
            Some(range) => batch.push(ReportedDiagnostic::new(diagnostic, range, tool)),
            None => {
                tracing::debug!(
                    buffer = %snapshot.id(),
                    tool = %tool,
                    line = diagnostic.line(),
                    "Dropping diagnostic with unresolvable line"
                );
            }
        }
    }
    let count = batch.len();
    report_fn(batch);
    count
}
