use std::fmt;

/// External checker backends.
///
/// Each variant has a fixed invocation shape and output grammar (see
/// `makecheck-checker`); adding a backend means adding a variant here and its
/// rows in the checker's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolKind {
    /// `make -f <staged> <dummy-target>`: surfaces makefile parse errors.
    Make,
    /// `checkmake --format=<template> <staged>`: style and correctness rules.
    Checkmake,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::Make, ToolKind::Checkmake];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Make => "make",
            Self::Checkmake => "checkmake",
        }
    }

    /// Suffix appended to staged file names so concurrent tools on one buffer
    /// never share a snapshot.
    #[must_use]
    pub fn staging_suffix(self) -> &'static str {
        match self {
            Self::Make => "make_check",
            Self::Checkmake => "checkmake_check",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
