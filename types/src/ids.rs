use std::fmt;

use crate::ToolKind;

/// Identity of an editor buffer. Stable for the buffer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The (buffer, tool) pair that owns exactly one check session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub buffer: BufferId,
    pub tool: ToolKind,
}

impl SessionKey {
    #[must_use]
    pub fn new(buffer: BufferId, tool: ToolKind) -> Self {
        Self { buffer, tool }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.buffer, self.tool)
    }
}
