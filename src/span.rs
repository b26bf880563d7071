//! Source text ranges.
//!
//! All positions are byte offsets into the original source. Nodes created by
//! the transforms copy the span of the construct they were derived from so
//! diagnostics keep pointing at user code.

use serde::Serialize;

/// A half-open byte range `[start, end)` in the source text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Span {
        Span { start, end }
    }

    /// A span that points nowhere. Used for synthesized nodes that never
    /// received a source position.
    pub const NONE: Span = Span { start: 0, end: 0 };

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The smallest span covering both `self` and `other`.
    pub fn merge(&self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}
