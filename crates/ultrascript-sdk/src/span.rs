use serde::{Deserialize, Serialize};

/// Source location information for a token or AST node.
///
/// Byte offsets are into the original UTF-8 source buffer; `line`/`column`
/// are 1-based and recomputed during lexing (never derived from `start`/`end`
/// after the fact, so they stay correct across multi-byte UTF-8 sequences).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// 1-based line number of `start`.
    pub line: u32,
    /// 1-based column number of `start`.
    pub column: u32,
}

impl Span {
    /// Build a span from explicit coordinates.
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// A zero-width span at the origin, used for synthetic nodes that have
    /// no corresponding source text (e.g. a synthesized default export).
    pub fn synthetic() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Number of bytes covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True for zero-width spans.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Slice the original source text covered by this span.
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(&self, other: &Span) -> Span {
        let (start_span, end_span) = if self.start <= other.start {
            (self, other)
        } else {
            (other, self)
        };
        Span {
            start: start_span.start,
            end: self.end.max(other.end),
            line: start_span.line,
            column: start_span.column,
        }
    }
}
