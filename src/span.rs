//! Source locations for tokens and diagnostics.

use std::fmt;

/// A half-open byte range in the source plus the line/column where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Returns the text of the 1-based `line` in `source`, or an empty string when out of range.
pub fn source_line(source: &str, line: usize) -> &str {
    if line == 0 {
        return "";
    }
    source.lines().nth(line - 1).unwrap_or("")
}
