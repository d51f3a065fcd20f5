//! Source locations
//!
//! Xvr sources are byte-oriented, and a token carries exactly one
//! position: the line it starts on. A span is therefore the byte range
//! of a lexeme plus the line/column of its first byte. The lexer is the
//! only producer of spans (it knows where the newlines are; see
//! `Lexer::make_span`), so there is no standalone line table here.

use serde::{Deserialize, Serialize};

/// The byte range of a lexeme and the position where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Offset of the first byte (0-indexed).
    pub start: usize,
    /// Offset one past the last byte.
    pub end: usize,
    /// Line holding the first byte (1-indexed).
    pub line: usize,
    /// Byte column of the first byte within its line (1-indexed; columns
    /// count bytes, not characters, like everything else in Xvr).
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

    /// A zero-width span at the origin, for errors with no better anchor.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Byte length of the lexeme.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_is_byte_width() {
        let span = Span::new(4, 9, 1, 5);
        assert_eq!(span.len(), 5);
        assert!(!span.is_empty());
    }

    #[test]
    fn test_empty_span() {
        let span = Span::empty();
        assert_eq!(span.len(), 0);
        assert!(span.is_empty());
        assert_eq!(span.line, 0);
    }

    #[test]
    fn test_lexer_is_the_span_producer() {
        // `print` starts line 2, column 1; `7` sits at column 7
        let tokens: Vec<_> = crate::lexer::tokenize("var x;\nprint 7;")
            .into_iter()
            .filter_map(|r| r.ok())
            .collect();

        let print_kw = &tokens[3];
        assert_eq!(print_kw.span.line, 2);
        assert_eq!(print_kw.span.column, 1);
        assert_eq!(print_kw.span.len(), 5);

        let seven = &tokens[4];
        assert_eq!(seven.span.line, 2);
        assert_eq!(seven.span.column, 7);
        assert_eq!(&"var x;\nprint 7;"[seven.span.start..seven.span.end], "7");
    }
}
