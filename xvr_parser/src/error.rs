//! Parse error types

use crate::span::Span;
use thiserror::Error;

/// Parse error type
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    /// Unexpected token
    #[error("unexpected token '{found}' at line {}, expected {expected}", .span.line)]
    UnexpectedToken {
        found: String,
        expected: String,
        span: Span,
    },

    /// Unexpected end of input
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String, span: Span },

    /// Unterminated string
    #[error("unterminated string literal starting at line {}", .span.line)]
    UnterminatedString { span: Span },

    /// Unterminated block comment
    #[error("unterminated block comment starting at line {}", .span.line)]
    UnterminatedBlockComment { span: Span },

    /// String literal over the 4096-byte limit
    #[error("string literal too long ({length} bytes, limit 4096) at line {}", .span.line)]
    StringTooLong { length: usize, span: Span },

    /// Invalid number literal
    #[error("invalid number literal '{literal}' at line {}", .span.line)]
    InvalidNumber { literal: String, span: Span },

    /// Empty control-flow body
    #[error("empty body at line {} (use 'pass' for an intentional empty body)", .span.line)]
    EmptyBody { span: Span },

    /// Reserved keyword used where it cannot appear
    #[error("reserved word '{word}' cannot be used here (line {})", .span.line)]
    ReservedWord { word: String, span: Span },

    /// Invalid syntax
    #[error("{message} at line {}", .span.line)]
    InvalidSyntax { message: String, span: Span },

    /// Lexer error (unknown character)
    #[error("unrecognized character at line {}", .span.line)]
    LexerError { span: Span },
}

impl ParseError {
    /// Get the span of the error
    pub fn span(&self) -> &Span {
        match self {
            ParseError::UnexpectedToken { span, .. } => span,
            ParseError::UnexpectedEof { span, .. } => span,
            ParseError::UnterminatedString { span } => span,
            ParseError::UnterminatedBlockComment { span } => span,
            ParseError::StringTooLong { span, .. } => span,
            ParseError::InvalidNumber { span, .. } => span,
            ParseError::EmptyBody { span } => span,
            ParseError::ReservedWord { span, .. } => span,
            ParseError::InvalidSyntax { span, .. } => span,
            ParseError::LexerError { span } => span,
        }
    }

    /// Create an unexpected token error
    pub fn unexpected_token(
        found: impl Into<String>,
        expected: impl Into<String>,
        span: Span,
    ) -> Self {
        ParseError::UnexpectedToken {
            found: found.into(),
            expected: expected.into(),
            span,
        }
    }

    /// Create an unexpected EOF error
    pub fn unexpected_eof(expected: impl Into<String>, span: Span) -> Self {
        ParseError::UnexpectedEof {
            expected: expected.into(),
            span,
        }
    }

    /// Create an invalid syntax error
    pub fn invalid_syntax(message: impl Into<String>, span: Span) -> Self {
        ParseError::InvalidSyntax {
            message: message.into(),
            span,
        }
    }

    /// Format error with source context
    ///
    /// Returns a string showing the offending source line with a marker
    /// under the lexeme's bytes.
    pub fn format_with_context(&self, source: &str) -> String {
        let span = self.span();

        let Some(line) = source.lines().nth(span.line.saturating_sub(1)) else {
            return String::new();
        };

        let col = span.column.saturating_sub(1).min(line.len());
        // clamp the marker to the rest of the line; zero-width errors
        // still get one caret
        let width = span.len().min(line.len() - col).max(1);

        format!(
            "  {} | {}\n  {} | {}{}",
            span.line,
            line,
            " ".repeat(span.line.to_string().len()),
            " ".repeat(col),
            "^".repeat(width)
        )
    }
}

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors collected while the parser recovers; reads like a slice, and
/// the caller drains it once scanning finishes.
#[derive(Debug, Default)]
pub struct ParseErrors(Vec<ParseError>);

impl ParseErrors {
    pub(crate) fn push(&mut self, error: ParseError) {
        self.0.push(error);
    }

    /// Borrow the collected errors.
    pub fn errors(&self) -> &[ParseError] {
        &self.0
    }
}

impl std::ops::Deref for ParseErrors {
    type Target = [ParseError];

    fn deref(&self) -> &[ParseError] {
        &self.0
    }
}

impl IntoIterator for ParseErrors {
    type Item = ParseError;
    type IntoIter = std::vec::IntoIter<ParseError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_line_and_lexeme() {
        let span = Span::new(0, 5, 3, 1);
        let err = ParseError::unexpected_token("foo", "';'", span);

        let message = err.to_string();
        assert!(message.contains("foo"));
        assert!(message.contains("';'"));
        assert!(message.contains("line 3"));
    }

    #[test]
    fn test_collection_reads_like_a_slice() {
        let mut errors = ParseErrors::default();
        assert!(errors.is_empty());

        let span = Span::new(0, 5, 1, 1);
        errors.push(ParseError::unexpected_token("a", "b", span));
        errors.push(ParseError::unexpected_eof("expression", span));

        assert_eq!(errors.len(), 2);
        assert!(matches!(
            errors.first(),
            Some(ParseError::UnexpectedToken { .. })
        ));
        assert_eq!(errors.into_iter().count(), 2);
    }

    #[test]
    fn test_marker_covers_the_lexeme() {
        let source = "var total = nope!;";
        // "nope" occupies bytes 12..16 on line 1
        let span = Span::new(12, 16, 1, 13);
        let err = ParseError::unexpected_token("nope", "expression", span);

        let context = err.format_with_context(source);
        assert!(context.contains("var total = nope!;"));
        assert!(context.contains("^^^^"));
        assert!(!context.contains("^^^^^"));
    }

    #[test]
    fn test_marker_clamps_at_line_end() {
        let source = "var x = ;";
        let span = Span::new(8, 9, 1, 9);
        let err = ParseError::unexpected_token(";", "expression", span);

        let context = err.format_with_context(source);
        assert!(context.ends_with('^'));
    }
}
