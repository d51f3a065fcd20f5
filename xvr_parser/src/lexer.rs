//! Lexer for Xvr source code
//!
//! Wraps the logos-generated lexer with the pieces the DFA cannot express
//! cleanly: string contents (with escapes), block comments, and the
//! leading shebang line.

use logos::Logos;

use crate::error::{ParseError, ParseResult};
use crate::span::Span;
use crate::token::Token;

/// Maximum byte length of a string literal.
pub const MAX_STRING_LENGTH: usize = 4096;

/// A token with its span
#[derive(Debug, Clone)]
pub struct SpannedToken<'a> {
    pub token: Token,
    pub span: Span,
    pub text: &'a str,
}

impl<'a> SpannedToken<'a> {
    pub fn new(token: Token, span: Span, text: &'a str) -> Self {
        Self { token, span, text }
    }
}

/// Xvr lexer
pub struct Lexer<'a> {
    source: &'a str,
    inner: logos::Lexer<'a, Token>,
    /// Offsets one past each newline; spans get their line/column from
    /// this table.
    line_starts: Vec<usize>,
    /// Peeked token (for lookahead)
    peeked: Option<Option<Result<SpannedToken<'a>, ParseError>>>,
    /// Offset from original source (used after restarting the inner lexer)
    offset: usize,
}

impl std::fmt::Debug for Lexer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lexer").field("offset", &self.offset).finish()
    }
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source code.
    ///
    /// A `#!` in the very first two bytes consumes the whole shebang line.
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(memchr::memchr_iter(b'\n', source.as_bytes()).map(|at| at + 1));

        let start = if source.starts_with("#!") {
            match memchr::memchr(b'\n', source.as_bytes()) {
                Some(pos) => pos + 1,
                None => source.len(),
            }
        } else {
            0
        };
        Self {
            source,
            inner: Token::lexer(&source[start..]),
            line_starts,
            peeked: None,
            offset: start,
        }
    }

    /// Get the source code
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Line and byte column of an offset (both 1-indexed).
    fn locate(&self, offset: usize) -> (usize, usize) {
        let line = self.line_starts.partition_point(|begin| *begin <= offset);
        let begin = self.line_starts[line - 1];
        (line, offset - begin + 1)
    }

    fn make_span(&self, start: usize, end: usize) -> Span {
        let (line, column) = self.locate(start);
        Span::new(start, end, line, column)
    }

    /// Peek at the next token without consuming it
    pub fn peek(&mut self) -> Option<&Result<SpannedToken<'a>, ParseError>> {
        if self.peeked.is_none() {
            self.peeked = Some(self.next_token_internal());
        }
        match &self.peeked {
            Some(peeked) => peeked.as_ref(),
            None => None,
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Option<Result<SpannedToken<'a>, ParseError>> {
        if let Some(peeked) = self.peeked.take() {
            return peeked;
        }
        self.next_token_internal()
    }

    fn next_token_internal(&mut self) -> Option<Result<SpannedToken<'a>, ParseError>> {
        let result = self.inner.next()?;
        let span = self.inner.span();
        let start = self.offset + span.start;
        let end = self.offset + span.end;

        match result {
            Ok(Token::BlockCommentStart) => match self.scan_block_comment(end) {
                Ok(comment_end) => {
                    self.restart_from(comment_end);
                    self.next_token_internal()
                }
                Err(e) => {
                    self.restart_from(self.source.len());
                    Some(Err(e))
                }
            },

            Ok(Token::DoubleQuote) => match self.scan_string_to_close(end) {
                Ok(string_end) => {
                    self.restart_from(string_end);
                    let span = self.make_span(start, string_end);
                    let text = &self.source[start..string_end];
                    if text.len() > MAX_STRING_LENGTH + 2 {
                        Some(Err(ParseError::StringTooLong {
                            length: text.len() - 2,
                            span,
                        }))
                    } else {
                        Some(Ok(SpannedToken::new(Token::DoubleQuote, span, text)))
                    }
                }
                Err(e) => {
                    self.restart_from(self.source.len());
                    Some(Err(e))
                }
            },

            Ok(token) => {
                let span = self.make_span(start, end);
                let text = &self.source[start..end];
                Some(Ok(SpannedToken::new(token, span, text)))
            }

            Err(()) => {
                let span = self.make_span(start, end);
                Some(Err(ParseError::LexerError { span }))
            }
        }
    }

    /// Scan a block comment; `/* ... */` does not nest.
    fn scan_block_comment(&self, start: usize) -> ParseResult<usize> {
        let bytes = self.source.as_bytes();
        let mut pos = start;

        while pos < bytes.len() {
            match memchr::memchr(b'*', &bytes[pos..]) {
                None => break,
                Some(offset) => {
                    pos += offset;
                    if pos + 1 < bytes.len() && bytes[pos + 1] == b'/' {
                        return Ok(pos + 2);
                    }
                    pos += 1;
                }
            }
        }

        Err(ParseError::UnterminatedBlockComment {
            span: self.make_span(start - 2, self.source.len()),
        })
    }

    /// Scan string content to find the closing quote.
    fn scan_string_to_close(&self, start: usize) -> ParseResult<usize> {
        let bytes = self.source.as_bytes();
        let mut pos = start;

        while pos < bytes.len() {
            match memchr::memchr2(b'\\', b'"', &bytes[pos..]) {
                None => break,
                Some(offset) => {
                    pos += offset;
                    if bytes[pos] == b'\\' && pos + 1 < bytes.len() {
                        pos += 2;
                        continue;
                    }
                    if bytes[pos] == b'"' {
                        return Ok(pos + 1);
                    }
                    pos += 1;
                }
            }
        }

        Err(ParseError::UnterminatedString {
            span: self.make_span(start - 1, self.source.len()),
        })
    }

    /// Restart the inner lexer from a new absolute position.
    fn restart_from(&mut self, pos: usize) {
        self.peeked = None;
        if pos < self.source.len() {
            self.inner = Token::lexer(&self.source[pos..]);
        } else {
            self.inner = Token::lexer("");
        }
        self.offset = pos;
    }

    /// Check if we're at end of input
    pub fn is_eof(&mut self) -> bool {
        self.peek().is_none()
    }

    /// Collect all tokens (for debugging and tests)
    pub fn collect_all(mut self) -> Vec<Result<SpannedToken<'a>, ParseError>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        tokens
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<SpannedToken<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Tokenize source code into a vector of spanned tokens
pub fn tokenize(source: &str) -> Vec<Result<SpannedToken<'_>, ParseError>> {
    Lexer::new(source).collect_all()
}

/// Decode a string literal's text (including its surrounding quotes).
///
/// Recognized escapes are `\n`, `\t`, `\\` and `\"`; any other backslash
/// sequence is kept literally.
pub fn decode_string(text: &str) -> String {
    let inner = &text[1..text.len().saturating_sub(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Parse an integer literal's text, stripping digit separators.
pub fn decode_integer(text: &str) -> Option<i32> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    cleaned.parse::<i32>().ok()
}

/// Parse a float literal's text, stripping digit separators.
pub fn decode_float(text: &str) -> Option<f32> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    cleaned.parse::<f32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokens() {
        let tokens: Vec<_> = tokenize("fn add(a, b) { return a + b; }")
            .into_iter()
            .filter_map(|r| r.ok())
            .map(|t| t.token)
            .collect();

        assert_eq!(
            tokens,
            vec![
                Token::KwFn,
                Token::Identifier,
                Token::LParen,
                Token::Identifier,
                Token::Comma,
                Token::Identifier,
                Token::RParen,
                Token::LBrace,
                Token::KwReturn,
                Token::Identifier,
                Token::Plus,
                Token::Identifier,
                Token::Semicolon,
                Token::RBrace,
            ]
        );
    }

    #[test]
    fn test_string_token_spans_whole_literal() {
        let tokens: Vec<_> = tokenize(r#"var s = "hello";"#)
            .into_iter()
            .filter_map(|r| r.ok())
            .collect();

        assert_eq!(tokens[3].token, Token::DoubleQuote);
        assert_eq!(tokens[3].text, "\"hello\"");
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(decode_string("\"a\\nb\""), "a\nb");
        assert_eq!(decode_string("\"a\\tb\""), "a\tb");
        assert_eq!(decode_string("\"a\\\\b\""), "a\\b");
        assert_eq!(decode_string("\"a\\\"b\""), "a\"b");
        // unknown escapes stay literal
        assert_eq!(decode_string("\"a\\qb\""), "a\\qb");
    }

    #[test]
    fn test_unterminated_string() {
        let results = tokenize("var s = \"oops");
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(ParseError::UnterminatedString { .. }))));
    }

    #[test]
    fn test_block_comment_consumed() {
        let tokens: Vec<_> = tokenize("1 /* comment * with stars */ 2")
            .into_iter()
            .filter_map(|r| r.ok())
            .map(|t| t.token)
            .collect();
        assert_eq!(tokens, vec![Token::IntegerLiteral, Token::IntegerLiteral]);
    }

    #[test]
    fn test_unterminated_block_comment() {
        let results = tokenize("1 /* never closed");
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(ParseError::UnterminatedBlockComment { .. }))));
    }

    #[test]
    fn test_shebang_skipped() {
        let tokens: Vec<_> = tokenize("#!/usr/bin/env xvr\nprint 1;")
            .into_iter()
            .filter_map(|r| r.ok())
            .map(|t| t.token)
            .collect();
        assert_eq!(
            tokens,
            vec![Token::KwPrint, Token::IntegerLiteral, Token::Semicolon]
        );
    }

    #[test]
    fn test_shebang_only_at_start() {
        let results = tokenize("print 1;\n#! not a shebang");
        assert!(results.iter().any(|r| r.is_err()));
    }

    #[test]
    fn test_number_decoding() {
        assert_eq!(decode_integer("1_000_000"), Some(1_000_000));
        assert_eq!(decode_float("3.14"), Some(3.14));
        assert_eq!(decode_float("1_0.2_5"), Some(10.25));
    }

    #[test]
    fn test_line_numbers() {
        let tokens: Vec<_> = tokenize("a\nb\nc")
            .into_iter()
            .filter_map(|r| r.ok())
            .collect();
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[2].span.line, 3);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut lexer = Lexer::new("a b");
        let first = lexer.peek().unwrap().as_ref().unwrap().text;
        assert_eq!(first, "a");
        let first_again = lexer.next_token().unwrap().unwrap().text;
        assert_eq!(first_again, "a");
        let second = lexer.next_token().unwrap().unwrap().text;
        assert_eq!(second, "b");
    }

    #[test]
    fn test_string_too_long() {
        let big = format!("\"{}\"", "x".repeat(MAX_STRING_LENGTH + 1));
        let results = tokenize(&big);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(ParseError::StringTooLong { .. }))));
    }
}
