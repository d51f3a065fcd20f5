//! Recursive-descent parser for Xvr
//!
//! Statements are parsed by dedicated `parse_*` methods; expressions go
//! through the precedence-climbing machinery in [`expr`]. On a syntax
//! error the parser records the diagnostic, enters panic mode, and
//! resynchronizes at the next statement boundary, returning an
//! [`Ast::Error`] node so the caller can refuse to compile.

mod expr;

use crate::ast::{Ast, Param, TypeKind, TypeSpec};
use crate::error::{ParseError, ParseErrors, ParseResult};
use crate::lexer::{Lexer, SpannedToken};
use crate::span::Span;
use crate::token::Token;

/// Xvr parser
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Option<SpannedToken<'a>>,
    previous: Option<SpannedToken<'a>>,
    errors: ParseErrors,
    panic_mode: bool,
}

impl std::fmt::Debug for Parser<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("errors", &self.errors.len())
            .field("panic_mode", &self.panic_mode)
            .finish()
    }
}

/// Parse a whole source text into top-level nodes plus any errors.
pub fn parse(source: &str) -> (Vec<Ast>, ParseErrors) {
    let mut parser = Parser::new(Lexer::new(source));
    let mut nodes = Vec::new();
    while let Some(node) = parser.scan() {
        nodes.push(node);
    }
    (nodes, parser.take_errors())
}

impl<'a> Parser<'a> {
    /// Create a parser over a lexer.
    pub fn new(lexer: Lexer<'a>) -> Self {
        let mut parser = Self {
            lexer,
            current: None,
            previous: None,
            errors: ParseErrors::default(),
            panic_mode: false,
        };
        parser.advance();
        parser
    }

    /// Parse and return the next top-level node, or `None` at end of input.
    pub fn scan(&mut self) -> Option<Ast> {
        self.current.as_ref()?;

        match self.parse_declaration() {
            Ok(node) => Some(node),
            Err(error) => {
                let span = *error.span();
                self.record(error);
                self.synchronize();
                Some(Ast::Error { span })
            }
        }
    }

    /// True once any error has been recorded.
    pub fn had_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Consume the collected errors.
    pub fn take_errors(&mut self) -> ParseErrors {
        std::mem::take(&mut self.errors)
    }

    // ==================== token plumbing ====================

    fn advance(&mut self) {
        self.previous = self.current.take();
        loop {
            match self.lexer.next_token() {
                Some(Ok(token)) => {
                    self.current = Some(token);
                    return;
                }
                Some(Err(error)) => {
                    // record and keep scanning so parsing can recover
                    self.record(error);
                }
                None => {
                    self.current = None;
                    return;
                }
            }
        }
    }

    fn record(&mut self, error: ParseError) {
        self.panic_mode = true;
        self.errors.push(error);
    }

    fn current_span(&self) -> Span {
        match &self.current {
            Some(token) => token.span,
            None => match &self.previous {
                Some(token) => token.span,
                None => Span::empty(),
            },
        }
    }

    fn check(&self, token: Token) -> bool {
        matches!(&self.current, Some(t) if t.token == token)
    }

    fn match_token(&mut self, token: Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, token: Token, expected: &str) -> ParseResult<SpannedToken<'a>> {
        match &self.current {
            Some(t) if t.token == token => {
                let taken = self.current.clone();
                self.advance();
                Ok(taken.expect("checked above"))
            }
            Some(t) => Err(ParseError::unexpected_token(t.text, expected, t.span)),
            None => Err(ParseError::unexpected_eof(expected, self.current_span())),
        }
    }

    fn consume_identifier(&mut self, expected: &str) -> ParseResult<(String, Span)> {
        let token = self.consume(Token::Identifier, expected)?;
        Ok((token.text.to_string(), token.span))
    }

    /// Skip forward to the next statement boundary after an error.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while let Some(token) = &self.current {
            if token.token == Token::Semicolon {
                self.advance();
                return;
            }
            if token.token.starts_statement() {
                return;
            }
            self.advance();
        }
    }

    // ==================== statements ====================

    fn parse_declaration(&mut self) -> ParseResult<Ast> {
        if self.check(Token::KwVar) {
            return self.parse_var_decl();
        }
        if self.check(Token::KwFn) {
            return self.parse_fn_decl();
        }
        self.parse_statement()
    }

    fn parse_statement(&mut self) -> ParseResult<Ast> {
        let Some(token) = &self.current else {
            return Err(ParseError::unexpected_eof("statement", self.current_span()));
        };

        if token.token.is_reserved() {
            return Err(ParseError::ReservedWord {
                word: token.text.to_string(),
                span: token.span,
            });
        }

        match token.token {
            Token::LBrace => self.parse_block(),
            Token::KwAssert => self.parse_assert(),
            Token::KwIf => self.parse_if(),
            Token::KwWhile => self.parse_while(),
            Token::KwFor => self.parse_for(),
            Token::KwBreak => {
                let span = token.span;
                self.advance();
                self.consume(Token::Semicolon, "';' after break")?;
                Ok(Ast::Break { span })
            }
            Token::KwContinue => {
                let span = token.span;
                self.advance();
                self.consume(Token::Semicolon, "';' after continue")?;
                Ok(Ast::Continue { span })
            }
            Token::KwPrint => self.parse_print(),
            Token::KwReturn => self.parse_return(),
            Token::KwImport => self.parse_import(),
            Token::KwPass => {
                self.advance();
                self.consume(Token::Semicolon, "';' after pass")?;
                Ok(Ast::Pass)
            }
            Token::Semicolon => {
                self.advance();
                Ok(Ast::Pass)
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_block(&mut self) -> ParseResult<Ast> {
        self.consume(Token::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(Token::RBrace) {
            if self.current.is_none() {
                return Err(ParseError::unexpected_eof("'}'", self.current_span()));
            }
            statements.push(self.parse_declaration()?);
        }
        self.consume(Token::RBrace, "'}'")?;
        Ok(Ast::Block { statements })
    }

    fn parse_assert(&mut self) -> ParseResult<Ast> {
        self.consume(Token::KwAssert, "'assert'")?;
        let condition = self.parse_expression()?;
        self.consume(Token::Comma, "',' between assert condition and message")?;
        let message = self.parse_expression()?;
        self.consume(Token::Semicolon, "';' after assert")?;
        Ok(Ast::Assert {
            condition: Box::new(condition),
            message: Box::new(message),
        })
    }

    fn parse_print(&mut self) -> ParseResult<Ast> {
        self.consume(Token::KwPrint, "'print'")?;
        let child = self.parse_expression()?;
        self.consume(Token::Semicolon, "';' after print")?;
        Ok(Ast::Print {
            child: Box::new(child),
        })
    }

    fn parse_return(&mut self) -> ParseResult<Ast> {
        self.consume(Token::KwReturn, "'return'")?;
        let mut values = Vec::new();
        if !self.check(Token::Semicolon) {
            values.push(self.parse_expression()?);
            while self.match_token(Token::Comma) {
                values.push(self.parse_expression()?);
            }
        }
        self.consume(Token::Semicolon, "';' after return")?;
        Ok(Ast::FnReturn { values })
    }

    fn parse_import(&mut self) -> ParseResult<Ast> {
        let keyword = self.consume(Token::KwImport, "'import'")?;
        let span = keyword.span;
        let (name, _) = self.consume_identifier("module name after 'import'")?;
        let alias = if self.match_token(Token::KwAs) {
            let (alias, _) = self.consume_identifier("alias after 'as'")?;
            Some(alias)
        } else {
            None
        };
        self.consume(Token::Semicolon, "';' after import")?;
        Ok(Ast::Import { name, alias, span })
    }

    fn parse_if(&mut self) -> ParseResult<Ast> {
        self.consume(Token::KwIf, "'if'")?;
        self.consume(Token::LParen, "'(' after 'if'")?;
        let condition = self.parse_expression()?;
        self.consume(Token::RParen, "')' after condition")?;

        let then_branch = self.parse_body()?;
        let else_branch = if self.match_token(Token::KwElse) {
            Some(Box::new(self.parse_body()?))
        } else {
            None
        };

        Ok(Ast::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch,
        })
    }

    fn parse_while(&mut self) -> ParseResult<Ast> {
        self.consume(Token::KwWhile, "'while'")?;
        self.consume(Token::LParen, "'(' after 'while'")?;
        let condition = self.parse_expression()?;
        self.consume(Token::RParen, "')' after condition")?;
        let body = self.parse_body()?;
        Ok(Ast::While {
            condition: Box::new(condition),
            body: Box::new(body),
        })
    }

    fn parse_for(&mut self) -> ParseResult<Ast> {
        self.consume(Token::KwFor, "'for'")?;
        self.consume(Token::LParen, "'(' after 'for'")?;

        let initializer = if self.match_token(Token::Semicolon) {
            Ast::Pass
        } else if self.check(Token::KwVar) {
            self.parse_var_decl()?
        } else {
            self.parse_expression_statement()?
        };

        let condition = self.parse_expression()?;
        self.consume(Token::Semicolon, "';' after loop condition")?;

        let increment = if self.check(Token::RParen) {
            Ast::Pass
        } else {
            self.parse_expression()?
        };
        self.consume(Token::RParen, "')' after for clauses")?;

        let body = self.parse_body()?;
        Ok(Ast::For {
            initializer: Box::new(initializer),
            condition: Box::new(condition),
            increment: Box::new(increment),
            body: Box::new(body),
        })
    }

    /// Parse a control-flow body, rejecting `{}` (use `pass`).
    fn parse_body(&mut self) -> ParseResult<Ast> {
        let span = self.current_span();
        let body = self.parse_statement()?;
        if matches!(&body, Ast::Block { statements } if statements.is_empty()) {
            return Err(ParseError::EmptyBody { span });
        }
        Ok(body)
    }

    fn parse_var_decl(&mut self) -> ParseResult<Ast> {
        let keyword = self.consume(Token::KwVar, "'var'")?;
        let span = keyword.span;
        let (name, _) = self.consume_identifier("variable name after 'var'")?;

        let type_spec = if self.match_token(Token::Colon) {
            let mut spec = self.parse_type_spec()?;
            if self.match_token(Token::KwConst) {
                spec.constant = true;
            }
            spec
        } else {
            TypeSpec::any()
        };

        let initializer = if self.match_token(Token::Eq) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        self.consume(Token::Semicolon, "';' after variable declaration")?;

        Ok(Ast::VarDecl {
            name,
            type_spec,
            initializer,
            span,
        })
    }

    fn parse_fn_decl(&mut self) -> ParseResult<Ast> {
        let keyword = self.consume(Token::KwFn, "'fn'")?;
        let span = keyword.span;
        let (name, _) = self.consume_identifier("function name after 'fn'")?;

        self.consume(Token::LParen, "'(' after function name")?;
        let mut params = Vec::new();
        let mut rest = None;
        if !self.check(Token::RParen) {
            loop {
                if self.match_token(Token::Ellipsis) {
                    let (rest_name, rest_span) = self.consume_identifier("rest parameter name")?;
                    if rest.is_some() {
                        return Err(ParseError::invalid_syntax(
                            "only one rest parameter is allowed",
                            rest_span,
                        ));
                    }
                    rest = Some(rest_name);
                    // rest must be last
                    if self.check(Token::Comma) {
                        return Err(ParseError::invalid_syntax(
                            "rest parameter must be the final parameter",
                            rest_span,
                        ));
                    }
                } else {
                    let (param_name, _) = self.consume_identifier("parameter name")?;
                    let type_spec = if self.match_token(Token::Colon) {
                        self.parse_type_spec()?
                    } else {
                        TypeSpec::any()
                    };
                    params.push(Param {
                        name: param_name,
                        type_spec,
                    });
                }
                if !self.match_token(Token::Comma) {
                    break;
                }
            }
        }
        self.consume(Token::RParen, "')' after parameters")?;

        let mut returns = Vec::new();
        if self.match_token(Token::Arrow) {
            returns.push(self.parse_type_spec()?);
        }

        let body = self.parse_block()?;

        Ok(Ast::FnDecl {
            name,
            params,
            rest,
            returns,
            body: Box::new(body),
            span,
        })
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Ast> {
        let expr = self.parse_expression()?;
        self.consume(Token::Semicolon, "';' after expression")?;
        Ok(expr)
    }

    // ==================== types ====================

    fn parse_type_spec(&mut self) -> ParseResult<TypeSpec> {
        let Some(token) = self.current.clone() else {
            return Err(ParseError::unexpected_eof("type", self.current_span()));
        };

        let kind = match token.token {
            Token::Null => {
                self.advance();
                TypeKind::Null
            }
            Token::TypeBool => {
                self.advance();
                TypeKind::Bool
            }
            Token::TypeInt => {
                self.advance();
                TypeKind::Int
            }
            Token::TypeFloat => {
                self.advance();
                TypeKind::Float
            }
            Token::TypeString => {
                self.advance();
                TypeKind::String
            }
            Token::TypeOpaque => {
                self.advance();
                TypeKind::Opaque
            }
            Token::TypeAny => {
                self.advance();
                TypeKind::Any
            }
            Token::KwFn => {
                self.advance();
                TypeKind::Function
            }
            Token::TypeArray => {
                self.advance();
                TypeKind::Array(Box::new(TypeSpec::any()))
            }
            Token::TypeDictionary => {
                self.advance();
                TypeKind::Dictionary(Box::new(TypeSpec::any()), Box::new(TypeSpec::any()))
            }
            Token::LBracket => {
                self.advance();
                let element = self.parse_type_spec()?;
                if self.match_token(Token::Colon) {
                    let value = self.parse_type_spec()?;
                    self.consume(Token::RBracket, "']' after dictionary type")?;
                    TypeKind::Dictionary(Box::new(element), Box::new(value))
                } else {
                    self.consume(Token::RBracket, "']' after array type")?;
                    TypeKind::Array(Box::new(element))
                }
            }
            _ => {
                return Err(ParseError::unexpected_token(
                    token.text,
                    "type",
                    token.span,
                ))
            }
        };

        Ok(TypeSpec::new(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstLiteral, BinaryOp};

    fn parse_one(source: &str) -> Ast {
        let (nodes, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors.errors());
        assert_eq!(nodes.len(), 1, "expected one node, got {nodes:?}");
        nodes.into_iter().next().expect("one node")
    }

    #[test]
    fn test_var_decl_with_type_and_const() {
        let node = parse_one("var x: int const = 5;");
        match node {
            Ast::VarDecl {
                name,
                type_spec,
                initializer,
                ..
            } => {
                assert_eq!(name, "x");
                assert_eq!(type_spec.kind, TypeKind::Int);
                assert!(type_spec.constant);
                assert!(initializer.is_some());
            }
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn test_var_decl_untyped() {
        let node = parse_one("var x = 1;");
        match node {
            Ast::VarDecl { type_spec, .. } => assert_eq!(type_spec.kind, TypeKind::Any),
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn test_compound_type_annotations() {
        let node = parse_one("var a: [int] = [];");
        match node {
            Ast::VarDecl { type_spec, .. } => match type_spec.kind {
                TypeKind::Array(element) => assert_eq!(element.kind, TypeKind::Int),
                other => panic!("expected array type, got {other:?}"),
            },
            other => panic!("expected var decl, got {other:?}"),
        }

        let node = parse_one("var d: [string:int] = [:];");
        match node {
            Ast::VarDecl { type_spec, .. } => match type_spec.kind {
                TypeKind::Dictionary(key, value) => {
                    assert_eq!(key.kind, TypeKind::String);
                    assert_eq!(value.kind, TypeKind::Int);
                }
                other => panic!("expected dictionary type, got {other:?}"),
            },
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn test_fn_decl() {
        let node = parse_one("fn add(a: int, b: int) -> int { return a + b; }");
        match node {
            Ast::FnDecl {
                name,
                params,
                rest,
                returns,
                ..
            } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
                assert_eq!(params[0].name, "a");
                assert!(rest.is_none());
                assert_eq!(returns.len(), 1);
                assert_eq!(returns[0].kind, TypeKind::Int);
            }
            other => panic!("expected fn decl, got {other:?}"),
        }
    }

    #[test]
    fn test_fn_decl_rest_param() {
        let node = parse_one("fn gather(first, ...others) { pass; }");
        match node {
            Ast::FnDecl { params, rest, .. } => {
                assert_eq!(params.len(), 1);
                assert_eq!(rest.as_deref(), Some("others"));
            }
            other => panic!("expected fn decl, got {other:?}"),
        }
    }

    #[test]
    fn test_rest_param_must_be_last() {
        let (_, errors) = parse("fn bad(...rest, a) { pass; }");
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_if_else() {
        let node = parse_one("if (x < 10) { print x; } else { pass; }");
        match node {
            Ast::If { else_branch, .. } => assert!(else_branch.is_some()),
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_body_rejected() {
        let (_, errors) = parse("while (true) {}");
        assert!(errors
            .iter()
            .any(|e| matches!(e, ParseError::EmptyBody { .. })));
    }

    #[test]
    fn test_for_loop() {
        let node = parse_one("for (var i = 0; i < 10; i++) { print i; }");
        match node {
            Ast::For {
                initializer,
                condition,
                increment,
                ..
            } => {
                assert!(matches!(*initializer, Ast::VarDecl { .. }));
                assert!(matches!(*condition, Ast::Binary { op: BinaryOp::Less, .. }));
                assert!(matches!(*increment, Ast::PostfixIncrement { .. }));
            }
            other => panic!("expected for, got {other:?}"),
        }
    }

    #[test]
    fn test_import_with_alias() {
        let node = parse_one("import standard as std;");
        match node {
            Ast::Import { name, alias, .. } => {
                assert_eq!(name, "standard");
                assert_eq!(alias.as_deref(), Some("std"));
            }
            other => panic!("expected import, got {other:?}"),
        }
    }

    #[test]
    fn test_assert_statement() {
        let node = parse_one("assert x == 1, \"x should be one\";");
        match node {
            Ast::Assert { message, .. } => match *message {
                Ast::Literal {
                    value: AstLiteral::String(s),
                } => assert_eq!(s, "x should be one"),
                other => panic!("expected string message, got {other:?}"),
            },
            other => panic!("expected assert, got {other:?}"),
        }
    }

    #[test]
    fn test_reserved_word_rejected() {
        let (_, errors) = parse("class Foo {}");
        assert!(errors
            .iter()
            .any(|e| matches!(e, ParseError::ReservedWord { .. })));
    }

    #[test]
    fn test_error_recovery_continues() {
        let (nodes, errors) = parse("var = 1; print 2;");
        assert!(!errors.is_empty());
        // parser resynchronized and still parsed the print statement
        assert!(nodes.iter().any(|n| matches!(n, Ast::Print { .. })));
        assert!(nodes.iter().any(|n| matches!(n, Ast::Error { .. })));
    }

    #[test]
    fn test_bare_semicolon_is_pass() {
        let node = parse_one(";");
        assert_eq!(node, Ast::Pass);
    }
}
