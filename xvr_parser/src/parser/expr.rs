//! Expression parsing
//!
//! Precedence climbing over the table in [`crate::token::precedence`]:
//! each token kind resolves to a prefix rule, an infix rule, or both.

use crate::ast::{Ast, AstLiteral, BinaryOp, IndexPart, UnaryOp};
use crate::error::{ParseError, ParseResult};
use crate::lexer;
use crate::token::{Precedence, Token};

use super::Parser;

impl<'a> Parser<'a> {
    /// Parse a full expression.
    pub(super) fn parse_expression(&mut self) -> ParseResult<Ast> {
        self.parse_precedence(Precedence::Assignment)
    }

    fn parse_precedence(&mut self, min: Precedence) -> ParseResult<Ast> {
        let Some(token) = self.current.clone() else {
            return Err(ParseError::unexpected_eof("expression", self.current_span()));
        };

        if !token.token.has_prefix_rule() {
            return Err(ParseError::unexpected_token(
                token.text,
                "expression",
                token.span,
            ));
        }
        self.advance();
        let mut node = self.parse_prefix(&token)?;

        while let Some(current) = self.current.clone() {
            let precedence = current.token.infix_precedence();
            if precedence == Precedence::None || precedence < min {
                break;
            }
            self.advance();
            node = self.parse_infix(node, &current)?;
        }

        Ok(node)
    }

    // ==================== prefix rules ====================

    fn parse_prefix(&mut self, token: &crate::lexer::SpannedToken<'a>) -> ParseResult<Ast> {
        match token.token {
            Token::Null => Ok(Ast::Literal {
                value: AstLiteral::Null,
            }),
            Token::True => Ok(Ast::Literal {
                value: AstLiteral::Boolean(true),
            }),
            Token::False => Ok(Ast::Literal {
                value: AstLiteral::Boolean(false),
            }),
            Token::IntegerLiteral => match lexer::decode_integer(token.text) {
                Some(value) => Ok(Ast::Literal {
                    value: AstLiteral::Integer(value),
                }),
                None => Err(ParseError::InvalidNumber {
                    literal: token.text.to_string(),
                    span: token.span,
                }),
            },
            Token::FloatLiteral => match lexer::decode_float(token.text) {
                Some(value) => Ok(Ast::Literal {
                    value: AstLiteral::Float(value),
                }),
                None => Err(ParseError::InvalidNumber {
                    literal: token.text.to_string(),
                    span: token.span,
                }),
            },
            Token::DoubleQuote => Ok(Ast::Literal {
                value: AstLiteral::String(lexer::decode_string(token.text)),
            }),
            Token::Identifier => Ok(Ast::identifier(token.text)),

            Token::Minus => {
                let child = self.parse_precedence(Precedence::Unary)?;
                // trivial constant folding of negated numeric literals
                match child {
                    Ast::Literal {
                        value: AstLiteral::Integer(i),
                    } => Ok(Ast::Literal {
                        value: AstLiteral::Integer(i.wrapping_neg()),
                    }),
                    Ast::Literal {
                        value: AstLiteral::Float(f),
                    } => Ok(Ast::Literal {
                        value: AstLiteral::Float(-f),
                    }),
                    other => Ok(Ast::Unary {
                        op: UnaryOp::Negate,
                        child: Box::new(other),
                    }),
                }
            }
            Token::Not => {
                let child = self.parse_precedence(Precedence::Unary)?;
                Ok(Ast::Unary {
                    op: UnaryOp::Invert,
                    child: Box::new(child),
                })
            }
            Token::PlusPlus => {
                let name = self.expect_identifier_operand("'++'")?;
                Ok(Ast::PrefixIncrement { name })
            }
            Token::MinusMinus => {
                let name = self.expect_identifier_operand("'--'")?;
                Ok(Ast::PrefixDecrement { name })
            }
            Token::KwTypeof => {
                let child = self.parse_precedence(Precedence::Unary)?;
                Ok(Ast::TypeOf {
                    child: Box::new(child),
                })
            }
            Token::LParen => {
                let child = self.parse_expression()?;
                self.consume(Token::RParen, "')' after expression")?;
                Ok(Ast::Grouping {
                    child: Box::new(child),
                })
            }
            Token::LBracket => self.parse_compound_literal(),

            _ => Err(ParseError::unexpected_token(
                token.text,
                "expression",
                token.span,
            )),
        }
    }

    fn expect_identifier_operand(&mut self, operator: &str) -> ParseResult<String> {
        match &self.current {
            Some(t) if t.token == Token::Identifier => {
                let name = t.text.to_string();
                self.advance();
                Ok(name)
            }
            Some(t) => Err(ParseError::unexpected_token(
                t.text,
                format!("variable name after {operator}"),
                t.span,
            )),
            None => Err(ParseError::unexpected_eof(
                format!("variable name after {operator}"),
                self.current_span(),
            )),
        }
    }

    /// `[a, b, c]`, `[]`, `[k: v, ...]` or `[:]`
    fn parse_compound_literal(&mut self) -> ParseResult<Ast> {
        // empty array
        if self.match_token(Token::RBracket) {
            return Ok(Ast::ArrayLiteral {
                elements: Vec::new(),
            });
        }

        // empty dictionary
        if self.check(Token::Colon) {
            self.advance();
            self.consume(Token::RBracket, "']' after '[:'")?;
            return Ok(Ast::DictionaryLiteral { pairs: Vec::new() });
        }

        let head = self.parse_expression()?;

        if self.match_token(Token::Colon) {
            let value = self.parse_expression()?;
            let mut pairs = vec![(head, value)];
            while self.match_token(Token::Comma) {
                let key = self.parse_expression()?;
                self.consume(Token::Colon, "':' between dictionary key and value")?;
                let value = self.parse_expression()?;
                pairs.push((key, value));
            }
            self.consume(Token::RBracket, "']' after dictionary literal")?;
            Ok(Ast::DictionaryLiteral { pairs })
        } else {
            let mut elements = vec![head];
            while self.match_token(Token::Comma) {
                elements.push(self.parse_expression()?);
            }
            self.consume(Token::RBracket, "']' after array literal")?;
            Ok(Ast::ArrayLiteral { elements })
        }
    }

    // ==================== infix rules ====================

    fn parse_infix(
        &mut self,
        left: Ast,
        token: &crate::lexer::SpannedToken<'a>,
    ) -> ParseResult<Ast> {
        match token.token {
            Token::Plus => self.parse_binary(left, BinaryOp::Add, token.token),
            Token::Minus => self.parse_binary(left, BinaryOp::Subtract, token.token),
            Token::Star => self.parse_binary(left, BinaryOp::Multiply, token.token),
            Token::Slash => self.parse_binary(left, BinaryOp::Divide, token.token),
            Token::Percent => self.parse_binary(left, BinaryOp::Modulo, token.token),
            Token::EqEq => self.parse_binary(left, BinaryOp::Equal, token.token),
            Token::NotEq => self.parse_binary(left, BinaryOp::NotEqual, token.token),
            Token::Lt => self.parse_binary(left, BinaryOp::Less, token.token),
            Token::LtEq => self.parse_binary(left, BinaryOp::LessEqual, token.token),
            Token::Gt => self.parse_binary(left, BinaryOp::Greater, token.token),
            Token::GtEq => self.parse_binary(left, BinaryOp::GreaterEqual, token.token),
            Token::AndAnd => self.parse_binary(left, BinaryOp::And, token.token),
            Token::OrOr => self.parse_binary(left, BinaryOp::Or, token.token),

            Token::Eq => self.parse_assignment(left, BinaryOp::Assign, token),
            Token::PlusEq => self.parse_assignment(left, BinaryOp::AddAssign, token),
            Token::MinusEq => self.parse_assignment(left, BinaryOp::SubtractAssign, token),
            Token::StarEq => self.parse_assignment(left, BinaryOp::MultiplyAssign, token),
            Token::SlashEq => self.parse_assignment(left, BinaryOp::DivideAssign, token),
            Token::PercentEq => self.parse_assignment(left, BinaryOp::ModuloAssign, token),

            Token::Question => {
                let then_branch = self.parse_precedence(Precedence::Ternary)?;
                self.consume(Token::Colon, "':' in ternary expression")?;
                let else_branch = self.parse_precedence(Precedence::Ternary)?;
                Ok(Ast::Ternary {
                    condition: Box::new(left),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                })
            }

            Token::KwAstype => {
                let target = self.parse_type_spec()?;
                Ok(Ast::Cast {
                    child: Box::new(left),
                    target,
                })
            }

            Token::PlusPlus => match left {
                Ast::Literal {
                    value: AstLiteral::Identifier(name),
                } => Ok(Ast::PostfixIncrement { name }),
                _ => Err(ParseError::invalid_syntax(
                    "'++' needs a variable name",
                    token.span,
                )),
            },
            Token::MinusMinus => match left {
                Ast::Literal {
                    value: AstLiteral::Identifier(name),
                } => Ok(Ast::PostfixDecrement { name }),
                _ => Err(ParseError::invalid_syntax(
                    "'--' needs a variable name",
                    token.span,
                )),
            },

            Token::LParen => match left {
                Ast::Literal {
                    value: AstLiteral::Identifier(name),
                } => {
                    let arguments = self.parse_call_arguments()?;
                    Ok(Ast::FnCall {
                        name,
                        receiver: None,
                        arguments,
                    })
                }
                _ => Err(ParseError::invalid_syntax(
                    "only named functions can be called",
                    token.span,
                )),
            },

            Token::Dot => {
                let (name, _) = self.consume_identifier("member name after '.'")?;
                self.consume(Token::LParen, "'(' after member name")?;
                let arguments = self.parse_call_arguments()?;
                Ok(Ast::FnCall {
                    name,
                    receiver: Some(Box::new(left)),
                    arguments,
                })
            }

            Token::LBracket => self.parse_index(left),

            _ => Err(ParseError::unexpected_token(
                token.text,
                "operator",
                token.span,
            )),
        }
    }

    fn parse_binary(&mut self, left: Ast, op: BinaryOp, token: Token) -> ParseResult<Ast> {
        let right = self.parse_precedence(token.infix_precedence().next())?;
        Ok(Ast::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_assignment(
        &mut self,
        left: Ast,
        op: BinaryOp,
        token: &crate::lexer::SpannedToken<'a>,
    ) -> ParseResult<Ast> {
        let assignable = matches!(
            &left,
            Ast::Literal {
                value: AstLiteral::Identifier(_)
            } | Ast::Index { .. }
        );
        if !assignable {
            return Err(ParseError::invalid_syntax(
                "invalid assignment target",
                token.span,
            ));
        }
        // right-associative: same precedence level on the right
        let right = self.parse_precedence(Precedence::Assignment)?;
        Ok(Ast::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_call_arguments(&mut self) -> ParseResult<Vec<Ast>> {
        let mut arguments = Vec::new();
        if !self.check(Token::RParen) {
            arguments.push(self.parse_expression()?);
            while self.match_token(Token::Comma) {
                arguments.push(self.parse_expression()?);
            }
        }
        self.consume(Token::RParen, "')' after arguments")?;
        Ok(arguments)
    }

    /// `compound[first]`, `compound[first:second]`, `compound[first:second:third]`
    /// with any slice component omissible.
    fn parse_index(&mut self, compound: Ast) -> ParseResult<Ast> {
        if self.check(Token::RBracket) {
            return Err(ParseError::invalid_syntax(
                "expected an index expression",
                self.current_span(),
            ));
        }

        let first = if self.check(Token::Colon) {
            IndexPart::Blank
        } else {
            IndexPart::Expr(Box::new(self.parse_expression()?))
        };

        let (second, third) = if self.match_token(Token::Colon) {
            let second = if self.check(Token::Colon) || self.check(Token::RBracket) {
                IndexPart::Blank
            } else {
                IndexPart::Expr(Box::new(self.parse_expression()?))
            };
            let third = if self.match_token(Token::Colon) {
                if self.check(Token::RBracket) {
                    IndexPart::Blank
                } else {
                    IndexPart::Expr(Box::new(self.parse_expression()?))
                }
            } else {
                IndexPart::Omitted
            };
            (second, third)
        } else {
            (IndexPart::Omitted, IndexPart::Omitted)
        };

        self.consume(Token::RBracket, "']' after index")?;
        Ok(Ast::Index {
            compound: Box::new(compound),
            first,
            second,
            third,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn parse_expr(source: &str) -> Ast {
        let (nodes, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors.errors());
        nodes.into_iter().next().expect("one node")
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let node = parse_expr("1 + 2 * 3;");
        match node {
            Ast::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(
                *right,
                Ast::Binary {
                    op: BinaryOp::Multiply,
                    ..
                }
            )),
            other => panic!("expected addition at the root, got {other:?}"),
        }
    }

    #[test]
    fn test_assignment_right_associative() {
        let node = parse_expr("a = b = 1;");
        match node {
            Ast::Binary {
                op: BinaryOp::Assign,
                right,
                ..
            } => assert!(matches!(
                *right,
                Ast::Binary {
                    op: BinaryOp::Assign,
                    ..
                }
            )),
            other => panic!("expected assignment at the root, got {other:?}"),
        }
    }

    #[test]
    fn test_unary_negation_folds_literals() {
        assert_eq!(
            parse_expr("-5;"),
            Ast::Literal {
                value: AstLiteral::Integer(-5)
            }
        );
        assert_eq!(
            parse_expr("-2.5;"),
            Ast::Literal {
                value: AstLiteral::Float(-2.5)
            }
        );
        // non-literals still get the opcode
        assert!(matches!(
            parse_expr("-x;"),
            Ast::Unary {
                op: UnaryOp::Negate,
                ..
            }
        ));
    }

    #[test]
    fn test_ternary() {
        assert!(matches!(parse_expr("a ? 1 : 2;"), Ast::Ternary { .. }));
    }

    #[test]
    fn test_call_and_method_call() {
        let call = parse_expr("add(1, 2);");
        match call {
            Ast::FnCall {
                name,
                receiver,
                arguments,
            } => {
                assert_eq!(name, "add");
                assert!(receiver.is_none());
                assert_eq!(arguments.len(), 2);
            }
            other => panic!("expected call, got {other:?}"),
        }

        let method = parse_expr("list.push(3);");
        match method {
            Ast::FnCall {
                name,
                receiver,
                arguments,
            } => {
                assert_eq!(name, "push");
                assert!(receiver.is_some());
                assert_eq!(arguments.len(), 1);
            }
            other => panic!("expected method call, got {other:?}"),
        }
    }

    #[test]
    fn test_index_shapes() {
        match parse_expr("a[1];") {
            Ast::Index { first, second, third, .. } => {
                assert!(matches!(first, IndexPart::Expr(_)));
                assert!(matches!(second, IndexPart::Omitted));
                assert!(matches!(third, IndexPart::Omitted));
            }
            other => panic!("expected index, got {other:?}"),
        }

        match parse_expr("a[:3];") {
            Ast::Index { first, second, .. } => {
                assert!(matches!(first, IndexPart::Blank));
                assert!(matches!(second, IndexPart::Expr(_)));
            }
            other => panic!("expected index, got {other:?}"),
        }

        match parse_expr("a[::2];") {
            Ast::Index { first, second, third, .. } => {
                assert!(matches!(first, IndexPart::Blank));
                assert!(matches!(second, IndexPart::Blank));
                assert!(matches!(third, IndexPart::Expr(_)));
            }
            other => panic!("expected index, got {other:?}"),
        }
    }

    #[test]
    fn test_compound_literals() {
        assert!(matches!(
            parse_expr("[1, 2, 3];"),
            Ast::ArrayLiteral { .. }
        ));
        assert!(
            matches!(parse_expr("[];"), Ast::ArrayLiteral { elements } if elements.is_empty())
        );
        assert!(
            matches!(parse_expr("[:];"), Ast::DictionaryLiteral { pairs } if pairs.is_empty())
        );
        match parse_expr("[\"one\": 1, \"two\": 2];") {
            Ast::DictionaryLiteral { pairs } => assert_eq!(pairs.len(), 2),
            other => panic!("expected dictionary literal, got {other:?}"),
        }
    }

    #[test]
    fn test_astype_and_typeof() {
        assert!(matches!(parse_expr("1 astype string;"), Ast::Cast { .. }));
        assert!(matches!(parse_expr("typeof x;"), Ast::TypeOf { .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let (_, errors) = parse("1 = 2;");
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_nested_index_assignment_target() {
        let node = parse_expr("a[0][1] = 5;");
        match node {
            Ast::Binary {
                op: BinaryOp::Assign,
                left,
                ..
            } => match *left {
                Ast::Index { compound, .. } => {
                    assert!(matches!(*compound, Ast::Index { .. }))
                }
                other => panic!("expected nested index, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }
}
