//! Operator precedence for the expression parser

use super::Token;

/// Operator precedence levels, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Precedence {
    None = 0,
    /// `=`, `+=`, `-=`, `*=`, `/=`, `%=` (right associative)
    Assignment,
    /// `?:`
    Ternary,
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==`, `!=`
    Equality,
    /// `<`, `>`, `<=`, `>=`
    Comparison,
    /// `astype`
    Cast,
    /// `+`, `-`
    Term,
    /// `*`, `/`, `%`
    Factor,
    /// prefix `-`, `!`, `++`, `--`, `typeof`
    Unary,
    /// postfix `++`, `--`, call `()`, index `[]`, member `.`
    Call,
    Primary,
}

impl Precedence {
    /// The next-higher level, used for left-associative operators.
    pub fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Ternary,
            Precedence::Ternary => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Cast,
            Precedence::Cast => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

impl Token {
    /// Infix precedence of this token, or `Precedence::None` if it cannot
    /// appear in infix position.
    pub fn infix_precedence(&self) -> Precedence {
        match self {
            Token::Eq
            | Token::PlusEq
            | Token::MinusEq
            | Token::StarEq
            | Token::SlashEq
            | Token::PercentEq => Precedence::Assignment,

            Token::Question => Precedence::Ternary,

            Token::OrOr => Precedence::Or,
            Token::AndAnd => Precedence::And,

            Token::EqEq | Token::NotEq => Precedence::Equality,
            Token::Lt | Token::Gt | Token::LtEq | Token::GtEq => Precedence::Comparison,

            Token::KwAstype => Precedence::Cast,

            Token::Plus | Token::Minus => Precedence::Term,
            Token::Star | Token::Slash | Token::Percent => Precedence::Factor,

            Token::PlusPlus
            | Token::MinusMinus
            | Token::LParen
            | Token::LBracket
            | Token::Dot => Precedence::Call,

            _ => Precedence::None,
        }
    }

    /// True if the token has a prefix parse rule.
    pub fn has_prefix_rule(&self) -> bool {
        matches!(
            self,
            Token::Null
                | Token::True
                | Token::False
                | Token::IntegerLiteral
                | Token::FloatLiteral
                | Token::DoubleQuote
                | Token::Identifier
                | Token::Minus
                | Token::Not
                | Token::PlusPlus
                | Token::MinusMinus
                | Token::KwTypeof
                | Token::LParen
                | Token::LBracket
        )
    }

    /// Only assignment is right-associative.
    pub fn is_right_associative(&self) -> bool {
        self.infix_precedence() == Precedence::Assignment
    }
}
