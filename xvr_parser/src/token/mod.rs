//! Token definitions for the Xvr lexer

mod precedence;

use logos::Logos;
use serde::{Deserialize, Serialize};

pub use precedence::Precedence;

/// Xvr tokens
///
/// Keywords are matched before identifiers by the logos DFA, which plays
/// the role of the classic keyword-table lookup.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // ==================== Type keywords ====================
    #[token("null")]
    Null,
    #[token("bool")]
    TypeBool,
    #[token("int")]
    TypeInt,
    #[token("float")]
    TypeFloat,
    #[token("string")]
    TypeString,
    #[token("array")]
    TypeArray,
    #[token("dictionary")]
    TypeDictionary,
    #[token("opaque")]
    TypeOpaque,
    #[token("any")]
    TypeAny,

    // ==================== Keywords and reserved words ====================
    #[token("as")]
    KwAs,
    #[token("assert")]
    KwAssert,
    #[token("break")]
    KwBreak,
    #[token("class")]
    KwClass,
    #[token("const")]
    KwConst,
    #[token("continue")]
    KwContinue,
    #[token("do")]
    KwDo,
    #[token("else")]
    KwElse,
    #[token("export")]
    KwExport,
    #[token("fn")]
    KwFn,
    #[token("for")]
    KwFor,
    #[token("foreach")]
    KwForeach,
    #[token("if")]
    KwIf,
    #[token("import")]
    KwImport,
    #[token("in")]
    KwIn,
    #[token("of")]
    KwOf,
    #[token("pass")]
    KwPass,
    #[token("print")]
    KwPrint,
    #[token("return")]
    KwReturn,
    #[token("type")]
    KwType,
    #[token("astype")]
    KwAstype,
    #[token("typeof")]
    KwTypeof,
    #[token("var")]
    KwVar,
    #[token("while")]
    KwWhile,

    // ==================== Boolean literals ====================
    #[token("true")]
    True,
    #[token("false")]
    False,

    // ==================== Literals ====================
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,
    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*")]
    FloatLiteral,
    #[regex(r"[0-9][0-9_]*")]
    IntegerLiteral,
    /// Opening quote of a string literal; the content is scanned by the
    /// lexer wrapper so escapes never confuse the DFA.
    #[token("\"")]
    DoubleQuote,
    /// Opening of a block comment, scanned to its close by the wrapper.
    #[token("/*")]
    BlockCommentStart,

    // ==================== Math operators ====================
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("=")]
    Eq,

    // ==================== Logical operators ====================
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("!")]
    Not,
    #[token("!=")]
    NotEq,
    #[token("==")]
    EqEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,

    // ==================== Other operators ====================
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,
    #[token("->")]
    Arrow,
}

impl Token {
    /// True for tokens that may begin a statement; used by panic-mode
    /// recovery to find a synchronization point.
    pub fn starts_statement(&self) -> bool {
        matches!(
            self,
            Token::Semicolon
                | Token::RBrace
                | Token::LBrace
                | Token::KwAssert
                | Token::KwBreak
                | Token::KwContinue
                | Token::KwFn
                | Token::KwFor
                | Token::KwIf
                | Token::KwImport
                | Token::KwPass
                | Token::KwPrint
                | Token::KwReturn
                | Token::KwVar
                | Token::KwWhile
        )
    }

    /// True for the reserved words that are recognized but have no grammar
    /// production yet.
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            Token::KwAs
                | Token::KwClass
                | Token::KwDo
                | Token::KwExport
                | Token::KwForeach
                | Token::KwIn
                | Token::KwOf
                | Token::KwType
        )
    }

    /// True for tokens that name a type in annotation position.
    pub fn is_type_name(&self) -> bool {
        matches!(
            self,
            Token::Null
                | Token::TypeBool
                | Token::TypeInt
                | Token::TypeFloat
                | Token::TypeString
                | Token::TypeArray
                | Token::TypeDictionary
                | Token::TypeOpaque
                | Token::TypeAny
                | Token::KwFn
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        crate::lexer::tokenize(source)
            .into_iter()
            .filter_map(|r| r.ok())
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_keywords_beat_identifiers() {
        assert_eq!(
            kinds("var x fn while"),
            vec![Token::KwVar, Token::Identifier, Token::KwFn, Token::KwWhile]
        );
    }

    #[test]
    fn test_greedy_two_char_operators() {
        assert_eq!(
            kinds("+ += ++ = == ! != < <="),
            vec![
                Token::Plus,
                Token::PlusEq,
                Token::PlusPlus,
                Token::Eq,
                Token::EqEq,
                Token::Not,
                Token::NotEq,
                Token::Lt,
                Token::LtEq,
            ]
        );
    }

    #[test]
    fn test_ellipsis() {
        assert_eq!(kinds("...rest"), vec![Token::Ellipsis, Token::Identifier]);
    }

    #[test]
    fn test_number_shapes() {
        assert_eq!(
            kinds("1 1_000 3.14 1_0.5_0"),
            vec![
                Token::IntegerLiteral,
                Token::IntegerLiteral,
                Token::FloatLiteral,
                Token::FloatLiteral,
            ]
        );
    }

    #[test]
    fn test_ampersand_alone_is_an_error() {
        let results = crate::lexer::tokenize("a & b");
        assert!(results.iter().any(|r| r.is_err()));
    }
}
