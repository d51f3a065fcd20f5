//! The Xvr abstract syntax tree
//!
//! Each node owns its children exclusively; dropping a node drops the whole
//! subtree. The tree is fully serializable so hosts can dump it as JSON.

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
    ModuloAssign,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    /// True for `=` and the compound-assignment forms.
    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            BinaryOp::Assign
                | BinaryOp::AddAssign
                | BinaryOp::SubtractAssign
                | BinaryOp::MultiplyAssign
                | BinaryOp::DivideAssign
                | BinaryOp::ModuloAssign
        )
    }
}

/// Unary prefix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// numeric negation `-`
    Negate,
    /// boolean inversion `!`
    Invert,
}

/// A type annotation as written in source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSpec {
    pub kind: TypeKind,
    pub constant: bool,
}

impl TypeSpec {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            constant: false,
        }
    }

    /// The unconstrained type used for untyped declarations.
    pub fn any() -> Self {
        Self::new(TypeKind::Any)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Function,
    Opaque,
    Any,
    /// `[t]`; bare `array` is `[any]`
    Array(Box<TypeSpec>),
    /// `[k:v]`; bare `dictionary` is `[any:any]`
    Dictionary(Box<TypeSpec>, Box<TypeSpec>),
}

/// Literal payloads embedded in the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AstLiteral {
    Null,
    Boolean(bool),
    Integer(i32),
    Float(f32),
    String(String),
    Identifier(String),
}

/// One parameter of a function declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub type_spec: TypeSpec,
}

/// One component of an index expression `a[first:second:third]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexPart {
    /// The component's colon was never written (`a[i]` has an omitted
    /// second and third); single-element semantics at runtime.
    Omitted,
    /// The colon was written but the component left empty (`a[:3]`);
    /// slice-default semantics at runtime.
    Blank,
    Expr(Box<Ast>),
}

/// AST nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Ast {
    /// Produced in panic mode; the compiler refuses trees containing it.
    Error { span: Span },

    Literal { value: AstLiteral },

    Unary {
        op: UnaryOp,
        child: Box<Ast>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Ast>,
        right: Box<Ast>,
    },
    Ternary {
        condition: Box<Ast>,
        then_branch: Box<Ast>,
        else_branch: Box<Ast>,
    },
    Grouping {
        child: Box<Ast>,
    },
    Block {
        statements: Vec<Ast>,
    },
    ArrayLiteral {
        elements: Vec<Ast>,
    },
    DictionaryLiteral {
        pairs: Vec<(Ast, Ast)>,
    },
    Index {
        compound: Box<Ast>,
        first: IndexPart,
        second: IndexPart,
        third: IndexPart,
    },
    Cast {
        child: Box<Ast>,
        target: TypeSpec,
    },
    TypeOf {
        child: Box<Ast>,
    },

    VarDecl {
        name: String,
        type_spec: TypeSpec,
        initializer: Option<Box<Ast>>,
        span: Span,
    },
    FnDecl {
        name: String,
        params: Vec<Param>,
        /// Name of the trailing `...rest` parameter, if any.
        rest: Option<String>,
        returns: Vec<TypeSpec>,
        body: Box<Ast>,
        span: Span,
    },
    FnCall {
        name: String,
        /// `Some` for the method-style `recv.f(...)` form.
        receiver: Option<Box<Ast>>,
        arguments: Vec<Ast>,
    },
    FnReturn {
        values: Vec<Ast>,
    },

    If {
        condition: Box<Ast>,
        then_branch: Box<Ast>,
        else_branch: Option<Box<Ast>>,
    },
    While {
        condition: Box<Ast>,
        body: Box<Ast>,
    },
    For {
        initializer: Box<Ast>,
        condition: Box<Ast>,
        increment: Box<Ast>,
        body: Box<Ast>,
    },
    Break { span: Span },
    Continue { span: Span },

    PrefixIncrement { name: String },
    PrefixDecrement { name: String },
    PostfixIncrement { name: String },
    PostfixDecrement { name: String },

    Print {
        child: Box<Ast>,
    },
    Assert {
        condition: Box<Ast>,
        message: Box<Ast>,
    },
    Import {
        name: String,
        alias: Option<String>,
        span: Span,
    },
    Pass,
}

impl Ast {
    /// True if this node or any of its children is an `Error` node.
    pub fn has_error(&self) -> bool {
        match self {
            Ast::Error { .. } => true,
            Ast::Literal { .. }
            | Ast::Break { .. }
            | Ast::Continue { .. }
            | Ast::PrefixIncrement { .. }
            | Ast::PrefixDecrement { .. }
            | Ast::PostfixIncrement { .. }
            | Ast::PostfixDecrement { .. }
            | Ast::Import { .. }
            | Ast::Pass => false,
            Ast::Unary { child, .. }
            | Ast::Grouping { child }
            | Ast::Cast { child, .. }
            | Ast::TypeOf { child }
            | Ast::Print { child } => child.has_error(),
            Ast::Binary { left, right, .. } => left.has_error() || right.has_error(),
            Ast::Ternary {
                condition,
                then_branch,
                else_branch,
            } => condition.has_error() || then_branch.has_error() || else_branch.has_error(),
            Ast::Block { statements } => statements.iter().any(Ast::has_error),
            Ast::ArrayLiteral { elements } => elements.iter().any(Ast::has_error),
            Ast::DictionaryLiteral { pairs } => {
                pairs.iter().any(|(k, v)| k.has_error() || v.has_error())
            }
            Ast::Index {
                compound,
                first,
                second,
                third,
            } => {
                compound.has_error()
                    || [first, second, third].iter().any(|part| match part {
                        IndexPart::Expr(e) => e.has_error(),
                        _ => false,
                    })
            }
            Ast::VarDecl { initializer, .. } => {
                initializer.as_ref().is_some_and(|init| init.has_error())
            }
            Ast::FnDecl { body, .. } => body.has_error(),
            Ast::FnCall {
                receiver,
                arguments,
                ..
            } => {
                receiver.as_ref().is_some_and(|r| r.has_error())
                    || arguments.iter().any(Ast::has_error)
            }
            Ast::FnReturn { values } => values.iter().any(Ast::has_error),
            Ast::If {
                condition,
                then_branch,
                else_branch,
            } => {
                condition.has_error()
                    || then_branch.has_error()
                    || else_branch.as_ref().is_some_and(|e| e.has_error())
            }
            Ast::While { condition, body } => condition.has_error() || body.has_error(),
            Ast::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                initializer.has_error()
                    || condition.has_error()
                    || increment.has_error()
                    || body.has_error()
            }
            Ast::Assert { condition, message } => condition.has_error() || message.has_error(),
        }
    }

    /// Shorthand for an identifier literal node.
    pub fn identifier(name: impl Into<String>) -> Ast {
        Ast::Literal {
            value: AstLiteral::Identifier(name.into()),
        }
    }

    /// Shorthand for an integer literal node.
    pub fn integer(value: i32) -> Ast {
        Ast::Literal {
            value: AstLiteral::Integer(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_error_walks_subtrees() {
        let clean = Ast::Binary {
            op: BinaryOp::Add,
            left: Box::new(Ast::integer(1)),
            right: Box::new(Ast::integer(2)),
        };
        assert!(!clean.has_error());

        let dirty = Ast::Block {
            statements: vec![
                Ast::Pass,
                Ast::Print {
                    child: Box::new(Ast::Error { span: Span::empty() }),
                },
            ],
        };
        assert!(dirty.has_error());
    }

    #[test]
    fn test_assignment_classification() {
        assert!(BinaryOp::Assign.is_assignment());
        assert!(BinaryOp::ModuloAssign.is_assignment());
        assert!(!BinaryOp::Equal.is_assignment());
    }
}
