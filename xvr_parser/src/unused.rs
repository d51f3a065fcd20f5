//! Unused-declaration checker
//!
//! A post-parse pass that walks the AST with a stack of scopes and warns
//! about variables and functions that were declared but never referenced.
//! Warnings do not block compilation unless the caller decides they should.

use crate::ast::{Ast, IndexPart};

/// One unused-declaration diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedWarning {
    pub name: String,
    pub line: usize,
    pub is_function: bool,
}

impl std::fmt::Display for UnusedWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_function {
            write!(f, "unused procedure '{}' (line {})", self.name, self.line)
        } else {
            write!(f, "unused variable '{}' (line {})", self.name, self.line)
        }
    }
}

#[derive(Debug)]
struct Declaration {
    name: String,
    line: usize,
    used: bool,
    is_function: bool,
}

/// Tracks declarations per lexical scope while walking the tree.
#[derive(Debug, Default)]
pub struct UnusedChecker {
    scopes: Vec<Vec<Declaration>>,
    warnings: Vec<UnusedWarning>,
}

impl UnusedChecker {
    pub fn new() -> Self {
        Self {
            scopes: vec![Vec::new()],
            warnings: Vec::new(),
        }
    }

    /// Walk a whole program and collect warnings.
    pub fn check(nodes: &[Ast]) -> Vec<UnusedWarning> {
        let mut checker = Self::new();
        for node in nodes {
            checker.walk(node);
        }
        checker.finish()
    }

    /// Consume the checker, flushing the root scope.
    pub fn finish(mut self) -> Vec<UnusedWarning> {
        self.pop_scope();
        self.warnings
    }

    /// True if any warning was produced so far.
    pub fn had_warning(&self) -> bool {
        !self.warnings.is_empty()
    }

    fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    fn pop_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            for decl in scope {
                if !decl.used {
                    self.warnings.push(UnusedWarning {
                        name: decl.name,
                        line: decl.line,
                        is_function: decl.is_function,
                    });
                }
            }
        }
    }

    fn declare(&mut self, name: &str, line: usize, is_function: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(Declaration {
                name: name.to_string(),
                line,
                used: false,
                is_function,
            });
        }
    }

    /// Mark the nearest declaration with this name as used.
    fn mark_used(&mut self, name: &str) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(decl) = scope.iter_mut().rev().find(|d| d.name == name) {
                decl.used = true;
                return;
            }
        }
    }

    fn walk_index_part(&mut self, part: &IndexPart) {
        if let IndexPart::Expr(expr) = part {
            self.walk(expr);
        }
    }

    pub fn walk(&mut self, node: &Ast) {
        match node {
            Ast::Error { .. } | Ast::Pass | Ast::Break { .. } | Ast::Continue { .. } => {}

            Ast::Literal { value } => {
                if let crate::ast::AstLiteral::Identifier(name) = value {
                    self.mark_used(name);
                }
            }

            Ast::Unary { child, .. }
            | Ast::Grouping { child }
            | Ast::Cast { child, .. }
            | Ast::TypeOf { child }
            | Ast::Print { child } => self.walk(child),

            Ast::Binary { left, right, .. } => {
                self.walk(left);
                self.walk(right);
            }
            Ast::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.walk(condition);
                self.walk(then_branch);
                self.walk(else_branch);
            }

            Ast::Block { statements } => {
                self.push_scope();
                for statement in statements {
                    self.walk(statement);
                }
                self.pop_scope();
            }

            Ast::ArrayLiteral { elements } => {
                for element in elements {
                    self.walk(element);
                }
            }
            Ast::DictionaryLiteral { pairs } => {
                for (key, value) in pairs {
                    self.walk(key);
                    self.walk(value);
                }
            }
            Ast::Index {
                compound,
                first,
                second,
                third,
            } => {
                self.walk(compound);
                self.walk_index_part(first);
                self.walk_index_part(second);
                self.walk_index_part(third);
            }

            Ast::VarDecl {
                name,
                initializer,
                span,
                ..
            } => {
                if let Some(init) = initializer {
                    self.walk(init);
                }
                self.declare(name, span.line, false);
            }
            Ast::FnDecl {
                name,
                params,
                rest,
                body,
                span,
                ..
            } => {
                self.declare(name, span.line, true);
                self.push_scope();
                for param in params {
                    self.declare(param.name.as_str(), span.line, false);
                }
                if let Some(rest_name) = rest {
                    self.declare(rest_name, span.line, false);
                }
                // the body block would push a second scope; walk its
                // statements directly so parameters share the frame
                match body.as_ref() {
                    Ast::Block { statements } => {
                        for statement in statements {
                            self.walk(statement);
                        }
                    }
                    other => self.walk(other),
                }
                self.pop_scope();
            }
            Ast::FnCall {
                name,
                receiver,
                arguments,
            } => {
                self.mark_used(name);
                if let Some(recv) = receiver {
                    self.walk(recv);
                }
                for argument in arguments {
                    self.walk(argument);
                }
            }
            Ast::FnReturn { values } => {
                for value in values {
                    self.walk(value);
                }
            }

            Ast::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.walk(condition);
                self.walk(then_branch);
                if let Some(else_branch) = else_branch {
                    self.walk(else_branch);
                }
            }
            Ast::While { condition, body } => {
                self.walk(condition);
                self.walk(body);
            }
            Ast::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                self.push_scope();
                self.walk(initializer);
                self.walk(condition);
                self.walk(increment);
                self.walk(body);
                self.pop_scope();
            }

            Ast::PrefixIncrement { name }
            | Ast::PrefixDecrement { name }
            | Ast::PostfixIncrement { name }
            | Ast::PostfixDecrement { name } => self.mark_used(name),

            Ast::Assert { condition, message } => {
                self.walk(condition);
                self.walk(message);
            }
            Ast::Import { alias, name, .. } => {
                // an import binds names supplied by the hook; treat the alias
                // (or module name) as a declaration we cannot track further
                let _ = (alias, name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn warnings_for(source: &str) -> Vec<UnusedWarning> {
        let (nodes, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors.errors());
        UnusedChecker::check(&nodes)
    }

    #[test]
    fn test_unused_variable_warns() {
        let warnings = warnings_for("var x = 1;");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].name, "x");
        assert!(!warnings[0].is_function);
        assert_eq!(warnings[0].line, 1);
    }

    #[test]
    fn test_used_variable_is_silent() {
        let warnings = warnings_for("var x = 1; print x;");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unused_function_warns() {
        let warnings = warnings_for("fn helper() { pass; }");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].is_function);
    }

    #[test]
    fn test_call_marks_function_used() {
        let warnings = warnings_for("fn helper() { pass; } helper();");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_inner_scope_shadowing() {
        // the inner x is used, the outer one is not
        let warnings = warnings_for("var x = 1; { var x = 2; print x; }");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].line, 1);
    }

    #[test]
    fn test_parameters_count_as_declarations() {
        let warnings = warnings_for("fn f(a, b) { return a; } f(1, 2);");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].name, "b");
    }

    #[test]
    fn test_compound_assignment_counts_as_use() {
        let warnings = warnings_for("var x = 0; x += 1;");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_loop_counter_use() {
        let warnings = warnings_for("for (var i = 0; i < 3; i++) { pass; }");
        assert!(warnings.is_empty());
    }
}
