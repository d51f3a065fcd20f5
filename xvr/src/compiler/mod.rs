//! Single-pass bytecode compiler
//!
//! Walks the AST and appends opcodes to a growable byte buffer while
//! filling the literal pool. Forward control flow is resolved by
//! back-patching; `break`/`continue` collect their jump sites in a loop
//! frame that the surrounding loop patches when it closes. Nested
//! function declarations run a child compiler whose headerless image is
//! stored in the parent's function section.

mod pool;

pub use pool::PoolEntry;

use xvr_parser::ast::{Ast, AstLiteral, BinaryOp, IndexPart, TypeKind, TypeSpec, UnaryOp};

use crate::bytecode;
use crate::opcode::Opcode;
use crate::value::ValueTag;

/// Hard limits of the image format.
pub const MAX_LITERALS: usize = u16::MAX as usize;
pub const MAX_FUNCTIONS: usize = u16::MAX as usize;
pub const MAX_FUNCTION_BYTES: usize = u16::MAX as usize;

/// Compilation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The tree still carries a parse-error node.
    ErrorNode,
    /// Literal pool exceeded 2^16 entries.
    TooManyLiterals,
    /// Function section exceeded 2^16 entries.
    TooManyFunctions,
    /// A function sub-image exceeded 2^16 bytes.
    FunctionTooLarge,
    /// The code section outgrew the 16-bit jump space.
    CodeTooLarge,
    /// Array/dictionary literals may only contain literals, identifiers,
    /// and nested compounds.
    BadCompoundSubtree,
    /// `break` or `continue` outside a loop.
    StrayLoopJump,
    /// A nested function failed to compile.
    NestedFunction(Box<CompileError>),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ErrorNode => write!(f, "cannot compile a tree containing parse errors"),
            Self::TooManyLiterals => write!(f, "too many literals (limit {MAX_LITERALS})"),
            Self::TooManyFunctions => write!(f, "too many functions (limit {MAX_FUNCTIONS})"),
            Self::FunctionTooLarge => {
                write!(f, "function bytecode too large (limit {MAX_FUNCTION_BYTES} bytes)")
            }
            Self::CodeTooLarge => write!(f, "code section outgrew the 16-bit jump space"),
            Self::BadCompoundSubtree => {
                write!(f, "bad subtree for compound literal")
            }
            Self::StrayLoopJump => write!(f, "break/continue outside of a loop"),
            Self::NestedFunction(inner) => write!(f, "in nested function: {inner}"),
        }
    }
}

impl std::error::Error for CompileError {}

/// Pending `break`/`continue` sites of the innermost loops.
#[derive(Debug, Default)]
struct LoopFrame {
    breaks: Vec<usize>,
    continues: Vec<usize>,
    /// Scope depth the break target executes at.
    break_depth: usize,
    /// Scope depth the continue target executes at.
    continue_depth: usize,
}

/// The bytecode compiler.
#[derive(Debug, Default)]
pub struct Compiler {
    pool: Vec<PoolEntry>,
    code: Vec<u8>,
    functions: Vec<Vec<u8>>,
    loops: Vec<LoopFrame>,
    /// Lexical scope depth at the current emission point.
    scope_depth: usize,
    /// Bytes of code-section prelude the interpreter consumes before it
    /// fixes its code-start pointer (the two collection indices of a
    /// function sub-image). Jump targets are relative to that point.
    code_offset: usize,
    panic: bool,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    fn function_body() -> Self {
        Self {
            code_offset: 4,
            ..Self::default()
        }
    }

    /// True after any `write` failed; `collate` refuses a panicked
    /// compiler.
    pub fn panicked(&self) -> bool {
        self.panic
    }

    /// Append bytecode for one top-level node, taking ownership of it.
    pub fn write(&mut self, node: Ast) -> Result<(), CompileError> {
        if node.has_error() {
            self.panic = true;
            return Err(CompileError::ErrorNode);
        }
        match self.compile_node(node) {
            Ok(()) => Ok(()),
            Err(error) => {
                self.panic = true;
                Err(error)
            }
        }
    }

    /// Finalize the full image: header, literal pool, function section,
    /// code. The compiler can keep accepting nodes afterwards.
    pub fn collate(&self) -> Result<Vec<u8>, CompileError> {
        if self.panic {
            return Err(CompileError::ErrorNode);
        }
        let mut image = Vec::new();
        bytecode::write_header(&mut image);
        self.collate_body(&mut image)?;
        Ok(image)
    }

    /// The headerless form used for function sub-images.
    fn collate_headerless(&self) -> Result<Vec<u8>, CompileError> {
        let mut image = Vec::new();
        self.collate_body(&mut image)?;
        Ok(image)
    }

    fn collate_body(&self, out: &mut Vec<u8>) -> Result<(), CompileError> {
        if self.code.len() > u16::MAX as usize {
            return Err(CompileError::CodeTooLarge);
        }

        // literal pool
        out.extend_from_slice(&(self.pool.len() as u16).to_le_bytes());
        for entry in &self.pool {
            write_pool_entry(out, entry);
        }
        out.push(Opcode::SectionEnd as u8);

        // function section
        let mut blob = Vec::new();
        for function in &self.functions {
            let length = function.len() + 1;
            if length > MAX_FUNCTION_BYTES {
                return Err(CompileError::FunctionTooLarge);
            }
            blob.extend_from_slice(&(length as u16).to_le_bytes());
            blob.extend_from_slice(function);
            blob.push(Opcode::FnEnd as u8);
        }
        if blob.len() > u16::MAX as usize {
            return Err(CompileError::FunctionTooLarge);
        }
        out.extend_from_slice(&(self.functions.len() as u16).to_le_bytes());
        out.extend_from_slice(&(blob.len() as u16).to_le_bytes());
        out.extend_from_slice(&blob);
        out.push(Opcode::SectionEnd as u8);

        // code section
        out.extend_from_slice(&self.code);
        out.push(Opcode::SectionEnd as u8);
        out.push(Opcode::Eof as u8);
        Ok(())
    }

    // ==================== emission helpers ====================

    fn emit_op(&mut self, opcode: Opcode) {
        self.code.push(opcode as u8);
    }

    fn emit_u8(&mut self, byte: u8) {
        self.code.push(byte);
    }

    fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Current jump-target address (relative to the interpreter's
    /// code-start pointer).
    fn here(&self) -> Result<u16, CompileError> {
        let position = self.code.len().saturating_sub(self.code_offset);
        u16::try_from(position).map_err(|_| CompileError::CodeTooLarge)
    }

    /// Emit a jump opcode with a placeholder target; returns the patch
    /// site.
    fn emit_jump(&mut self, opcode: Opcode) -> usize {
        self.emit_op(opcode);
        let site = self.code.len();
        self.emit_u16(u16::MAX);
        site
    }

    fn patch_jump(&mut self, site: usize) -> Result<(), CompileError> {
        let target = self.here()?;
        self.code[site..site + 2].copy_from_slice(&target.to_le_bytes());
        Ok(())
    }

    fn patch_jump_to(&mut self, site: usize, target: u16) {
        self.code[site..site + 2].copy_from_slice(&target.to_le_bytes());
    }

    fn add_entry(&mut self, entry: PoolEntry) -> Result<u16, CompileError> {
        if entry.dedupable() {
            if let Some(index) = self.pool.iter().position(|e| *e == entry) {
                return Ok(index as u16);
            }
        }
        if self.pool.len() >= MAX_LITERALS {
            return Err(CompileError::TooManyLiterals);
        }
        self.pool.push(entry);
        Ok((self.pool.len() - 1) as u16)
    }

    /// Emit a push of pool entry `index`.
    fn emit_literal_index(&mut self, index: u16) {
        if index < 256 {
            self.emit_op(Opcode::Literal);
            self.emit_u8(index as u8);
        } else {
            self.emit_op(Opcode::LiteralLong);
            self.emit_u16(index);
        }
    }

    fn literal_entry(&mut self, literal: &AstLiteral) -> Result<u16, CompileError> {
        let entry = match literal {
            AstLiteral::Null => PoolEntry::Null,
            AstLiteral::Boolean(b) => PoolEntry::Boolean(*b),
            AstLiteral::Integer(i) => PoolEntry::Integer(*i),
            AstLiteral::Float(f) => PoolEntry::Float(f.to_bits()),
            AstLiteral::String(s) => PoolEntry::String(s.clone().into_bytes()),
            AstLiteral::Identifier(name) => PoolEntry::Identifier(name.clone().into_bytes()),
        };
        self.add_entry(entry)
    }

    fn identifier_entry(&mut self, name: &str) -> Result<u16, CompileError> {
        self.add_entry(PoolEntry::Identifier(name.as_bytes().to_vec()))
    }

    fn push_literal(&mut self, literal: &AstLiteral) -> Result<(), CompileError> {
        let index = self.literal_entry(literal)?;
        self.emit_literal_index(index);
        Ok(())
    }

    fn push_identifier(&mut self, name: &str) -> Result<(), CompileError> {
        let index = self.identifier_entry(name)?;
        self.emit_literal_index(index);
        Ok(())
    }

    fn push_integer(&mut self, value: i32) -> Result<(), CompileError> {
        let index = self.add_entry(PoolEntry::Integer(value))?;
        self.emit_literal_index(index);
        Ok(())
    }

    fn push_null(&mut self) -> Result<(), CompileError> {
        let index = self.add_entry(PoolEntry::Null)?;
        self.emit_literal_index(index);
        Ok(())
    }

    /// Intern a type annotation, subtypes first.
    fn type_entry(&mut self, spec: &TypeSpec) -> Result<u16, CompileError> {
        let (tag, subtypes) = match &spec.kind {
            TypeKind::Null => (ValueTag::Null, Vec::new()),
            TypeKind::Bool => (ValueTag::Boolean, Vec::new()),
            TypeKind::Int => (ValueTag::Integer, Vec::new()),
            TypeKind::Float => (ValueTag::Float, Vec::new()),
            TypeKind::String => (ValueTag::String, Vec::new()),
            TypeKind::Function => (ValueTag::Function, Vec::new()),
            TypeKind::Opaque => (ValueTag::Opaque, Vec::new()),
            TypeKind::Any => (ValueTag::Any, Vec::new()),
            TypeKind::Array(element) => {
                let element_index = self.type_entry(element)?;
                (ValueTag::Array, vec![element_index])
            }
            TypeKind::Dictionary(key, value) => {
                let key_index = self.type_entry(key)?;
                let value_index = self.type_entry(value)?;
                (ValueTag::Dictionary, vec![key_index, value_index])
            }
        };
        self.add_entry(PoolEntry::Type {
            tag,
            constant: spec.constant,
            subtypes,
        })
    }

    /// Intern a compound literal. Elements must themselves be literals,
    /// identifiers, or nested compounds; the values are resolved when the
    /// image loads.
    fn compound_entry(&mut self, node: &Ast) -> Result<u16, CompileError> {
        match node {
            Ast::Literal { value } => self.literal_entry(value),
            Ast::ArrayLiteral { elements } => {
                let mut indices = Vec::with_capacity(elements.len());
                for element in elements {
                    indices.push(self.compound_entry(element)?);
                }
                self.add_entry(PoolEntry::Array(indices))
            }
            Ast::DictionaryLiteral { pairs } => {
                let mut indices = Vec::with_capacity(pairs.len() * 2);
                for (key, value) in pairs {
                    indices.push(self.compound_entry(key)?);
                    indices.push(self.compound_entry(value)?);
                }
                self.add_entry(PoolEntry::Dictionary(indices))
            }
            _ => Err(CompileError::BadCompoundSubtree),
        }
    }

    // ==================== node compilation ====================

    fn compile_node(&mut self, node: Ast) -> Result<(), CompileError> {
        match node {
            Ast::Error { .. } => Err(CompileError::ErrorNode),

            Ast::Pass => {
                self.emit_op(Opcode::Pass);
                Ok(())
            }

            Ast::Literal { value } => self.push_literal(&value),

            Ast::Unary { op, child } => {
                self.compile_node(*child)?;
                self.emit_op(match op {
                    UnaryOp::Negate => Opcode::Negate,
                    UnaryOp::Invert => Opcode::Invert,
                });
                Ok(())
            }

            Ast::Binary { op, left, right } => self.compile_binary(op, *left, *right),

            Ast::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_node(*condition)?;
                let to_else = self.emit_jump(Opcode::IfFalseJump);
                self.compile_node(*then_branch)?;
                let to_end = self.emit_jump(Opcode::Jump);
                self.patch_jump(to_else)?;
                self.compile_node(*else_branch)?;
                self.patch_jump(to_end)
            }

            Ast::Grouping { child } => {
                self.emit_op(Opcode::GroupingBegin);
                self.compile_node(*child)?;
                self.emit_op(Opcode::GroupingEnd);
                Ok(())
            }

            Ast::Block { statements } => {
                self.emit_op(Opcode::ScopeBegin);
                self.scope_depth += 1;
                for statement in statements {
                    self.compile_node(statement)?;
                }
                self.scope_depth -= 1;
                self.emit_op(Opcode::ScopeEnd);
                Ok(())
            }

            node @ (Ast::ArrayLiteral { .. } | Ast::DictionaryLiteral { .. }) => {
                let index = self.compound_entry(&node)?;
                self.emit_literal_index(index);
                Ok(())
            }

            Ast::Index {
                compound,
                first,
                second,
                third,
            } => {
                self.compile_node(*compound)?;
                self.compile_index_part(first)?;
                self.compile_index_part(second)?;
                self.compile_index_part(third)?;
                self.emit_op(Opcode::Index);
                Ok(())
            }

            Ast::Cast { child, target } => {
                let type_index = self.type_entry(&target)?;
                self.emit_literal_index(type_index);
                self.compile_node(*child)?;
                self.emit_op(Opcode::TypeCast);
                Ok(())
            }

            Ast::TypeOf { child } => {
                self.compile_node(*child)?;
                self.emit_op(Opcode::TypeOf);
                Ok(())
            }

            Ast::VarDecl {
                name,
                type_spec,
                initializer,
                ..
            } => {
                match initializer {
                    Some(init) => self.compile_node(*init)?,
                    None => self.push_null()?,
                }
                let identifier_index = self.identifier_entry(&name)?;
                let type_index = self.type_entry(&type_spec)?;
                if identifier_index >= 256 || type_index >= 256 {
                    self.emit_op(Opcode::VarDeclLong);
                    self.emit_u16(identifier_index);
                    self.emit_u16(type_index);
                } else {
                    self.emit_op(Opcode::VarDecl);
                    self.emit_u8(identifier_index as u8);
                    self.emit_u8(type_index as u8);
                }
                Ok(())
            }

            Ast::FnDecl {
                name,
                params,
                rest,
                returns,
                body,
                ..
            } => self.compile_fn_decl(&name, params, rest, returns, *body),

            Ast::FnCall {
                name,
                receiver,
                arguments,
            } => self.compile_fn_call(&name, receiver, arguments),

            Ast::FnReturn { values } => {
                for value in values {
                    self.compile_node(value)?;
                }
                self.emit_op(Opcode::FnReturn);
                Ok(())
            }

            Ast::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_node(*condition)?;
                let to_else = self.emit_jump(Opcode::IfFalseJump);
                self.compile_node(*then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let to_end = self.emit_jump(Opcode::Jump);
                        self.patch_jump(to_else)?;
                        self.compile_node(*else_branch)?;
                        self.patch_jump(to_end)
                    }
                    None => self.patch_jump(to_else),
                }
            }

            Ast::While { condition, body } => {
                let start = self.here()?;
                self.compile_node(*condition)?;
                let to_exit = self.emit_jump(Opcode::IfFalseJump);

                self.loops.push(LoopFrame {
                    break_depth: self.scope_depth,
                    continue_depth: self.scope_depth,
                    ..LoopFrame::default()
                });
                self.compile_node(*body)?;
                self.emit_op(Opcode::Jump);
                self.emit_u16(start);

                self.patch_jump(to_exit)?;
                let frame = self.loops.pop().expect("loop frame pushed above");
                let end = self.here()?;
                for site in frame.breaks {
                    self.patch_jump_to(site, end);
                }
                for site in frame.continues {
                    self.patch_jump_to(site, start);
                }
                self.emit_op(Opcode::PopStack);
                Ok(())
            }

            Ast::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                self.emit_op(Opcode::ScopeBegin);
                self.scope_depth += 1;
                self.compile_node(*initializer)?;

                let start = self.here()?;
                self.compile_node(*condition)?;
                let to_exit = self.emit_jump(Opcode::IfFalseJump);

                self.loops.push(LoopFrame {
                    break_depth: self.scope_depth - 1,
                    continue_depth: self.scope_depth,
                    ..LoopFrame::default()
                });
                self.compile_node(*body)?;

                let increment_position = self.here()?;
                self.compile_node(*increment)?;
                self.emit_op(Opcode::Jump);
                self.emit_u16(start);

                self.patch_jump(to_exit)?;
                self.scope_depth -= 1;
                self.emit_op(Opcode::ScopeEnd);

                let frame = self.loops.pop().expect("loop frame pushed above");
                let end = self.here()?;
                for site in frame.breaks {
                    self.patch_jump_to(site, end);
                }
                for site in frame.continues {
                    self.patch_jump_to(site, increment_position);
                }
                self.emit_op(Opcode::PopStack);
                Ok(())
            }

            Ast::Break { .. } => {
                let Some(frame_index) = self.loops.len().checked_sub(1) else {
                    return Err(CompileError::StrayLoopJump);
                };
                let unwind = self.scope_depth - self.loops[frame_index].break_depth;
                for _ in 0..unwind {
                    self.emit_op(Opcode::ScopeEnd);
                }
                let site = self.emit_jump(Opcode::Jump);
                self.loops[frame_index].breaks.push(site);
                Ok(())
            }

            Ast::Continue { .. } => {
                let Some(frame_index) = self.loops.len().checked_sub(1) else {
                    return Err(CompileError::StrayLoopJump);
                };
                let unwind = self.scope_depth - self.loops[frame_index].continue_depth;
                for _ in 0..unwind {
                    self.emit_op(Opcode::ScopeEnd);
                }
                let site = self.emit_jump(Opcode::Jump);
                self.loops[frame_index].continues.push(site);
                Ok(())
            }

            Ast::PrefixIncrement { name } => self.compile_crement(&name, Opcode::Addition, true),
            Ast::PrefixDecrement { name } => self.compile_crement(&name, Opcode::Subtraction, true),
            Ast::PostfixIncrement { name } => {
                self.compile_crement(&name, Opcode::Addition, false)
            }
            Ast::PostfixDecrement { name } => {
                self.compile_crement(&name, Opcode::Subtraction, false)
            }

            Ast::Print { child } => {
                self.compile_node(*child)?;
                self.emit_op(Opcode::Print);
                Ok(())
            }

            Ast::Assert { condition, message } => {
                self.compile_node(*condition)?;
                self.compile_node(*message)?;
                self.emit_op(Opcode::Assert);
                Ok(())
            }

            Ast::Import { name, alias, .. } => {
                self.push_identifier(&name)?;
                match alias {
                    Some(alias) => self.push_identifier(&alias)?,
                    None => self.push_null()?,
                }
                self.emit_op(Opcode::Import);
                Ok(())
            }
        }
    }

    fn compile_index_part(&mut self, part: IndexPart) -> Result<(), CompileError> {
        match part {
            IndexPart::Omitted => self.push_null(),
            IndexPart::Blank => {
                let index = self.add_entry(PoolEntry::IndexBlank)?;
                self.emit_literal_index(index);
                Ok(())
            }
            IndexPart::Expr(expr) => self.compile_node(*expr),
        }
    }

    fn compile_binary(&mut self, op: BinaryOp, left: Ast, right: Ast) -> Result<(), CompileError> {
        if op.is_assignment() {
            return self.compile_assignment(op, left, right);
        }

        self.compile_node(left)?;
        self.compile_node(right)?;
        self.emit_op(match op {
            BinaryOp::Add => Opcode::Addition,
            BinaryOp::Subtract => Opcode::Subtraction,
            BinaryOp::Multiply => Opcode::Multiplication,
            BinaryOp::Divide => Opcode::Division,
            BinaryOp::Modulo => Opcode::Modulo,
            BinaryOp::Equal => Opcode::CompareEqual,
            BinaryOp::NotEqual => Opcode::CompareNotEqual,
            BinaryOp::Less => Opcode::CompareLess,
            BinaryOp::LessEqual => Opcode::CompareLessEqual,
            BinaryOp::Greater => Opcode::CompareGreater,
            BinaryOp::GreaterEqual => Opcode::CompareGreaterEqual,
            BinaryOp::And => Opcode::And,
            BinaryOp::Or => Opcode::Or,
            BinaryOp::Assign
            | BinaryOp::AddAssign
            | BinaryOp::SubtractAssign
            | BinaryOp::MultiplyAssign
            | BinaryOp::DivideAssign
            | BinaryOp::ModuloAssign => unreachable!("assignments handled above"),
        });
        Ok(())
    }

    fn assign_opcode(op: BinaryOp) -> Opcode {
        match op {
            BinaryOp::Assign => Opcode::VarAssign,
            BinaryOp::AddAssign => Opcode::VarAdditionAssign,
            BinaryOp::SubtractAssign => Opcode::VarSubtractionAssign,
            BinaryOp::MultiplyAssign => Opcode::VarMultiplicationAssign,
            BinaryOp::DivideAssign => Opcode::VarDivisionAssign,
            BinaryOp::ModuloAssign => Opcode::VarModuloAssign,
            _ => unreachable!("not an assignment operator"),
        }
    }

    fn compile_assignment(
        &mut self,
        op: BinaryOp,
        left: Ast,
        right: Ast,
    ) -> Result<(), CompileError> {
        match left {
            Ast::Literal {
                value: AstLiteral::Identifier(name),
            } => {
                self.push_identifier(&name)?;
                self.compile_node(right)?;
                self.emit_op(Self::assign_opcode(op));
                Ok(())
            }
            Ast::Index {
                compound,
                first,
                second,
                third,
            } => {
                self.compile_index_assign_target(*compound)?;
                self.compile_index_part(first)?;
                self.compile_index_part(second)?;
                self.compile_index_part(third)?;
                self.compile_node(right)?;
                self.emit_op(Opcode::IndexAssign);
                self.emit_u8(Self::assign_opcode(op) as u8);
                Ok(())
            }
            // the parser only produces the two shapes above
            _ => Err(CompileError::BadCompoundSubtree),
        }
    }

    /// Compile the compound side of an index assignment. Nested index
    /// levels stay linked on the stack via `INDEX_ASSIGN_INTERMEDIATE`.
    fn compile_index_assign_target(&mut self, node: Ast) -> Result<(), CompileError> {
        match node {
            Ast::Index {
                compound,
                first,
                second,
                third,
            } => {
                self.compile_index_assign_target(*compound)?;
                self.compile_index_part(first)?;
                self.compile_index_part(second)?;
                self.compile_index_part(third)?;
                self.emit_op(Opcode::IndexAssignIntermediate);
                Ok(())
            }
            other => self.compile_node(other),
        }
    }

    /// `++x` / `x--` and friends: read, adjust by one, store; prefix
    /// forms re-push the updated value, postfix forms push the old value
    /// first.
    fn compile_crement(
        &mut self,
        name: &str,
        arithmetic: Opcode,
        prefix: bool,
    ) -> Result<(), CompileError> {
        if !prefix {
            self.push_identifier(name)?;
            self.emit_op(Opcode::LiteralRaw);
        }

        self.push_identifier(name)?;
        self.push_identifier(name)?;
        self.push_integer(1)?;
        self.emit_op(arithmetic);
        self.emit_op(Opcode::VarAssign);

        if prefix {
            self.push_identifier(name)?;
            self.emit_op(Opcode::LiteralRaw);
        }
        Ok(())
    }

    fn compile_fn_decl(
        &mut self,
        name: &str,
        params: Vec<xvr_parser::ast::Param>,
        rest: Option<String>,
        returns: Vec<TypeSpec>,
        body: Ast,
    ) -> Result<(), CompileError> {
        let mut sub = Compiler::function_body();

        // parameter collection: interleaved identifier/type indices, with
        // a rest marker pair at the end when present
        let mut param_indices = Vec::new();
        for param in &params {
            param_indices.push(sub.identifier_entry(&param.name)?);
            param_indices.push(sub.type_entry(&param.type_spec)?);
        }
        if let Some(rest_name) = &rest {
            param_indices.push(sub.identifier_entry(rest_name)?);
            param_indices.push(sub.add_entry(PoolEntry::Type {
                tag: ValueTag::FunctionRest,
                constant: false,
                subtypes: Vec::new(),
            })?);
        }
        let param_collection = sub.add_entry(PoolEntry::Array(param_indices))?;

        let mut return_indices = Vec::new();
        for spec in &returns {
            return_indices.push(sub.type_entry(spec)?);
        }
        let return_collection = sub.add_entry(PoolEntry::Array(return_indices))?;

        // the code section of a function opens with the two collection
        // indices; the interpreter reads them before fixing code-start
        sub.emit_u16(param_collection);
        sub.emit_u16(return_collection);

        sub.compile_node(body)
            .map_err(|e| CompileError::NestedFunction(Box::new(e)))?;

        let sub_image = sub
            .collate_headerless()
            .map_err(|e| CompileError::NestedFunction(Box::new(e)))?;
        if sub_image.len() + 1 > MAX_FUNCTION_BYTES {
            return Err(CompileError::FunctionTooLarge);
        }

        if self.functions.len() >= MAX_FUNCTIONS {
            return Err(CompileError::TooManyFunctions);
        }
        self.functions.push(sub_image);
        let function_index = self.add_entry(PoolEntry::Function(
            (self.functions.len() - 1) as u16,
        ))?;

        let identifier_index = self.identifier_entry(name)?;
        if identifier_index >= 256 || function_index >= 256 {
            self.emit_op(Opcode::FnDeclLong);
            self.emit_u16(identifier_index);
            self.emit_u16(function_index);
        } else {
            self.emit_op(Opcode::FnDecl);
            self.emit_u8(identifier_index as u8);
            self.emit_u8(function_index as u8);
        }
        Ok(())
    }

    fn compile_fn_call(
        &mut self,
        name: &str,
        receiver: Option<Box<Ast>>,
        arguments: Vec<Ast>,
    ) -> Result<(), CompileError> {
        let argument_count = arguments.len();
        match receiver {
            None => {
                self.push_identifier(name)?;
                for argument in arguments {
                    self.compile_node(argument)?;
                }
                self.push_integer(argument_count as i32)?;
                self.emit_op(Opcode::FnCall);
            }
            Some(receiver) => {
                // the receiver rides below the callee identifier and is
                // shuffled into first-argument position by the DOT handler
                self.compile_node(*receiver)?;
                self.push_identifier(name)?;
                for argument in arguments {
                    self.compile_node(argument)?;
                }
                self.push_integer((argument_count + 1) as i32)?;
                self.emit_op(Opcode::Dot);
            }
        }
        Ok(())
    }
}

fn write_pool_entry(out: &mut Vec<u8>, entry: &PoolEntry) {
    match entry {
        PoolEntry::Null => out.push(ValueTag::Null as u8),
        PoolEntry::Boolean(b) => {
            out.push(ValueTag::Boolean as u8);
            out.push(u8::from(*b));
        }
        PoolEntry::Integer(i) => {
            out.push(ValueTag::Integer as u8);
            out.extend_from_slice(&i.to_le_bytes());
        }
        PoolEntry::Float(bits) => {
            out.push(ValueTag::Float as u8);
            out.extend_from_slice(&bits.to_le_bytes());
        }
        PoolEntry::String(bytes) => {
            out.push(ValueTag::String as u8);
            out.extend_from_slice(bytes);
            out.push(0);
        }
        PoolEntry::Identifier(bytes) => {
            out.push(ValueTag::Identifier as u8);
            out.extend_from_slice(bytes);
            out.push(0);
        }
        PoolEntry::Array(indices) => {
            out.push(ValueTag::Array as u8);
            out.extend_from_slice(&(indices.len() as u16).to_le_bytes());
            for index in indices {
                out.extend_from_slice(&index.to_le_bytes());
            }
        }
        PoolEntry::Dictionary(indices) => {
            out.push(ValueTag::Dictionary as u8);
            out.extend_from_slice(&(indices.len() as u16).to_le_bytes());
            for index in indices {
                out.extend_from_slice(&index.to_le_bytes());
            }
        }
        PoolEntry::Function(index) => {
            out.push(ValueTag::Function as u8);
            out.extend_from_slice(&index.to_le_bytes());
        }
        PoolEntry::Type {
            tag,
            constant,
            subtypes,
        } => {
            if subtypes.is_empty() {
                out.push(ValueTag::Type as u8);
                out.push(*tag as u8);
                out.push(u8::from(*constant));
            } else {
                out.push(ValueTag::TypeIntermediate as u8);
                out.push(*tag as u8);
                out.push(u8::from(*constant));
                for subtype in subtypes {
                    out.extend_from_slice(&subtype.to_le_bytes());
                }
            }
        }
        PoolEntry::IndexBlank => out.push(ValueTag::IndexBlank as u8),
    }
}

/// Compile a parsed program in one call.
pub fn compile_nodes(nodes: Vec<Ast>) -> Result<Vec<u8>, CompileError> {
    let mut compiler = Compiler::new();
    for node in nodes {
        compiler.write(node)?;
    }
    compiler.collate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode;

    fn compile(source: &str) -> Vec<u8> {
        let (nodes, errors) = xvr_parser::parse(source);
        assert!(errors.is_empty(), "parse errors: {:?}", errors.errors());
        compile_nodes(nodes).expect("compiles")
    }

    #[test]
    fn test_image_shape() {
        let image = compile("print 1 + 2;");
        let (header, rest_offset) = bytecode::read_header(&image).expect("valid header");
        assert_eq!(header.major, bytecode::VERSION_MAJOR);
        assert_eq!(header.minor, bytecode::VERSION_MINOR);
        assert_eq!(header.patch, bytecode::VERSION_PATCH);
        assert!(rest_offset < image.len());
        // image ends with SECTION_END then EOF
        assert_eq!(image[image.len() - 2], Opcode::SectionEnd as u8);
        assert_eq!(image[image.len() - 1], Opcode::Eof as u8);
    }

    #[test]
    fn test_literals_are_deduplicated() {
        let mut compiler = Compiler::new();
        let (nodes, _) = xvr_parser::parse("print 7; print 7; print 7;");
        for node in nodes {
            compiler.write(node).expect("compiles");
        }
        let sevens = compiler
            .pool
            .iter()
            .filter(|e| matches!(e, PoolEntry::Integer(7)))
            .count();
        assert_eq!(sevens, 1);
    }

    #[test]
    fn test_int_and_float_literals_stay_distinct() {
        let mut compiler = Compiler::new();
        let (nodes, _) = xvr_parser::parse("print 1; print 1.0;");
        for node in nodes {
            compiler.write(node).expect("compiles");
        }
        assert!(compiler.pool.contains(&PoolEntry::Integer(1)));
        assert!(compiler
            .pool
            .contains(&PoolEntry::Float(1.0f32.to_bits())));
    }

    #[test]
    fn test_error_node_sets_panic() {
        let (nodes, errors) = xvr_parser::parse("var = ;");
        assert!(!errors.is_empty());
        let mut compiler = Compiler::new();
        let mut failed = false;
        for node in nodes {
            if compiler.write(node).is_err() {
                failed = true;
            }
        }
        assert!(failed);
        assert!(compiler.panicked());
        assert!(compiler.collate().is_err());
    }

    #[test]
    fn test_break_outside_loop_fails() {
        let (nodes, errors) = xvr_parser::parse("break;");
        assert!(errors.is_empty());
        assert!(matches!(
            compile_nodes(nodes),
            Err(CompileError::StrayLoopJump)
        ));
    }

    #[test]
    fn test_function_section_populated() {
        let mut compiler = Compiler::new();
        let (nodes, _) = xvr_parser::parse("fn noop() { pass; }");
        for node in nodes {
            compiler.write(node).expect("compiles");
        }
        assert_eq!(compiler.functions.len(), 1);
        assert!(compiler
            .pool
            .iter()
            .any(|e| matches!(e, PoolEntry::Function(0))));
    }

    #[test]
    fn test_compound_literal_rejects_expressions() {
        let (nodes, errors) = xvr_parser::parse("var a = [1 + 2];");
        assert!(errors.is_empty());
        assert!(matches!(
            compile_nodes(nodes),
            Err(CompileError::BadCompoundSubtree)
        ));
    }

    #[test]
    fn test_compound_literal_accepts_identifiers_and_nesting() {
        let image = compile("var x = 1; var a = [x, [2, 3]]; print a;");
        assert!(!image.is_empty());
    }

    #[test]
    fn test_deterministic_output() {
        let source = "var x = 1; fn f(a) { return a; } print f(x);";
        assert_eq!(compile(source), compile(source));
    }
}
