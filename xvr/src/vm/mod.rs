//! The stack interpreter
//!
//! Executes one bytecode image: the header is verified, the literal pool
//! and function section are loaded, then the opcode stream runs against a
//! value stack and the current scope chain. Function calls run the
//! callee's sub-image as a fresh routine (own literals, own stack) over a
//! scope pushed onto the captured chain, sharing the hook registry,
//! output callbacks, and the recursion-depth counter.

mod arithmetic;
pub mod error;
mod index;
mod natives;

pub use error::{ErrorSeverity, RuntimeError};
pub use index::AssignOp;

use std::rc::Rc;

use crate::bytecode;
use crate::opcode::Opcode;
use crate::scope::{ScopeArena, ScopeId, SetError};
use crate::value::{
    format, FunctionValue, HookFn, Identifier, NativeFn, RefString, TypeValue, Value, ValueArray,
    ValueDictionary, ValueTag,
};
use arithmetic::{value_arithmetic, ArithOp};

/// Maximum nested function-call depth.
pub const MAX_RECURSION_DEPTH: usize = 200;

/// Output sink installed on the interpreter.
pub type OutputFn = Box<dyn FnMut(&str)>;

/// One executing image or function sub-image.
struct Routine {
    bytecode: Rc<[u8]>,
    pc: usize,
    code_start: usize,
    literals: Vec<Value>,
}

impl Routine {
    fn read_u8(&mut self) -> Result<u8, RuntimeError> {
        let byte = self
            .bytecode
            .get(self.pc)
            .copied()
            .ok_or(RuntimeError::TruncatedImage)?;
        self.pc += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, RuntimeError> {
        let lo = self.read_u8()?;
        let hi = self.read_u8()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn read_i32(&mut self) -> Result<i32, RuntimeError> {
        let mut bytes = [0u8; 4];
        for byte in &mut bytes {
            *byte = self.read_u8()?;
        }
        Ok(i32::from_le_bytes(bytes))
    }

    fn read_f32(&mut self) -> Result<f32, RuntimeError> {
        let mut bytes = [0u8; 4];
        for byte in &mut bytes {
            *byte = self.read_u8()?;
        }
        Ok(f32::from_le_bytes(bytes))
    }

    fn read_cstring(&mut self) -> Result<Vec<u8>, RuntimeError> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.read_u8()?;
            if byte == 0 {
                return Ok(bytes);
            }
            bytes.push(byte);
        }
    }

    fn expect_section_end(&mut self) -> Result<(), RuntimeError> {
        let byte = self.read_u8()?;
        if byte != Opcode::SectionEnd as u8 {
            return Err(RuntimeError::MalformedImage(format!(
                "expected section end, found byte {byte}"
            )));
        }
        Ok(())
    }

    fn jump_to(&mut self, target: u16) -> Result<(), RuntimeError> {
        let destination = self.code_start + target as usize;
        if destination > self.bytecode.len() {
            return Err(RuntimeError::Internal("jump out of range".into()));
        }
        self.pc = destination;
        Ok(())
    }
}

/// The Xvr interpreter.
pub struct Interpreter {
    scopes: ScopeArena,
    scope: ScopeId,
    hooks: ValueDictionary,
    config: ValueDictionary,
    print_out: OutputFn,
    assert_out: OutputFn,
    error_out: OutputFn,
    print_newline: bool,
    verbose: bool,
    /// The current frame's value stack; swapped out around function calls.
    stack: ValueArray,
    depth: usize,
    panic: bool,
    error_reported: bool,
    /// Pending `INDEX_ASSIGN_INTERMEDIATE` frames; true when the frame
    /// carries the root identifier beneath it.
    index_frames: Vec<bool>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("depth", &self.depth)
            .field("panic", &self.panic)
            .field("stack_len", &self.stack.len())
            .finish()
    }
}

#[allow(clippy::print_stdout)]
fn default_print(message: &str) {
    print!("{message}");
}

#[allow(clippy::print_stderr)]
fn default_error(message: &str) {
    eprintln!("\x1b[31m{message}\x1b[0m");
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Create an interpreter with the default output callbacks and the
    /// built-in natives installed.
    pub fn new() -> Self {
        let mut scopes = ScopeArena::new();
        let root = scopes.push(None);
        let mut interpreter = Self {
            scopes,
            scope: root,
            hooks: ValueDictionary::new(),
            config: ValueDictionary::new(),
            print_out: Box::new(default_print),
            assert_out: Box::new(default_error),
            error_out: Box::new(default_error),
            print_newline: false,
            verbose: false,
            stack: ValueArray::new(),
            depth: 0,
            panic: false,
            error_reported: false,
            index_frames: Vec::new(),
        };
        natives::install_defaults(&mut interpreter);
        interpreter
    }

    /// Discard all execution state (scopes, stack, panic flag) while
    /// keeping installed hooks and output callbacks; the built-in natives
    /// are reinstalled into the fresh root scope.
    pub fn reset(&mut self) {
        self.scopes.clear();
        self.scope = self.scopes.push(None);
        self.stack.clear();
        self.depth = 0;
        self.panic = false;
        self.error_reported = false;
        self.index_frames.clear();
        natives::install_defaults(self);
    }

    // ==================== host configuration ====================

    pub fn set_print(&mut self, callback: impl FnMut(&str) + 'static) {
        self.print_out = Box::new(callback);
    }

    pub fn set_assert(&mut self, callback: impl FnMut(&str) + 'static) {
        self.assert_out = Box::new(callback);
    }

    pub fn set_error(&mut self, callback: impl FnMut(&str) + 'static) {
        self.error_out = Box::new(callback);
    }

    /// Whether `print` appends a newline (off by default).
    pub fn set_print_newline(&mut self, enabled: bool) {
        self.print_newline = enabled;
    }

    /// Verbose mode reports loaded literals and build-string mismatches.
    pub fn set_verbose(&mut self, enabled: bool) {
        self.verbose = enabled;
    }

    /// Host-supplied configuration dictionary, readable by natives and
    /// hooks.
    pub fn config(&self) -> &ValueDictionary {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ValueDictionary {
        &mut self.config
    }

    /// True once a run has panicked.
    pub fn panicked(&self) -> bool {
        self.panic
    }

    /// Number of live scopes: the root plus anything pinned by closures.
    /// A run that creates no closures must leave this at its pre-run value.
    pub fn live_scope_count(&self) -> usize {
        self.scopes.live_count()
    }

    /// Install a native function under `name` in the root scope.
    pub fn install_native(&mut self, name: &str, callback: NativeFn) {
        let id = Identifier::new(name);
        let ty = TypeValue::new(ValueTag::FunctionNative, true);
        self.scopes.declare(self.scope, &id, ty);
        let _ = self
            .scopes
            .set(self.scope, &id, Value::FunctionNative(callback), false);
    }

    /// Register an import hook under `name`.
    pub fn install_hook(&mut self, name: &str, callback: HookFn) {
        self.hooks
            .set(Value::identifier(name), Value::FunctionHook(callback));
    }

    /// Declare and define a variable in the current scope (used by hooks
    /// to bind exported names).
    pub fn inject_variable(&mut self, name: &str, value: Value) -> bool {
        let id = Identifier::new(name);
        if !self.scopes.declare(self.scope, &id, TypeValue::any()) {
            return false;
        }
        self.scopes.set(self.scope, &id, value, false).is_ok()
    }

    // ==================== running ====================

    /// Execute one bytecode image, taking ownership of it.
    pub fn run(&mut self, image: Vec<u8>) -> Result<(), RuntimeError> {
        self.panic = false;
        self.error_reported = false;
        self.stack.clear();
        self.index_frames.clear();

        let bytecode: Rc<[u8]> = Rc::from(image.into_boxed_slice());

        let (header, offset) = match bytecode::read_header(&bytecode) {
            Ok(parsed) => parsed,
            Err(error) => {
                let failure = RuntimeError::MalformedImage(error.to_string());
                self.report(&failure);
                self.panic = true;
                return Err(failure);
            }
        };
        if let Err(error) = bytecode::check_version(&header) {
            let failure = RuntimeError::VersionMismatch(error.to_string());
            self.report(&failure);
            self.panic = true;
            return Err(failure);
        }
        if self.verbose && header.build_mismatch() {
            (self.print_out)("warning: interpreter/bytecode build mismatch\n");
        }

        let mut routine = match self.read_sections(bytecode, offset) {
            Ok(routine) => routine,
            Err(error) => {
                self.report(&error);
                self.panic = true;
                return Err(error);
            }
        };

        let result = self.execute(&mut routine);
        self.stack.clear();
        self.index_frames.clear();
        result
    }

    /// Call a declared function (or native) by name with positional
    /// arguments; the single return value arrives in the returns array.
    pub fn call_fn(
        &mut self,
        name: &str,
        arguments: ValueArray,
    ) -> Result<ValueArray, RuntimeError> {
        let id = Identifier::new(name);
        let Some(func) = self.scopes.get(self.scope, &id) else {
            return Err(RuntimeError::FunctionNotFound(name.to_string()));
        };
        match func {
            Value::Function(function) => {
                let ret = self.call_function(name, &function, arguments.into_vec())?;
                Ok(vec![ret].into())
            }
            Value::FunctionNative(native) => {
                let mut args = arguments;
                let result = native(self, &mut args);
                if result < 0 {
                    return Err(RuntimeError::NativeFailure(name.to_string()));
                }
                Ok(vec![self.stack.pop_or_null()].into())
            }
            _ => Err(RuntimeError::NotCallable(name.to_string())),
        }
    }

    // ==================== helpers shared with natives ====================

    /// Route a message to the error callback (for host natives).
    pub fn emit_error(&mut self, message: &str) {
        (self.error_out)(message);
    }

    /// Push a result onto the current value stack (for host natives).
    pub fn push_value(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Copy out the value bound to `name` in the current scope chain.
    pub fn variable_value(&mut self, name: &Identifier) -> Option<Value> {
        self.scopes.get(self.scope, name)
    }

    /// The declared type of `name` in the current scope chain.
    pub fn declared_type(&self, name: &Identifier) -> Option<TypeValue> {
        self.scopes.get_type(self.scope, name)
    }

    /// Assign through the scope chain, honoring const and declared types.
    pub fn assign_variable(
        &mut self,
        name: &Identifier,
        value: Value,
    ) -> Result<(), SetError> {
        self.scopes.set(self.scope, name, value, true)
    }

    /// Resolve an identifier to its value and flush identifiers out of
    /// compounds.
    pub fn resolve_value(&mut self, value: &mut Value) -> Result<(), RuntimeError> {
        if let Value::Identifier(name) = value {
            let resolved = self
                .scopes
                .get(self.scope, name)
                .ok_or_else(|| RuntimeError::UndeclaredVariable(name.name().into_owned()))?;
            *value = resolved;
        }
        match value {
            Value::Array(array) => {
                for element in array.iter_mut() {
                    self.resolve_value(element)?;
                }
                Ok(())
            }
            Value::Dictionary(dict) => {
                let pairs: Vec<(Value, Value)> = dict
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let mut resolved = ValueDictionary::new();
                for (mut key, mut val) in pairs {
                    self.resolve_value(&mut key)?;
                    self.resolve_value(&mut val)?;
                    if !resolved.set(key.clone(), val) {
                        return Err(RuntimeError::InvalidDictionaryKey(format::stringify(
                            &key,
                        )));
                    }
                }
                **dict = resolved;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ==================== internals ====================

    fn report(&mut self, error: &RuntimeError) {
        if self.error_reported {
            return;
        }
        self.error_reported = true;
        let message = error.to_string();
        (self.error_out)(&message);
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn pop_resolved(&mut self) -> Result<Value, RuntimeError> {
        let mut value = self.pop()?;
        self.resolve_value(&mut value)?;
        Ok(value)
    }

    /// Read the literal pool and function section, leaving the routine
    /// positioned at the start of its code.
    fn read_sections(
        &mut self,
        bytecode: Rc<[u8]>,
        offset: usize,
    ) -> Result<Routine, RuntimeError> {
        enum Slot {
            Ready(Value),
            Function(u16),
        }

        let mut routine = Routine {
            bytecode,
            pc: offset,
            code_start: 0,
            literals: Vec::new(),
        };

        let literal_count = routine.read_u16()?;
        let mut slots: Vec<Slot> = Vec::with_capacity(literal_count as usize);

        let fetch = |slots: &Vec<Slot>, index: u16| -> Result<Value, RuntimeError> {
            match slots.get(index as usize) {
                Some(Slot::Ready(value)) => Ok(value.clone()),
                _ => Err(RuntimeError::MalformedImage(format!(
                    "literal references unresolved pool entry {index}"
                ))),
            }
        };

        for _ in 0..literal_count {
            let tag_byte = routine.read_u8()?;
            let tag = ValueTag::try_from(tag_byte).map_err(|byte| {
                RuntimeError::MalformedImage(format!("unknown literal tag {byte}"))
            })?;

            let slot = match tag {
                ValueTag::Null => Slot::Ready(Value::Null),
                ValueTag::Boolean => Slot::Ready(Value::Boolean(routine.read_u8()? != 0)),
                ValueTag::Integer => Slot::Ready(Value::Integer(routine.read_i32()?)),
                ValueTag::Float => Slot::Ready(Value::Float(routine.read_f32()?)),
                ValueTag::String => {
                    let bytes = routine.read_cstring()?;
                    Slot::Ready(Value::String(RefString::new(&bytes)))
                }
                ValueTag::Identifier => {
                    let bytes = routine.read_cstring()?;
                    Slot::Ready(Value::Identifier(Identifier::from_refstring(
                        RefString::new(&bytes),
                    )))
                }
                ValueTag::Array | ValueTag::ArrayIntermediate => {
                    let length = routine.read_u16()?;
                    let mut array = ValueArray::with_capacity(length as usize);
                    for _ in 0..length {
                        let index = routine.read_u16()?;
                        array.push(fetch(&slots, index)?);
                    }
                    Slot::Ready(Value::Array(Box::new(array)))
                }
                ValueTag::Dictionary | ValueTag::DictionaryIntermediate => {
                    let length = routine.read_u16()?;
                    let mut dict = ValueDictionary::new();
                    for _ in 0..length / 2 {
                        let key_index = routine.read_u16()?;
                        let value_index = routine.read_u16()?;
                        let key = fetch(&slots, key_index)?;
                        let value = fetch(&slots, value_index)?;
                        dict.set(key, value);
                    }
                    Slot::Ready(Value::Dictionary(Box::new(dict)))
                }
                ValueTag::Function => Slot::Function(routine.read_u16()?),
                ValueTag::Type => {
                    let type_tag = ValueTag::try_from(routine.read_u8()?).map_err(|byte| {
                        RuntimeError::MalformedImage(format!("unknown type tag {byte}"))
                    })?;
                    let constant = routine.read_u8()? != 0;
                    Slot::Ready(Value::Type(TypeValue::new(type_tag, constant)))
                }
                ValueTag::TypeIntermediate => {
                    let type_tag = ValueTag::try_from(routine.read_u8()?).map_err(|byte| {
                        RuntimeError::MalformedImage(format!("unknown type tag {byte}"))
                    })?;
                    let constant = routine.read_u8()? != 0;
                    let subtype_count = match type_tag {
                        ValueTag::Array => 1,
                        ValueTag::Dictionary => 2,
                        _ => 0,
                    };
                    let mut subtypes = Vec::with_capacity(subtype_count);
                    for _ in 0..subtype_count {
                        let index = routine.read_u16()?;
                        match fetch(&slots, index)? {
                            Value::Type(subtype) => subtypes.push(subtype),
                            other => {
                                return Err(RuntimeError::MalformedImage(format!(
                                    "type subtype is not a type: {}",
                                    format::stringify(&other)
                                )))
                            }
                        }
                    }
                    Slot::Ready(Value::Type(TypeValue::with_subtypes(
                        type_tag, constant, subtypes,
                    )))
                }
                ValueTag::IndexBlank => Slot::Ready(Value::IndexBlank),
                other => {
                    return Err(RuntimeError::MalformedImage(format!(
                        "unexpected literal tag {:?}",
                        other
                    )))
                }
            };
            slots.push(slot);
        }
        routine.expect_section_end()?;

        // function section
        let function_count = routine.read_u16()?;
        let _total_bytes = routine.read_u16()?;
        let mut functions: Vec<Rc<[u8]>> = Vec::with_capacity(function_count as usize);
        for _ in 0..function_count {
            let length = routine.read_u16()? as usize;
            if length == 0 {
                return Err(RuntimeError::MalformedImage("empty function entry".into()));
            }
            let end = routine
                .pc
                .checked_add(length)
                .filter(|end| *end <= routine.bytecode.len())
                .ok_or(RuntimeError::TruncatedImage)?;
            let bytes = &routine.bytecode[routine.pc..end];
            if bytes[length - 1] != Opcode::FnEnd as u8 {
                return Err(RuntimeError::MalformedImage(
                    "missing function end marker".into(),
                ));
            }
            functions.push(Rc::from(&bytes[..length - 1]));
            routine.pc = end;
        }
        routine.expect_section_end()?;

        routine.literals = slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Ready(value) => Ok(value),
                Slot::Function(index) => functions
                    .get(index as usize)
                    .map(|bytes| Value::Function(FunctionValue::new(bytes.clone())))
                    .ok_or_else(|| {
                        RuntimeError::MalformedImage(format!(
                            "function literal references missing entry {index}"
                        ))
                    }),
            })
            .collect::<Result<Vec<Value>, RuntimeError>>()?;

        if self.verbose {
            let count = routine.literals.len();
            (self.print_out)(&format!("reading {count} literals\n"));
            for (position, literal) in routine.literals.iter().enumerate() {
                let rendered = format::stringify(literal);
                (self.print_out)(&format!("({position}: {rendered})\n"));
            }
        }

        routine.code_start = routine.pc;
        Ok(routine)
    }

    /// The dispatch loop. Returns at `EOF`/`SECTION_END`, at the end of a
    /// grouping region, or at `FN_RETURN`.
    fn execute(&mut self, routine: &mut Routine) -> Result<(), RuntimeError> {
        loop {
            if self.panic {
                return Ok(());
            }
            let opcode_byte = match routine.read_u8() {
                Ok(byte) => byte,
                Err(error) => {
                    self.report(&error);
                    self.panic = true;
                    return Err(error);
                }
            };
            let opcode = match Opcode::try_from(opcode_byte) {
                Ok(opcode) => opcode,
                Err(byte) => {
                    let error = RuntimeError::UnknownOpcode(byte);
                    self.report(&error);
                    self.panic = true;
                    return Err(error);
                }
            };

            match opcode {
                Opcode::Eof | Opcode::SectionEnd | Opcode::FnEnd => return Ok(()),
                Opcode::GroupingEnd => return Ok(()),
                Opcode::GroupingBegin => self.execute(routine)?,
                Opcode::FnReturn => {
                    self.resolve_stack();
                    return Ok(());
                }
                other => {
                    if let Err(error) = self.step(routine, other) {
                        match error.severity() {
                            ErrorSeverity::Recoverable => {
                                self.report(&error);
                                self.error_reported = false;
                                self.stack.push(Value::Null);
                            }
                            _ => {
                                self.report(&error);
                                self.panic = true;
                                return Err(error);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Resolve every identifier (and compound) still on the stack; used
    /// at `FN_RETURN` so callers see values, not names.
    fn resolve_stack(&mut self) {
        let mut values: Vec<Value> = std::mem::take(&mut self.stack).into_vec();
        for value in &mut values {
            if let Err(error) = self.resolve_value(value) {
                self.report(&error);
                self.error_reported = false;
            }
        }
        self.stack = values.into();
    }

    fn step(&mut self, routine: &mut Routine, opcode: Opcode) -> Result<(), RuntimeError> {
        match opcode {
            Opcode::Pass => Ok(()),

            Opcode::Assert => self.exec_assert(),
            Opcode::Print => self.exec_print(),

            Opcode::Literal => {
                let index = routine.read_u8()? as usize;
                self.push_pool_literal(routine, index)
            }
            Opcode::LiteralLong => {
                let index = routine.read_u16()? as usize;
                self.push_pool_literal(routine, index)
            }
            Opcode::LiteralRaw => {
                let value = self.pop_resolved()?;
                self.stack.push(value);
                Ok(())
            }

            Opcode::Negate => {
                let value = self.pop_resolved()?;
                let negated = match value {
                    Value::Integer(i) => Value::Integer(i.wrapping_neg()),
                    Value::Float(f) => Value::Float(-f),
                    other => return Err(RuntimeError::NotNegatable(format::stringify(&other))),
                };
                self.stack.push(negated);
                Ok(())
            }
            Opcode::Invert => {
                let value = self.pop_resolved()?;
                match value {
                    Value::Boolean(b) => {
                        self.stack.push(Value::Boolean(!b));
                        Ok(())
                    }
                    other => Err(RuntimeError::NotInvertible(format::stringify(&other))),
                }
            }

            Opcode::Addition
            | Opcode::Subtraction
            | Opcode::Multiplication
            | Opcode::Division
            | Opcode::Modulo => {
                let rhs = self.pop_resolved()?;
                let lhs = self.pop_resolved()?;
                let result = value_arithmetic(arith_for(opcode), &lhs, &rhs)?;
                self.stack.push(result);
                Ok(())
            }

            Opcode::VarAdditionAssign
            | Opcode::VarSubtractionAssign
            | Opcode::VarMultiplicationAssign
            | Opcode::VarDivisionAssign
            | Opcode::VarModuloAssign => {
                let rhs = self.pop_resolved()?;
                let lhs = self.pop()?;
                let name = match lhs {
                    Value::Identifier(name) => name,
                    other => {
                        return Err(RuntimeError::NotAssignable(format::stringify(&other)))
                    }
                };
                let mut current = Value::Identifier(name.clone());
                self.resolve_value(&mut current)?;
                let result = value_arithmetic(compound_arith_for(opcode), &current, &rhs)?;
                self.assign_with_promotion(&name, result)
            }

            Opcode::ScopeBegin => {
                self.scope = self.scopes.push(Some(self.scope));
                Ok(())
            }
            Opcode::ScopeEnd => {
                match self.scopes.pop(self.scope) {
                    Some(parent) => {
                        self.scope = parent;
                        Ok(())
                    }
                    None => Err(RuntimeError::Internal("scope underflow".into())),
                }
            }

            Opcode::VarDecl => {
                let identifier_index = routine.read_u8()? as usize;
                let type_index = routine.read_u8()? as usize;
                self.exec_var_decl(routine, identifier_index, type_index)
            }
            Opcode::VarDeclLong => {
                let identifier_index = routine.read_u16()? as usize;
                let type_index = routine.read_u16()? as usize;
                self.exec_var_decl(routine, identifier_index, type_index)
            }

            Opcode::FnDecl => {
                let identifier_index = routine.read_u8()? as usize;
                let function_index = routine.read_u8()? as usize;
                self.exec_fn_decl(routine, identifier_index, function_index)
            }
            Opcode::FnDeclLong => {
                let identifier_index = routine.read_u16()? as usize;
                let function_index = routine.read_u16()? as usize;
                self.exec_fn_decl(routine, identifier_index, function_index)
            }

            Opcode::VarAssign => {
                let rhs = self.pop_resolved()?;
                let lhs = self.pop()?;
                let name = match lhs {
                    Value::Identifier(name) => name,
                    other => {
                        return Err(RuntimeError::NotAssignable(format::stringify(&other)))
                    }
                };
                self.assign_with_promotion(&name, rhs)
            }

            Opcode::TypeCast => self.exec_cast(),
            Opcode::TypeOf => self.exec_type_of(),

            Opcode::CompareEqual | Opcode::CompareNotEqual => {
                let rhs = self.pop_resolved()?;
                let lhs = self.pop_resolved()?;
                let mut result = lhs.equals(&rhs);
                if opcode == Opcode::CompareNotEqual {
                    result = !result;
                }
                self.stack.push(Value::Boolean(result));
                Ok(())
            }
            Opcode::CompareLess
            | Opcode::CompareLessEqual
            | Opcode::CompareGreater
            | Opcode::CompareGreaterEqual => self.exec_ordering(opcode),

            Opcode::And => {
                let rhs = self.pop_resolved()?;
                let lhs = self.pop_resolved()?;
                self.stack
                    .push(Value::Boolean(lhs.is_truthy() && rhs.is_truthy()));
                Ok(())
            }
            Opcode::Or => {
                let rhs = self.pop_resolved()?;
                let lhs = self.pop_resolved()?;
                self.stack
                    .push(Value::Boolean(lhs.is_truthy() || rhs.is_truthy()));
                Ok(())
            }

            Opcode::Jump => {
                let target = routine.read_u16()?;
                routine.jump_to(target)
            }
            Opcode::IfFalseJump => {
                let target = routine.read_u16()?;
                let condition = self.pop_resolved()?;
                if condition.is_null() {
                    return Err(RuntimeError::NullCondition);
                }
                if !condition.is_truthy() {
                    routine.jump_to(target)?;
                }
                Ok(())
            }

            Opcode::FnCall => self.exec_fn_call(false),
            Opcode::Dot => self.exec_fn_call(true),

            Opcode::PopStack => {
                self.stack.clear();
                Ok(())
            }

            Opcode::Import => self.exec_import(),

            Opcode::Index => self.exec_index(false),
            Opcode::IndexAssignIntermediate => self.exec_index(true),
            Opcode::IndexAssign => self.exec_index_assign(routine),

            Opcode::Eof
            | Opcode::GroupingBegin
            | Opcode::GroupingEnd
            | Opcode::FnReturn
            | Opcode::FnEnd
            | Opcode::SectionEnd => unreachable!("handled by the dispatch loop"),
        }
    }

    fn push_pool_literal(
        &mut self,
        routine: &Routine,
        index: usize,
    ) -> Result<(), RuntimeError> {
        match routine.literals.get(index) {
            Some(value) => {
                self.stack.push(value.clone());
                Ok(())
            }
            None => Err(RuntimeError::MalformedImage(format!(
                "literal index {index} out of range"
            ))),
        }
    }

    fn exec_assert(&mut self) -> Result<(), RuntimeError> {
        let message = self.pop()?;
        let condition = {
            let mut value = self.pop()?;
            self.resolve_value(&mut value)?;
            value
        };
        let text = match message {
            Value::String(text) => text,
            other => {
                return Err(RuntimeError::AssertMessageType(format::stringify(&other)))
            }
        };
        if condition.is_null() || !condition.is_truthy() {
            let rendered = format!("Assertion failure: {}", text.as_str());
            (self.assert_out)(&rendered);
            self.panic = true;
            self.error_reported = true;
            return Err(RuntimeError::AssertionFailed(text.as_str().into_owned()));
        }
        Ok(())
    }

    fn exec_print(&mut self) -> Result<(), RuntimeError> {
        let value = self.pop_resolved()?;
        let rendered = format::stringify(&value);
        if self.print_newline {
            (self.print_out)(&format!("{rendered}\n"));
        } else {
            (self.print_out)(&rendered);
        }
        Ok(())
    }

    fn assign_with_promotion(
        &mut self,
        name: &Identifier,
        mut value: Value,
    ) -> Result<(), RuntimeError> {
        if !self.scopes.is_declared(self.scope, name) {
            return Err(RuntimeError::UndeclaredVariable(name.name().into_owned()));
        }
        if let Some(ty) = self.scopes.get_type(self.scope, name) {
            if ty.tag == ValueTag::Float {
                if let Value::Integer(i) = value {
                    value = Value::Float(i as f32);
                }
            }
        }
        self.scopes
            .set(self.scope, name, value, true)
            .map_err(|error| match error {
                SetError::Undeclared => {
                    RuntimeError::UndeclaredVariable(name.name().into_owned())
                }
                SetError::ConstViolation => {
                    RuntimeError::ConstAssignment(name.name().into_owned())
                }
                SetError::TypeMismatch => RuntimeError::TypeMismatch(name.name().into_owned()),
            })
    }

    fn exec_var_decl(
        &mut self,
        routine: &Routine,
        identifier_index: usize,
        type_index: usize,
    ) -> Result<(), RuntimeError> {
        let identifier = match routine.literals.get(identifier_index) {
            Some(Value::Identifier(id)) => id.clone(),
            _ => {
                return Err(RuntimeError::MalformedImage(
                    "variable declaration without an identifier literal".into(),
                ))
            }
        };
        let mut type_value = routine
            .literals
            .get(type_index)
            .cloned()
            .ok_or_else(|| RuntimeError::MalformedImage("type literal out of range".into()))?;
        self.resolve_value(&mut type_value)?;
        let Value::Type(ty) = type_value else {
            return Err(RuntimeError::MalformedImage(
                "variable declaration without a type literal".into(),
            ));
        };

        if !self.scopes.declare(self.scope, &identifier, ty.clone()) {
            return Err(RuntimeError::Redeclaration(identifier.name().into_owned()));
        }

        let mut value = self.pop()?;
        self.resolve_value(&mut value)?;
        if ty.tag == ValueTag::Float {
            if let Value::Integer(i) = value {
                value = Value::Float(i as f32);
            }
        }

        if !value.is_null() {
            self.scopes
                .set(self.scope, &identifier, value, false)
                .map_err(|_| RuntimeError::TypeMismatch(identifier.name().into_owned()))?;
        }
        Ok(())
    }

    fn exec_fn_decl(
        &mut self,
        routine: &Routine,
        identifier_index: usize,
        function_index: usize,
    ) -> Result<(), RuntimeError> {
        let identifier = match routine.literals.get(identifier_index) {
            Some(Value::Identifier(id)) => id.clone(),
            _ => {
                return Err(RuntimeError::MalformedImage(
                    "function declaration without an identifier literal".into(),
                ))
            }
        };
        let mut function = match routine.literals.get(function_index) {
            Some(Value::Function(function)) => function.clone(),
            _ => {
                return Err(RuntimeError::MalformedImage(
                    "function declaration without a function literal".into(),
                ))
            }
        };

        // capture the declaration environment for closure persistence
        function.scope = Some(self.scopes.capture(self.scope));

        let ty = TypeValue::new(ValueTag::Function, true);
        if !self.scopes.declare(self.scope, &identifier, ty) {
            return Err(RuntimeError::Redeclaration(identifier.name().into_owned()));
        }
        self.scopes
            .set(self.scope, &identifier, Value::Function(function), false)
            .map_err(|_| RuntimeError::TypeMismatch(identifier.name().into_owned()))
    }

    fn exec_cast(&mut self) -> Result<(), RuntimeError> {
        let value = self.pop_resolved()?;
        let target = self.pop()?;
        let Value::Type(ty) = target else {
            return Err(RuntimeError::Internal("cast without a type operand".into()));
        };
        if value.is_null() {
            return Err(RuntimeError::CastNull);
        }

        let result = match ty.tag {
            ValueTag::Boolean => Value::Boolean(value.is_truthy()),
            ValueTag::Integer => match &value {
                Value::Boolean(b) => Value::Integer(i32::from(*b)),
                Value::Integer(_) => value.clone(),
                Value::Float(f) => Value::Integer(*f as i32),
                Value::String(s) => Value::Integer(parse_integer_prefix(&s.as_str())),
                _ => Value::Null,
            },
            ValueTag::Float => match &value {
                Value::Boolean(b) => Value::Float(if *b { 1.0 } else { 0.0 }),
                Value::Integer(i) => Value::Float(*i as f32),
                Value::Float(_) => value.clone(),
                Value::String(s) => Value::Float(parse_float_prefix(&s.as_str())),
                _ => Value::Null,
            },
            ValueTag::String => match &value {
                Value::Boolean(_) | Value::Integer(_) | Value::Float(_) => {
                    Value::string(&format::stringify(&value))
                }
                Value::String(_) => value.clone(),
                _ => Value::Null,
            },
            other => {
                return Err(RuntimeError::BadCast(format!("{other:?}")));
            }
        };

        self.stack.push(result);
        Ok(())
    }

    fn exec_type_of(&mut self) -> Result<(), RuntimeError> {
        let value = self.pop()?;
        let ty = match &value {
            Value::Identifier(name) => self
                .scopes
                .get_type(self.scope, name)
                .ok_or_else(|| RuntimeError::UndeclaredVariable(name.name().into_owned()))?,
            other => TypeValue::new(other.tag(), false),
        };
        self.stack.push(Value::Type(ty));
        Ok(())
    }

    fn exec_ordering(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let rhs = self.pop_resolved()?;
        let lhs = self.pop_resolved()?;
        if !lhs.is_numeric() {
            return Err(RuntimeError::BadComparison(format::stringify(&lhs)));
        }
        if !rhs.is_numeric() {
            return Err(RuntimeError::BadComparison(format::stringify(&rhs)));
        }

        let result = match (&lhs, &rhs) {
            (Value::Integer(a), Value::Integer(b)) => match opcode {
                Opcode::CompareLess => a < b,
                Opcode::CompareLessEqual => a <= b,
                Opcode::CompareGreater => a > b,
                Opcode::CompareGreaterEqual => a >= b,
                _ => unreachable!(),
            },
            _ => {
                let a = numeric_as_f64(&lhs);
                let b = numeric_as_f64(&rhs);
                match opcode {
                    Opcode::CompareLess => a < b,
                    Opcode::CompareLessEqual => a <= b,
                    Opcode::CompareGreater => a > b,
                    Opcode::CompareGreaterEqual => a >= b,
                    _ => unreachable!(),
                }
            }
        };
        self.stack.push(Value::Boolean(result));
        Ok(())
    }

    fn exec_import(&mut self) -> Result<(), RuntimeError> {
        let alias = self.pop()?;
        let identifier = self.pop()?;
        let Value::Identifier(name) = &identifier else {
            return Err(RuntimeError::Internal("import without an identifier".into()));
        };

        let hook = self.hooks.get(&identifier);
        let Value::FunctionHook(callback) = hook else {
            return Err(RuntimeError::UnknownImport(name.name().into_owned()));
        };
        if callback(self, &identifier, &alias) < 0 {
            return Err(RuntimeError::HookFailed(name.name().into_owned()));
        }
        Ok(())
    }

    fn exec_fn_call(&mut self, loose_first_argument: bool) -> Result<(), RuntimeError> {
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(RuntimeError::RecursionLimit);
        }

        let count_value = self.pop_resolved()?;
        let Value::Integer(count) = count_value else {
            return Err(RuntimeError::Internal("call without an argument count".into()));
        };
        let count = count.max(0) as usize;

        let popped = if loose_first_argument {
            count.saturating_sub(1)
        } else {
            count
        };
        let mut reversed = Vec::with_capacity(popped);
        for _ in 0..popped {
            reversed.push(self.pop()?);
        }

        let callee = self.pop()?;
        let receiver = if loose_first_argument {
            Some(self.pop()?)
        } else {
            None
        };

        let callee_name = match callee {
            Value::Identifier(name) => name,
            other => return Err(RuntimeError::NotCallable(format::stringify(&other))),
        };
        let name = if loose_first_argument {
            Identifier::new(&format!("_{}", callee_name.name()))
        } else {
            callee_name
        };

        let mut arguments = Vec::with_capacity(count);
        if let Some(receiver) = receiver {
            arguments.push(receiver);
        }
        arguments.extend(reversed.into_iter().rev());

        let Some(function) = self.scopes.get(self.scope, &name) else {
            return Err(RuntimeError::FunctionNotFound(name.name().into_owned()));
        };

        match function {
            Value::FunctionNative(native) => {
                // natives see raw arguments: mutators need the identifier
                let mut args: ValueArray = arguments.into();
                let result = native(self, &mut args);
                if result < 0 {
                    return Err(RuntimeError::NativeFailure(name.name().into_owned()));
                }
                Ok(())
            }
            Value::Function(function) => {
                let display = name.name().into_owned();
                match self.call_function(&display, &function, arguments) {
                    Ok(result) => {
                        self.stack.push(result);
                        Ok(())
                    }
                    Err(error) => {
                        self.emit_error(&format!(
                            "error encountered in function \"{display}\""
                        ));
                        Err(error)
                    }
                }
            }
            other => Err(RuntimeError::NotCallable(format::stringify(&other))),
        }
    }

    /// Run a scripted function against its captured scope with its own
    /// routine and value stack.
    fn call_function(
        &mut self,
        name: &str,
        function: &FunctionValue,
        mut arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let Some(captured) = function.scope else {
            return Err(RuntimeError::Internal(
                "function value has no captured scope".into(),
            ));
        };

        let mut routine = self.read_sections(function.bytecode.clone(), 0)?;
        let param_index = routine.read_u16()? as usize;
        let return_index = routine.read_u16()? as usize;
        routine.code_start = routine.pc;

        let params = match routine.literals.get(param_index) {
            Some(Value::Array(array)) => (**array).clone(),
            _ => {
                return Err(RuntimeError::MalformedImage(
                    "function parameter collection missing".into(),
                ))
            }
        };
        let returns = match routine.literals.get(return_index) {
            Some(Value::Array(array)) => (**array).clone(),
            _ => {
                return Err(RuntimeError::MalformedImage(
                    "function return collection missing".into(),
                ))
            }
        };

        // a trailing (name, rest-marker) pair makes the function variadic
        let has_rest = params.len() >= 2
            && matches!(
                params.get(params.len() - 1),
                Some(Value::Type(ty)) if ty.tag == ValueTag::FunctionRest
            );
        let required = params.len() / 2 - usize::from(has_rest);

        if (!has_rest && arguments.len() != required)
            || (has_rest && arguments.len() < required)
        {
            return Err(RuntimeError::ArgumentCount(name.to_string()));
        }

        let fn_scope = self.scopes.push(Some(captured));

        let bind = self.bind_parameters(fn_scope, name, &params, &mut arguments, required);
        if let Err(error) = bind {
            self.unwind_scopes(fn_scope, captured);
            return Err(error);
        }
        if has_rest {
            if let Err(error) = self.bind_rest(fn_scope, name, &params, arguments) {
                self.unwind_scopes(fn_scope, captured);
                return Err(error);
            }
        }

        // frame switch
        let saved_scope = std::mem::replace(&mut self.scope, fn_scope);
        let saved_stack = std::mem::take(&mut self.stack);
        let saved_frames = std::mem::take(&mut self.index_frames);
        self.depth += 1;

        let outcome = self.execute(&mut routine);

        self.depth -= 1;
        let mut frame_stack = std::mem::replace(&mut self.stack, saved_stack);
        self.index_frames = saved_frames;
        let frame_scope = std::mem::replace(&mut self.scope, saved_scope);
        self.unwind_scopes(frame_scope, captured);

        outcome?;

        // one value surfaces to the caller; an empty stack yields null
        let result = frame_stack.pop_or_null();
        if let Some(Value::Type(expected)) = returns.get(0) {
            if expected.tag != ValueTag::Any && expected.tag != result.tag() {
                return Err(RuntimeError::BadReturnType(name.to_string()));
            }
        }
        Ok(result)
    }

    fn bind_parameters(
        &mut self,
        fn_scope: ScopeId,
        name: &str,
        params: &ValueArray,
        arguments: &mut Vec<Value>,
        required: usize,
    ) -> Result<(), RuntimeError> {
        for pair in 0..required {
            let identifier = match params.get(pair * 2) {
                Some(Value::Identifier(id)) => id.clone(),
                _ => {
                    return Err(RuntimeError::MalformedImage(
                        "parameter collection missing an identifier".into(),
                    ))
                }
            };
            let ty = match params.get(pair * 2 + 1) {
                Some(Value::Type(ty)) => ty.clone(),
                _ => {
                    return Err(RuntimeError::MalformedImage(
                        "parameter collection missing a type".into(),
                    ))
                }
            };
            if !self.scopes.declare(fn_scope, &identifier, ty) {
                return Err(RuntimeError::Internal(
                    "could not re-declare parameter".into(),
                ));
            }

            let mut argument = arguments.remove(0);
            // arguments are resolved in the caller's environment
            self.resolve_value(&mut argument)?;
            if !argument.is_null() {
                self.scopes
                    .set(fn_scope, &identifier, argument, false)
                    .map_err(|_| RuntimeError::ArgumentType(name.to_string()))?;
            }
        }
        Ok(())
    }

    fn bind_rest(
        &mut self,
        fn_scope: ScopeId,
        name: &str,
        params: &ValueArray,
        arguments: Vec<Value>,
    ) -> Result<(), RuntimeError> {
        let rest_identifier = match params.get(params.len() - 2) {
            Some(Value::Identifier(id)) => id.clone(),
            _ => {
                return Err(RuntimeError::MalformedImage(
                    "rest parameter missing an identifier".into(),
                ))
            }
        };

        let mut rest = ValueArray::with_capacity(arguments.len());
        for mut argument in arguments {
            self.resolve_value(&mut argument)?;
            rest.push(argument);
        }

        let rest_type = TypeValue::with_subtypes(
            ValueTag::Array,
            true,
            vec![TypeValue::new(ValueTag::Any, false)],
        );
        if !self.scopes.declare(fn_scope, &rest_identifier, rest_type) {
            return Err(RuntimeError::Internal(
                "could not declare rest parameter".into(),
            ));
        }
        self.scopes
            .set(fn_scope, &rest_identifier, Value::Array(Box::new(rest)), false)
            .map_err(|_| RuntimeError::ArgumentType(name.to_string()))
    }

    /// Pop scopes from `from` back down to (but excluding) `until`.
    fn unwind_scopes(&mut self, from: ScopeId, until: ScopeId) {
        let mut cursor = from;
        while cursor != until {
            match self.scopes.pop(cursor) {
                Some(parent) => cursor = parent,
                None => break,
            }
        }
    }

    // ==================== indexing ====================

    fn exec_index(&mut self, intermediate: bool) -> Result<(), RuntimeError> {
        let mut third = self.pop()?;
        let mut second = self.pop()?;
        let mut first = self.pop()?;
        let compound_raw = self.pop()?;

        let mut compound = compound_raw.clone();
        self.resolve_value(&mut compound)?;
        self.resolve_index_part(&mut first)?;
        self.resolve_index_part(&mut second)?;
        self.resolve_index_part(&mut third)?;

        let has_identifier = compound_raw.is_identifier();
        if intermediate {
            if has_identifier {
                self.stack.push(compound_raw);
            }
            self.stack.push(compound.clone());
            self.stack.push(first.clone());
            self.stack.push(second.clone());
            self.stack.push(third.clone());
            self.index_frames.push(has_identifier);
        }

        match index::read(&compound, &first, &second, &third) {
            Ok(value) => {
                self.stack.push(value);
                Ok(())
            }
            Err(error) => {
                if intermediate {
                    // retract the frame pushed above
                    for _ in 0..4 {
                        self.stack.pop();
                    }
                    if has_identifier {
                        self.stack.pop();
                    }
                    self.index_frames.pop();
                }
                Err(error)
            }
        }
    }

    fn resolve_index_part(&mut self, part: &mut Value) -> Result<(), RuntimeError> {
        if part.is_identifier() {
            self.resolve_value(part)?;
        }
        Ok(())
    }

    fn exec_index_assign(&mut self, routine: &mut Routine) -> Result<(), RuntimeError> {
        let qualifier = routine.read_u8()?;
        let Some(op) = AssignOp::from_qualifier(qualifier) else {
            return Err(RuntimeError::Internal(
                "bad qualifier after INDEX_ASSIGN".into(),
            ));
        };

        let assign = self.pop_resolved()?;
        let mut third = self.pop()?;
        let mut second = self.pop()?;
        let mut first = self.pop()?;
        let compound_raw = self.pop()?;

        let mut compound = compound_raw.clone();
        self.resolve_value(&mut compound)?;
        self.resolve_index_part(&mut first)?;
        self.resolve_index_part(&mut second)?;
        self.resolve_index_part(&mut third)?;

        let mut result = match index::write(compound, &first, &second, &third, &assign, op) {
            Ok(updated) => updated,
            Err(error) => {
                self.drain_index_frames();
                return Err(error);
            }
        };

        if let Value::Identifier(name) = &compound_raw {
            return self.assign_with_promotion(name, result);
        }

        // write back through any pending intermediate levels
        while let Some(frame_has_identifier) = self.index_frames.pop() {
            let outer_third = self.pop()?;
            let outer_second = self.pop()?;
            let outer_first = self.pop()?;
            let outer_compound = self.pop()?;

            result = match index::write(
                outer_compound,
                &outer_first,
                &outer_second,
                &outer_third,
                &result,
                AssignOp::Set,
            ) {
                Ok(updated) => updated,
                Err(error) => {
                    self.drain_index_frames();
                    return Err(error);
                }
            };

            if frame_has_identifier {
                let root = self.pop()?;
                let name = match root {
                    Value::Identifier(name) => name,
                    other => {
                        return Err(RuntimeError::NotAssignable(format::stringify(&other)))
                    }
                };
                return self.assign_with_promotion(&name, result);
            }
        }

        // no identifier anywhere in the chain: the update has no home
        Ok(())
    }

    /// Drop any intermediate index frames after a failure mid-chain.
    fn drain_index_frames(&mut self) {
        while let Some(has_identifier) = self.index_frames.pop() {
            for _ in 0..4 {
                self.stack.pop();
            }
            if has_identifier {
                self.stack.pop();
            }
        }
    }
}

fn arith_for(opcode: Opcode) -> ArithOp {
    match opcode {
        Opcode::Addition => ArithOp::Add,
        Opcode::Subtraction => ArithOp::Subtract,
        Opcode::Multiplication => ArithOp::Multiply,
        Opcode::Division => ArithOp::Divide,
        Opcode::Modulo => ArithOp::Modulo,
        _ => unreachable!("not an arithmetic opcode"),
    }
}

fn compound_arith_for(opcode: Opcode) -> ArithOp {
    match opcode {
        Opcode::VarAdditionAssign => ArithOp::Add,
        Opcode::VarSubtractionAssign => ArithOp::Subtract,
        Opcode::VarMultiplicationAssign => ArithOp::Multiply,
        Opcode::VarDivisionAssign => ArithOp::Divide,
        Opcode::VarModuloAssign => ArithOp::Modulo,
        _ => unreachable!("not a compound-assignment opcode"),
    }
}

fn numeric_as_f64(value: &Value) -> f64 {
    match value {
        Value::Integer(i) => f64::from(*i),
        Value::Float(f) => f64::from(*f),
        _ => f64::NAN,
    }
}

/// Parse a leading integer the way `sscanf("%d")` would: optional sign,
/// then digits; anything else yields 0.
fn parse_integer_prefix(text: &str) -> i32 {
    let trimmed = text.trim_start();
    let mut end = 0;
    for (position, c) in trimmed.char_indices() {
        if position == 0 && (c == '-' || c == '+') {
            end = position + c.len_utf8();
            continue;
        }
        if c.is_ascii_digit() {
            end = position + 1;
        } else {
            break;
        }
    }
    trimmed[..end].parse().unwrap_or(0)
}

/// Parse a leading float; anything unparseable yields 0.
fn parse_float_prefix(text: &str) -> f32 {
    let trimmed = text.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (position, c) in trimmed.char_indices() {
        if position == 0 && (c == '-' || c == '+') {
            end = position + c.len_utf8();
            continue;
        }
        if c.is_ascii_digit() {
            end = position + 1;
        } else if c == '.' && !seen_dot {
            seen_dot = true;
            end = position + 1;
        } else {
            break;
        }
    }
    trimmed[..end].parse().unwrap_or(0.0)
}
