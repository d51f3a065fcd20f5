// Prevent accidental debug output in library code; the default output
// callbacks carry their own targeted allows.
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]

//! Bytecode compiler and stack interpreter for the Xvr scripting language
//!
//! The pipeline: source text is parsed by the `xvr_parser` crate, the
//! [`compiler::Compiler`] lowers the AST into a compact bytecode image,
//! and the [`vm::Interpreter`] executes that image. Hosts extend the
//! language with native functions and import hooks.
//!
//! ```
//! use xvr::api;
//! use xvr::vm::Interpreter;
//!
//! let mut interpreter = Interpreter::new();
//! interpreter.set_print(|_text| { /* capture output */ });
//! api::run_str(&mut interpreter, "print 1 + 2;").expect("runs");
//! ```

pub mod api;
pub mod bytecode;
pub mod compiler;
pub mod opcode;
pub mod scope;
pub mod value;
pub mod vm;

pub use api::{
    compile_str, compile_str_with, parse_to_json, run_bytes, run_str, CompileOptions, XvrError,
};
pub use bytecode::{VERSION_BUILD, VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH};
pub use compiler::{CompileError, Compiler};
pub use opcode::Opcode;
pub use scope::{ScopeArena, ScopeId};
pub use value::{
    HookFn, Identifier, NativeFn, OpaqueValue, RefString, TypeValue, Value, ValueArray,
    ValueDictionary, ValueTag, MAX_STRING_LENGTH,
};
pub use vm::{Interpreter, RuntimeError, MAX_RECURSION_DEPTH};
