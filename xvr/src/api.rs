//! Host-facing entry points
//!
//! Thin functions that wire the pipeline together: compile source to an
//! image, run an image, or both in one call. Hosts embed the language
//! through these plus [`Interpreter::install_native`],
//! [`Interpreter::install_hook`], and [`Interpreter::call_fn`].

use xvr_parser::{parse, ParseError, UnusedChecker, UnusedWarning};

use crate::bytecode::BytecodeError;
use crate::compiler::{CompileError, Compiler};
use crate::vm::{Interpreter, RuntimeError};

/// Recognized source-file extension.
pub const SOURCE_EXTENSION: &str = "xvr";
/// Recognized bytecode-file extension.
pub const BYTECODE_EXTENSION: &str = "xb";

/// Any failure along the pipeline.
#[derive(Debug)]
pub enum XvrError {
    Parse(Vec<ParseError>),
    /// Unused-declaration warnings promoted to errors by configuration.
    FatalWarnings(Vec<UnusedWarning>),
    Compile(CompileError),
    Bytecode(BytecodeError),
    Runtime(RuntimeError),
    Serialize(String),
}

impl std::fmt::Display for XvrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            XvrError::Parse(errors) => {
                write!(f, "{} parse error(s)", errors.len())?;
                if let Some(first) = errors.first() {
                    write!(f, ": {first}")?;
                }
                Ok(())
            }
            XvrError::FatalWarnings(warnings) => {
                write!(f, "{} unused declaration(s)", warnings.len())?;
                if let Some(first) = warnings.first() {
                    write!(f, ": {first}")?;
                }
                Ok(())
            }
            XvrError::Compile(error) => write!(f, "compile error: {error}"),
            XvrError::Bytecode(error) => write!(f, "bytecode error: {error}"),
            XvrError::Runtime(error) => write!(f, "runtime error: {error}"),
            XvrError::Serialize(message) => write!(f, "serialization error: {message}"),
        }
    }
}

impl std::error::Error for XvrError {}

impl From<CompileError> for XvrError {
    fn from(error: CompileError) -> Self {
        XvrError::Compile(error)
    }
}

impl From<BytecodeError> for XvrError {
    fn from(error: BytecodeError) -> Self {
        XvrError::Bytecode(error)
    }
}

impl From<RuntimeError> for XvrError {
    fn from(error: RuntimeError) -> Self {
        XvrError::Runtime(error)
    }
}

/// Compile-time configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Treat unused-declaration warnings as errors.
    pub fatal_warnings: bool,
}

/// Compile source text to a bytecode image.
pub fn compile_str(source: &str) -> Result<Vec<u8>, XvrError> {
    compile_str_with(source, CompileOptions::default()).map(|(image, _)| image)
}

/// Compile source text, also surfacing unused-declaration warnings.
pub fn compile_str_with(
    source: &str,
    options: CompileOptions,
) -> Result<(Vec<u8>, Vec<UnusedWarning>), XvrError> {
    let (nodes, errors) = parse(source);
    if !errors.is_empty() {
        return Err(XvrError::Parse(errors.into_iter().collect()));
    }

    let warnings = UnusedChecker::check(&nodes);
    if options.fatal_warnings && !warnings.is_empty() {
        return Err(XvrError::FatalWarnings(warnings));
    }

    let mut compiler = Compiler::new();
    for node in nodes {
        compiler.write(node)?;
    }
    let image = compiler.collate()?;
    Ok((image, warnings))
}

/// Run a compiled image.
pub fn run_bytes(interpreter: &mut Interpreter, image: Vec<u8>) -> Result<(), XvrError> {
    interpreter.run(image)?;
    Ok(())
}

/// Compile and run source text in one step.
pub fn run_str(interpreter: &mut Interpreter, source: &str) -> Result<(), XvrError> {
    let image = compile_str(source)?;
    run_bytes(interpreter, image)
}

/// Parse source and dump the AST as JSON (host tooling and debugging).
pub fn parse_to_json(source: &str) -> Result<String, XvrError> {
    let (nodes, errors) = parse(source);
    if !errors.is_empty() {
        return Err(XvrError::Parse(errors.into_iter().collect()));
    }
    serde_json::to_string_pretty(&nodes).map_err(|e| XvrError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_str_produces_an_image() {
        let image = compile_str("print 1;").expect("compiles");
        assert!(!image.is_empty());
    }

    #[test]
    fn test_parse_errors_surface() {
        assert!(matches!(
            compile_str("var = ;"),
            Err(XvrError::Parse(_))
        ));
    }

    #[test]
    fn test_fatal_warnings_gate() {
        let options = CompileOptions {
            fatal_warnings: true,
        };
        assert!(matches!(
            compile_str_with("var unused = 1;", options),
            Err(XvrError::FatalWarnings(_))
        ));
        // same source passes without the gate
        assert!(compile_str("var unused = 1;").is_ok());
    }

    #[test]
    fn test_parse_to_json() {
        let json = parse_to_json("print 1 + 2;").expect("serializes");
        assert!(json.contains("Print"));
        assert!(json.contains("Binary"));
    }
}
