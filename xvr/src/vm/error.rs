//! Runtime errors raised during interpretation.

/// How an error affects the running program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The offending opcode is abandoned (a null lands on the stack) and
    /// execution continues.
    Recoverable,
    /// The current frame unwinds and the panic flag is raised.
    Frame,
    /// The whole run terminates.
    Fatal,
}

/// Runtime errors that can occur during VM execution.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    AssertionFailed(String),
    StackUnderflow,
    RecursionLimit,
    VersionMismatch(String),
    TruncatedImage,
    UnknownOpcode(u8),
    MalformedImage(String),
    UndeclaredVariable(String),
    Redeclaration(String),
    ConstAssignment(String),
    TypeMismatch(String),
    BadArithmetic { left: String, right: String },
    DivisionByZero,
    FloatModulo,
    StringTooLong,
    NotNegatable(String),
    NotInvertible(String),
    BadComparison(String),
    NullCondition,
    BadCast(String),
    CastNull,
    AssertMessageType(String),
    FunctionNotFound(String),
    NotCallable(String),
    ArgumentCount(String),
    ArgumentType(String),
    BadReturnType(String),
    UnknownImport(String),
    HookFailed(String),
    NotAssignable(String),
    InvalidDictionaryKey(String),
    BadIndexTarget(String),
    BadIndex(String),
    IndexOutOfBounds { index: i32, length: usize },
    NativeFailure(String),
    Internal(String),
}

impl RuntimeError {
    /// Classify per the failure-semantics contract: indexing errors are
    /// locally recoverable; assertions, stack underflow, the recursion
    /// limit, and version mismatches end the run; everything else unwinds
    /// the frame.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RuntimeError::BadIndexTarget(_)
            | RuntimeError::BadIndex(_)
            | RuntimeError::IndexOutOfBounds { .. } => ErrorSeverity::Recoverable,

            RuntimeError::AssertionFailed(_)
            | RuntimeError::StackUnderflow
            | RuntimeError::RecursionLimit
            | RuntimeError::VersionMismatch(_)
            | RuntimeError::TruncatedImage
            | RuntimeError::UnknownOpcode(_)
            | RuntimeError::MalformedImage(_) => ErrorSeverity::Fatal,

            _ => ErrorSeverity::Frame,
        }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AssertionFailed(msg) => write!(f, "assertion failure: {msg}"),
            Self::StackUnderflow => write!(f, "stack underflow"),
            Self::RecursionLimit => write!(f, "infinite recursion detected"),
            Self::VersionMismatch(msg) => write!(f, "{msg}"),
            Self::TruncatedImage => write!(f, "truncated bytecode image"),
            Self::UnknownOpcode(byte) => write!(f, "unknown opcode {byte}, terminating"),
            Self::MalformedImage(msg) => write!(f, "malformed bytecode: {msg}"),
            Self::UndeclaredVariable(name) => write!(f, "undeclared variable \"{name}\""),
            Self::Redeclaration(name) => write!(f, "can't redefine \"{name}\""),
            Self::ConstAssignment(name) => {
                write!(f, "can't assign to const variable \"{name}\"")
            }
            Self::TypeMismatch(name) => {
                write!(f, "incorrect type assigned to variable \"{name}\"")
            }
            Self::BadArithmetic { left, right } => {
                write!(f, "bad arithmetic arguments {left} and {right}")
            }
            Self::DivisionByZero => write!(f, "can't divide by zero"),
            Self::FloatModulo => write!(f, "modulo on floats is not allowed"),
            Self::StringTooLong => {
                write!(f, "can't concatenate these strings, result is too long")
            }
            Self::NotNegatable(value) => write!(f, "can't negate that value: {value}"),
            Self::NotInvertible(value) => write!(f, "can't invert that value: {value}"),
            Self::BadComparison(value) => {
                write!(f, "incorrect type in comparison, value \"{value}\"")
            }
            Self::NullCondition => write!(f, "null detected in condition"),
            Self::BadCast(target) => write!(f, "unknown cast target: {target}"),
            Self::CastNull => write!(f, "can't cast a null value"),
            Self::AssertMessageType(value) => write!(
                f,
                "assert needs a string as its second argument, received: {value}"
            ),
            Self::FunctionNotFound(name) => write!(f, "function not found: {name}"),
            Self::NotCallable(name) => write!(f, "\"{name}\" is not callable"),
            Self::ArgumentCount(name) => write!(
                f,
                "incorrect number of arguments passed to function \"{name}\""
            ),
            Self::ArgumentType(name) => {
                write!(f, "bad argument type passed to function \"{name}\"")
            }
            Self::BadReturnType(name) => {
                write!(f, "bad type found in return value of \"{name}\"")
            }
            Self::UnknownImport(name) => {
                write!(f, "unknown library name in import statement: {name}")
            }
            Self::HookFailed(name) => write!(f, "import hook failed for \"{name}\""),
            Self::NotAssignable(value) => {
                write!(f, "can't assign to a non-variable \"{value}\"")
            }
            Self::InvalidDictionaryKey(key) => {
                write!(f, "invalid dictionary key: {key}")
            }
            Self::BadIndexTarget(value) => {
                write!(f, "unknown compound in indexing notation: {value}")
            }
            Self::BadIndex(msg) => write!(f, "bad index: {msg}"),
            Self::IndexOutOfBounds { index, length } => {
                write!(f, "index {index} out of bounds (length {length})")
            }
            Self::NativeFailure(name) => write!(f, "error from native function \"{name}\""),
            Self::Internal(msg) => write!(f, "[internal] {msg}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_classes() {
        assert_eq!(
            RuntimeError::IndexOutOfBounds {
                index: 9,
                length: 2
            }
            .severity(),
            ErrorSeverity::Recoverable
        );
        assert_eq!(
            RuntimeError::AssertionFailed("boom".into()).severity(),
            ErrorSeverity::Fatal
        );
        assert_eq!(
            RuntimeError::RecursionLimit.severity(),
            ErrorSeverity::Fatal
        );
        assert_eq!(
            RuntimeError::UndeclaredVariable("x".into()).severity(),
            ErrorSeverity::Frame
        );
        assert_eq!(
            RuntimeError::DivisionByZero.severity(),
            ErrorSeverity::Frame
        );
    }

    #[test]
    fn test_display_carries_the_name() {
        let err = RuntimeError::UndeclaredVariable("ghost".into());
        assert!(err.to_string().contains("ghost"));
    }
}
