//! Virtual machine instruction set
//!
//! Single-byte opcodes with opcode-specific operands (1- or 2-byte pool
//! indices, 2-byte absolute jump targets, and a 1-byte qualifier after
//! `INDEX_ASSIGN`). Values are explicit and append-only to preserve
//! binary compatibility.

/// VM opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// End of the instruction stream.
    Eof = 0,
    /// No-op statement.
    Pass = 1,
    /// Pops {condition, message}; panics with the message if falsy.
    Assert = 2,
    /// Pops a value and routes it to the print callback.
    Print = 3,
    /// Push pool\[u8 operand\].
    Literal = 4,
    /// Push pool\[u16 operand\].
    LiteralLong = 5,
    /// Pop, resolve identifier to value, push.
    LiteralRaw = 6,
    /// \[x\] -> \[-x\], numbers only.
    Negate = 7,
    Addition = 8,
    Subtraction = 9,
    Multiplication = 10,
    Division = 11,
    Modulo = 12,
    /// \[identifier, rhs\] -> \[\]; compound assignment on a variable.
    VarAdditionAssign = 13,
    VarSubtractionAssign = 14,
    VarMultiplicationAssign = 15,
    VarDivisionAssign = 16,
    VarModuloAssign = 17,
    /// Execute the enclosed region recursively.
    GroupingBegin = 18,
    GroupingEnd = 19,
    /// Push a fresh scope frame.
    ScopeBegin = 20,
    /// Pop the innermost scope frame.
    ScopeEnd = 21,
    /// Operands: u8 identifier index, u8 type index. Pops initial value.
    VarDecl = 22,
    /// Operands: u16 identifier index, u16 type index.
    VarDeclLong = 23,
    /// Operands: u8 identifier index, u8 function index.
    FnDecl = 24,
    /// Operands: u16 identifier index, u16 function index.
    FnDeclLong = 25,
    /// \[identifier, value\] -> \[\].
    VarAssign = 26,
    /// \[type, value\] -> \[cast value\].
    TypeCast = 27,
    /// \[value\] -> \[type literal\].
    TypeOf = 28,
    CompareEqual = 29,
    CompareNotEqual = 30,
    CompareLess = 31,
    CompareLessEqual = 32,
    CompareGreater = 33,
    CompareGreaterEqual = 34,
    /// Boolean negation.
    Invert = 35,
    /// Boolean and; both sides already evaluated.
    And = 36,
    /// Boolean or; both sides already evaluated.
    Or = 37,
    /// Operand: u16 absolute offset from the start of the code section.
    Jump = 38,
    /// Pops the condition; jumps when falsy. Operand as for `Jump`.
    IfFalseJump = 39,
    /// \[identifier, args..., count\] -> \[result\].
    FnCall = 40,
    /// Method-style call: \[receiver, identifier, args..., count\]; the
    /// receiver becomes the first argument and the callee name gains a
    /// leading underscore.
    Dot = 41,
    /// Ends the current frame; remaining stack values are the returns.
    FnReturn = 42,
    /// Drain the value stack (loop tails).
    PopStack = 43,
    /// \[identifier, alias\] -> \[\]; invokes a registered hook.
    Import = 44,
    /// \[compound, first, second, third\] -> \[element or slice\].
    Index = 45,
    /// As `Index` plus a trailing 1-byte assignment qualifier.
    IndexAssign = 46,
    /// Nested-assignment link: keeps the resolved compound and its index
    /// components on the stack for the next level.
    IndexAssignIntermediate = 47,
    /// Function boundary marker inside the function section.
    FnEnd = 48,
    /// Section terminator.
    SectionEnd = 255,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        Ok(match byte {
            0 => Opcode::Eof,
            1 => Opcode::Pass,
            2 => Opcode::Assert,
            3 => Opcode::Print,
            4 => Opcode::Literal,
            5 => Opcode::LiteralLong,
            6 => Opcode::LiteralRaw,
            7 => Opcode::Negate,
            8 => Opcode::Addition,
            9 => Opcode::Subtraction,
            10 => Opcode::Multiplication,
            11 => Opcode::Division,
            12 => Opcode::Modulo,
            13 => Opcode::VarAdditionAssign,
            14 => Opcode::VarSubtractionAssign,
            15 => Opcode::VarMultiplicationAssign,
            16 => Opcode::VarDivisionAssign,
            17 => Opcode::VarModuloAssign,
            18 => Opcode::GroupingBegin,
            19 => Opcode::GroupingEnd,
            20 => Opcode::ScopeBegin,
            21 => Opcode::ScopeEnd,
            22 => Opcode::VarDecl,
            23 => Opcode::VarDeclLong,
            24 => Opcode::FnDecl,
            25 => Opcode::FnDeclLong,
            26 => Opcode::VarAssign,
            27 => Opcode::TypeCast,
            28 => Opcode::TypeOf,
            29 => Opcode::CompareEqual,
            30 => Opcode::CompareNotEqual,
            31 => Opcode::CompareLess,
            32 => Opcode::CompareLessEqual,
            33 => Opcode::CompareGreater,
            34 => Opcode::CompareGreaterEqual,
            35 => Opcode::Invert,
            36 => Opcode::And,
            37 => Opcode::Or,
            38 => Opcode::Jump,
            39 => Opcode::IfFalseJump,
            40 => Opcode::FnCall,
            41 => Opcode::Dot,
            42 => Opcode::FnReturn,
            43 => Opcode::PopStack,
            44 => Opcode::Import,
            45 => Opcode::Index,
            46 => Opcode::IndexAssign,
            47 => Opcode::IndexAssignIntermediate,
            48 => Opcode::FnEnd,
            255 => Opcode::SectionEnd,
            other => return Err(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for byte in 0u8..=48 {
            let opcode = Opcode::try_from(byte).expect("valid opcode");
            assert_eq!(opcode as u8, byte);
        }
        assert_eq!(Opcode::try_from(255), Ok(Opcode::SectionEnd));
        assert!(Opcode::try_from(49).is_err());
        assert!(Opcode::try_from(200).is_err());
    }
}
