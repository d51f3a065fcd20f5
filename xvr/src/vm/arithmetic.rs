//! Arithmetic over values
//!
//! Mixed int/float operands promote to float; `+` concatenates strings;
//! division by zero and float modulo are errors.

use super::error::RuntimeError;
use crate::value::{format, RefString, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

pub fn value_arithmetic(op: ArithOp, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    // string concatenation, on + only
    if let (Value::String(left), Value::String(right)) = (lhs, rhs) {
        if op == ArithOp::Add {
            return RefString::concat(left, right)
                .map(Value::String)
                .ok_or(RuntimeError::StringTooLong);
        }
    }

    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => integer_arithmetic(op, *a, *b),
        (Value::Integer(a), Value::Float(b)) => float_arithmetic(op, *a as f32, *b),
        (Value::Float(a), Value::Integer(b)) => float_arithmetic(op, *a, *b as f32),
        (Value::Float(a), Value::Float(b)) => float_arithmetic(op, *a, *b),
        _ => Err(RuntimeError::BadArithmetic {
            left: format::stringify(lhs),
            right: format::stringify(rhs),
        }),
    }
}

fn integer_arithmetic(op: ArithOp, a: i32, b: i32) -> Result<Value, RuntimeError> {
    Ok(Value::Integer(match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Subtract => a.wrapping_sub(b),
        ArithOp::Multiply => a.wrapping_mul(b),
        ArithOp::Divide => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        ArithOp::Modulo => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
    }))
}

fn float_arithmetic(op: ArithOp, a: f32, b: f32) -> Result<Value, RuntimeError> {
    Ok(Value::Float(match op {
        ArithOp::Add => a + b,
        ArithOp::Subtract => a - b,
        ArithOp::Multiply => a * b,
        ArithOp::Divide => {
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            a / b
        }
        ArithOp::Modulo => return Err(RuntimeError::FloatModulo),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_math() {
        assert_eq!(
            value_arithmetic(ArithOp::Add, &Value::Integer(2), &Value::Integer(3)),
            Ok(Value::Integer(5))
        );
        assert_eq!(
            value_arithmetic(ArithOp::Modulo, &Value::Integer(7), &Value::Integer(3)),
            Ok(Value::Integer(1))
        );
    }

    #[test]
    fn test_mixed_operands_promote_to_float() {
        assert_eq!(
            value_arithmetic(ArithOp::Multiply, &Value::Integer(2), &Value::Float(1.5)),
            Ok(Value::Float(3.0))
        );
        assert_eq!(
            value_arithmetic(ArithOp::Subtract, &Value::Float(2.5), &Value::Integer(1)),
            Ok(Value::Float(1.5))
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            value_arithmetic(ArithOp::Divide, &Value::Integer(1), &Value::Integer(0)),
            Err(RuntimeError::DivisionByZero)
        );
        assert_eq!(
            value_arithmetic(ArithOp::Divide, &Value::Float(1.0), &Value::Float(0.0)),
            Err(RuntimeError::DivisionByZero)
        );
    }

    #[test]
    fn test_float_modulo_rejected() {
        assert_eq!(
            value_arithmetic(ArithOp::Modulo, &Value::Float(1.0), &Value::Float(2.0)),
            Err(RuntimeError::FloatModulo)
        );
    }

    #[test]
    fn test_string_concat_on_add_only() {
        assert_eq!(
            value_arithmetic(ArithOp::Add, &Value::string("foo"), &Value::string("bar")),
            Ok(Value::string("foobar"))
        );
        assert!(matches!(
            value_arithmetic(ArithOp::Subtract, &Value::string("a"), &Value::string("b")),
            Err(RuntimeError::BadArithmetic { .. })
        ));
    }

    #[test]
    fn test_oversized_concat_refused() {
        let big = Value::String(RefString::new(&vec![b'a'; 3000]));
        assert_eq!(
            value_arithmetic(ArithOp::Add, &big, &big),
            Err(RuntimeError::StringTooLong)
        );
    }
}
