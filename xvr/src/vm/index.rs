//! Indexing and slicing
//!
//! Implements `compound[first:second:third]` reads and writes over
//! arrays, dictionaries, and strings. All components arrive resolved
//! (identifiers already looked up); dictionaries use `first` as a direct
//! key, arrays and strings follow the slice rules:
//!
//! - a missing (null) `second` selects a single element;
//! - a blank `first` defaults to the start of the run, a blank `second`
//!   to its end (to `first` for assignments);
//! - `third` is the step, defaulting to 1; 0 is an error; negative steps
//!   walk backwards.

use super::arithmetic::{value_arithmetic, ArithOp};
use super::error::RuntimeError;
use crate::opcode::Opcode;
use crate::value::{format, RefString, Value, ValueArray, MAX_STRING_LENGTH};

/// The assignment qualifier carried by `INDEX_ASSIGN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl AssignOp {
    /// Decode the 1-byte qualifier (the var-assign opcode byte).
    pub fn from_qualifier(byte: u8) -> Option<AssignOp> {
        Some(match Opcode::try_from(byte).ok()? {
            Opcode::VarAssign => AssignOp::Set,
            Opcode::VarAdditionAssign => AssignOp::Add,
            Opcode::VarSubtractionAssign => AssignOp::Subtract,
            Opcode::VarMultiplicationAssign => AssignOp::Multiply,
            Opcode::VarDivisionAssign => AssignOp::Divide,
            Opcode::VarModuloAssign => AssignOp::Modulo,
            _ => return None,
        })
    }

    fn arith(self) -> Option<ArithOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(ArithOp::Add),
            AssignOp::Subtract => Some(ArithOp::Subtract),
            AssignOp::Multiply => Some(ArithOp::Multiply),
            AssignOp::Divide => Some(ArithOp::Divide),
            AssignOp::Modulo => Some(ArithOp::Modulo),
        }
    }
}

fn expect_integer(value: &Value, what: &str) -> Result<i32, RuntimeError> {
    match value {
        Value::Integer(i) => Ok(*i),
        other => Err(RuntimeError::BadIndex(format!(
            "{what} must be an integer, got {}",
            format::stringify(other)
        ))),
    }
}

/// Decode the step component; null and blank default to 1, zero is an
/// error.
fn decode_step(third: &Value) -> Result<i32, RuntimeError> {
    let step = match third {
        Value::Null | Value::IndexBlank => 1,
        other => expect_integer(other, "slice step")?,
    };
    if step == 0 {
        return Err(RuntimeError::BadIndex("slice step may not be zero".into()));
    }
    Ok(step)
}

/// Decode slice bounds against a collection of `length` elements,
/// producing (start, stop) where iteration runs from `start` toward
/// `stop` exclusive, stepping by `step`.
fn decode_bounds(
    first: &Value,
    second: &Value,
    step: i32,
    length: usize,
) -> Result<(i64, i64), RuntimeError> {
    let length = length as i64;

    let start = match first {
        Value::IndexBlank | Value::Null => {
            if step > 0 {
                0
            } else {
                length - 1
            }
        }
        other => i64::from(expect_integer(other, "slice start")?),
    };
    let stop = match second {
        Value::IndexBlank => {
            if step > 0 {
                length
            } else {
                -1
            }
        }
        other => i64::from(expect_integer(other, "slice end")?),
    };

    if step > 0 {
        if start < 0 || start > length || stop < 0 || stop > length {
            return Err(RuntimeError::BadIndex(format!(
                "slice bounds {start}:{stop} out of range for length {length}"
            )));
        }
    } else if start < 0 || start >= length || stop < -1 || stop > length {
        return Err(RuntimeError::BadIndex(format!(
            "slice bounds {start}:{stop} out of range for length {length}"
        )));
    }

    Ok((start, stop))
}

fn slice_positions(start: i64, stop: i64, step: i32) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut cursor = start;
    if step > 0 {
        while cursor < stop {
            positions.push(cursor as usize);
            cursor += i64::from(step);
        }
    } else {
        while cursor > stop {
            positions.push(cursor as usize);
            cursor += i64::from(step);
        }
    }
    positions
}

/// Read `compound[first:second:third]`.
pub fn read(
    compound: &Value,
    first: &Value,
    second: &Value,
    third: &Value,
) -> Result<Value, RuntimeError> {
    match compound {
        Value::Dictionary(dict) => Ok(dict.get(first)),

        Value::Array(array) => {
            if second.is_null() {
                let index = expect_integer(first, "index")?;
                return array
                    .get_copy(index_in_bounds(index, array.len())?)
                    .ok_or(RuntimeError::IndexOutOfBounds {
                        index,
                        length: array.len(),
                    });
            }
            let step = decode_step(third)?;
            let (start, stop) = decode_bounds(first, second, step, array.len())?;
            let mut result = ValueArray::new();
            for position in slice_positions(start, stop, step) {
                if let Some(element) = array.get_copy(position) {
                    result.push(element);
                }
            }
            Ok(Value::Array(Box::new(result)))
        }

        Value::String(string) => {
            let bytes = string.as_bytes();
            if second.is_null() {
                let index = expect_integer(first, "index")?;
                let position = index_in_bounds(index, bytes.len())?;
                return Ok(Value::String(RefString::new(&bytes[position..=position])));
            }
            let step = decode_step(third)?;
            let (start, stop) = decode_bounds(first, second, step, bytes.len())?;
            let selected: Vec<u8> = slice_positions(start, stop, step)
                .into_iter()
                .map(|position| bytes[position])
                .collect();
            Ok(Value::String(RefString::new(&selected)))
        }

        other => Err(RuntimeError::BadIndexTarget(format::stringify(other))),
    }
}

fn index_in_bounds(index: i32, length: usize) -> Result<usize, RuntimeError> {
    if index < 0 || index as usize >= length {
        return Err(RuntimeError::IndexOutOfBounds { index, length });
    }
    Ok(index as usize)
}

/// Apply `compound[first:second:third] op= assign`, returning the updated
/// compound.
pub fn write(
    compound: Value,
    first: &Value,
    second: &Value,
    third: &Value,
    assign: &Value,
    op: AssignOp,
) -> Result<Value, RuntimeError> {
    match compound {
        Value::Dictionary(mut dict) => {
            let new_value = match op.arith() {
                None => assign.clone(),
                Some(arith) => {
                    let current = dict.get(first);
                    value_arithmetic(arith, &current, assign)?
                }
            };
            if !dict.set(first.clone(), new_value) {
                return Err(RuntimeError::BadIndex(format!(
                    "invalid dictionary key: {}",
                    format::stringify(first)
                )));
            }
            Ok(Value::Dictionary(dict))
        }

        Value::Array(mut array) => {
            if second.is_null() {
                let index = expect_integer(first, "index")?;
                let position = index_in_bounds(index, array.len())?;
                let new_value = match op.arith() {
                    None => assign.clone(),
                    Some(arith) => {
                        let current = array.get_copy(position).unwrap_or(Value::Null);
                        value_arithmetic(arith, &current, assign)?
                    }
                };
                array.set(position, new_value);
                return Ok(Value::Array(array));
            }

            if op != AssignOp::Set {
                return Err(RuntimeError::BadIndex(
                    "compound assignment requires a single index".into(),
                ));
            }

            let step = decode_step(third)?;
            let start = expect_integer(
                &match first {
                    Value::IndexBlank => Value::Integer(0),
                    other => other.clone(),
                },
                "slice start",
            )?;
            // blank end means "just the start element" when assigning
            let stop = match second {
                Value::IndexBlank => start,
                other => expect_integer(other, "slice end")?,
            };
            if start < 0 || stop < start || stop as usize >= array.len() {
                return Err(RuntimeError::BadIndex(format!(
                    "slice bounds {start}:{stop} out of range for length {}",
                    array.len()
                )));
            }

            if step == 1 || step == -1 {
                // splice: replace the inclusive range with the assigned
                // elements (reversed for a negative step)
                let mut result = ValueArray::new();
                for position in 0..start as usize {
                    result.push(array.get_copy(position).unwrap_or(Value::Null));
                }
                match assign {
                    Value::Array(elements) => {
                        let mut incoming: Vec<Value> = elements.iter().cloned().collect();
                        if step < 0 {
                            incoming.reverse();
                        }
                        for element in incoming {
                            result.push(element);
                        }
                    }
                    single => result.push(single.clone()),
                }
                for position in (stop as usize + 1)..array.len() {
                    result.push(array.get_copy(position).unwrap_or(Value::Null));
                }
                Ok(Value::Array(Box::new(result)))
            } else {
                // strided overwrite in place
                let Value::Array(elements) = assign else {
                    return Err(RuntimeError::BadIndex(
                        "strided slice assignment needs an array".into(),
                    ));
                };
                let mut cursor = i64::from(start);
                let mut incoming = elements.iter();
                while cursor >= i64::from(start.min(stop))
                    && cursor <= i64::from(stop.max(start))
                {
                    let Some(next) = incoming.next() else {
                        break;
                    };
                    array.set(cursor as usize, next.clone());
                    cursor += i64::from(step);
                    if cursor < 0 {
                        break;
                    }
                }
                Ok(Value::Array(array))
            }
        }

        Value::String(string) => {
            let bytes = string.as_bytes();

            // whole-string append survives any index shape
            if op == AssignOp::Add {
                let Value::String(suffix) = assign else {
                    return Err(RuntimeError::BadIndex(
                        "string append needs a string".into(),
                    ));
                };
                return RefString::concat(&string, suffix)
                    .map(Value::String)
                    .ok_or(RuntimeError::StringTooLong);
            }
            if op != AssignOp::Set {
                return Err(RuntimeError::BadIndex(
                    "unsupported compound assignment on a string".into(),
                ));
            }

            let Value::String(replacement) = assign else {
                return Err(RuntimeError::BadIndex(
                    "string assignment needs a string".into(),
                ));
            };

            if second.is_null() {
                let index = expect_integer(first, "index")?;
                let position = index_in_bounds(index, bytes.len())?;
                if replacement.len() != 1 {
                    return Err(RuntimeError::BadIndex(
                        "single-byte assignment needs a one-character string".into(),
                    ));
                }
                let mut updated = bytes.to_vec();
                updated[position] = replacement.as_bytes()[0];
                return Ok(Value::String(RefString::new(&updated)));
            }

            let step = decode_step(third)?;
            let start = expect_integer(
                &match first {
                    Value::IndexBlank => Value::Integer(0),
                    other => other.clone(),
                },
                "slice start",
            )?;
            let stop = match second {
                Value::IndexBlank => start,
                other => expect_integer(other, "slice end")?,
            };
            if start < 0 || stop < start || stop as usize >= bytes.len() {
                return Err(RuntimeError::BadIndex(format!(
                    "slice bounds {start}:{stop} out of range for length {}",
                    bytes.len()
                )));
            }

            if step == 1 || step == -1 {
                let mut updated = Vec::with_capacity(bytes.len());
                updated.extend_from_slice(&bytes[..start as usize]);
                let mut incoming = replacement.as_bytes().to_vec();
                if step < 0 {
                    incoming.reverse();
                }
                updated.extend_from_slice(&incoming);
                updated.extend_from_slice(&bytes[stop as usize + 1..]);
                if updated.len() > MAX_STRING_LENGTH {
                    return Err(RuntimeError::StringTooLong);
                }
                Ok(Value::String(RefString::new(&updated)))
            } else {
                let mut updated = bytes.to_vec();
                let mut cursor = i64::from(start);
                let mut incoming = replacement.as_bytes().iter();
                while cursor >= i64::from(start.min(stop))
                    && cursor <= i64::from(stop.max(start))
                {
                    let Some(byte) = incoming.next() else {
                        break;
                    };
                    updated[cursor as usize] = *byte;
                    cursor += i64::from(step);
                    if cursor < 0 {
                        break;
                    }
                }
                Ok(Value::String(RefString::new(&updated)))
            }
        }

        other => Err(RuntimeError::BadIndexTarget(format::stringify(&other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueDictionary;

    fn int_array(values: &[i32]) -> Value {
        Value::Array(Box::new(
            values.iter().map(|i| Value::Integer(*i)).collect(),
        ))
    }

    fn blank() -> Value {
        Value::IndexBlank
    }

    #[test]
    fn test_single_element_read() {
        let a = int_array(&[10, 20, 30]);
        assert_eq!(
            read(&a, &Value::Integer(1), &Value::Null, &Value::Null),
            Ok(Value::Integer(20))
        );
        assert!(matches!(
            read(&a, &Value::Integer(3), &Value::Null, &Value::Null),
            Err(RuntimeError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            read(&a, &Value::Integer(-1), &Value::Null, &Value::Null),
            Err(RuntimeError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_full_slice_is_identity() {
        let a = int_array(&[1, 2, 3, 4]);
        let sliced = read(&a, &Value::Integer(0), &Value::Integer(4), &Value::Integer(1))
            .expect("slice");
        assert_eq!(sliced, a);
    }

    #[test]
    fn test_reverse_slice() {
        let a = int_array(&[1, 2, 3, 4]);
        let reversed = read(&a, &Value::Integer(3), &blank(), &Value::Integer(-1))
            .expect("slice");
        assert_eq!(reversed, int_array(&[4, 3, 2, 1]));
    }

    #[test]
    fn test_blank_defaults() {
        let a = int_array(&[1, 2, 3, 4]);
        // a[:2] -> [1,2]
        assert_eq!(
            read(&a, &blank(), &Value::Integer(2), &Value::Null).expect("slice"),
            int_array(&[1, 2])
        );
        // a[2:] -> [3,4]
        assert_eq!(
            read(&a, &Value::Integer(2), &blank(), &Value::Null).expect("slice"),
            int_array(&[3, 4])
        );
        // a[::2] -> [1,3]
        assert_eq!(
            read(&a, &blank(), &blank(), &Value::Integer(2)).expect("slice"),
            int_array(&[1, 3])
        );
    }

    #[test]
    fn test_zero_step_is_an_error() {
        let a = int_array(&[1, 2, 3]);
        assert!(read(&a, &blank(), &blank(), &Value::Integer(0)).is_err());
    }

    #[test]
    fn test_string_read() {
        let s = Value::string("hello");
        assert_eq!(
            read(&s, &Value::Integer(1), &Value::Null, &Value::Null),
            Ok(Value::string("e"))
        );
        assert_eq!(
            read(&s, &Value::Integer(1), &Value::Integer(4), &Value::Null),
            Ok(Value::string("ell"))
        );
        assert_eq!(
            read(&s, &Value::Integer(4), &blank(), &Value::Integer(-1)),
            Ok(Value::string("olleh"))
        );
    }

    #[test]
    fn test_dictionary_read_and_write() {
        let mut dict = ValueDictionary::new();
        dict.set(Value::string("k"), Value::Integer(1));
        let d = Value::Dictionary(Box::new(dict));

        assert_eq!(
            read(&d, &Value::string("k"), &Value::Null, &Value::Null),
            Ok(Value::Integer(1))
        );
        assert_eq!(
            read(&d, &Value::string("missing"), &Value::Null, &Value::Null),
            Ok(Value::Null)
        );

        let updated = write(
            d,
            &Value::string("k"),
            &Value::Null,
            &Value::Null,
            &Value::Integer(5),
            AssignOp::Add,
        )
        .expect("write");
        assert_eq!(
            read(&updated, &Value::string("k"), &Value::Null, &Value::Null),
            Ok(Value::Integer(6))
        );
    }

    #[test]
    fn test_single_element_write_with_compound_op() {
        let a = int_array(&[1, 2, 3]);
        let updated = write(
            a,
            &Value::Integer(1),
            &Value::Null,
            &Value::Null,
            &Value::Integer(10),
            AssignOp::Multiply,
        )
        .expect("write");
        assert_eq!(updated, int_array(&[1, 20, 3]));
    }

    #[test]
    fn test_splice_assignment() {
        // a[1:2] = [9] collapses two elements into one
        let a = int_array(&[1, 2, 3, 4]);
        let updated = write(
            a,
            &Value::Integer(1),
            &Value::Integer(2),
            &Value::Null,
            &int_array(&[9]),
            AssignOp::Set,
        )
        .expect("write");
        assert_eq!(updated, int_array(&[1, 9, 4]));
    }

    #[test]
    fn test_strided_assignment_overwrites_in_place() {
        let a = int_array(&[1, 2, 3, 4, 5]);
        let updated = write(
            a,
            &Value::Integer(0),
            &Value::Integer(4),
            &Value::Integer(2),
            &int_array(&[10, 30, 50]),
            AssignOp::Set,
        )
        .expect("write");
        assert_eq!(updated, int_array(&[10, 2, 30, 4, 50]));
    }

    #[test]
    fn test_string_splice() {
        let s = Value::string("abcd");
        let updated = write(
            s,
            &Value::Integer(1),
            &Value::Integer(2),
            &Value::Null,
            &Value::string("XY"),
            AssignOp::Set,
        )
        .expect("write");
        assert_eq!(updated, Value::string("aXYd"));
    }

    #[test]
    fn test_non_compound_target() {
        assert!(matches!(
            read(&Value::Integer(1), &Value::Integer(0), &Value::Null, &Value::Null),
            Err(RuntimeError::BadIndexTarget(_))
        ));
    }
}
