//! Built-in native functions
//!
//! Installed at every reset: `_set`, `_get`, `_push`, `_pop`, `_length`,
//! `_clear`. They are reached from scripts through the dot form
//! (`arr.push(v)` dispatches to `_push(arr, v)`), which is why mutating
//! natives expect their first argument to still be an identifier: the
//! updated compound is stored back through the scope.

use super::Interpreter;
use crate::scope::SetError;
use crate::value::{format, Identifier, Value, ValueArray, ValueDictionary, ValueTag};

fn report(interp: &mut Interpreter, message: &str) -> i32 {
    interp.emit_error(message);
    -1
}

fn expect_identifier(value: &Value) -> Option<Identifier> {
    match value {
        Value::Identifier(id) => Some(id.clone()),
        _ => None,
    }
}

/// Check a candidate element against the declared element type of the
/// target array (if any).
fn element_type_allows(interp: &Interpreter, target: &Identifier, element: &Value) -> bool {
    let Some(ty) = interp.declared_type(target) else {
        return true;
    };
    if ty.tag != ValueTag::Array {
        return true;
    }
    match ty.subtypes.first() {
        Some(subtype) => crate::scope::matches_type(element, subtype),
        None => true,
    }
}

fn store_back(interp: &mut Interpreter, name: &Identifier, value: Value) -> Result<(), SetError> {
    interp.assign_variable(name, value)
}

/// `_set(compound, key, value)`
pub fn native_set(interp: &mut Interpreter, args: &mut ValueArray) -> i32 {
    if args.len() != 3 {
        return report(interp, "incorrect number of arguments to _set");
    }
    let Some(name) = expect_identifier(args.get(0).expect("arity checked")) else {
        return report(interp, "expected identifier in _set");
    };
    let mut key = args.get_copy(1).expect("arity checked");
    let mut val = args.get_copy(2).expect("arity checked");
    if interp.resolve_value(&mut key).is_err() || interp.resolve_value(&mut val).is_err() {
        return -1;
    }

    let Some(mut obj) = interp.variable_value(&name) else {
        return report(interp, "undeclared compound in _set");
    };

    match &mut obj {
        Value::Array(array) => {
            if !element_type_allows(interp, &name, &val) {
                return report(interp, "bad argument type in _set");
            }
            let Value::Integer(index) = key else {
                return report(interp, "expected integer index in _set");
            };
            if index < 0 || index as usize >= array.len() {
                return report(interp, "index out of bounds in _set");
            }
            array.set(index as usize, val);
        }
        Value::Dictionary(dict) => {
            if let Some(ty) = interp.declared_type(&name) {
                if ty.tag == ValueTag::Dictionary && ty.subtypes.len() == 2 {
                    if !crate::scope::matches_type(&key, &ty.subtypes[0])
                        || !crate::scope::matches_type(&val, &ty.subtypes[1])
                    {
                        return report(interp, "bad argument type in _set");
                    }
                }
            }
            if !dict.set(key, val) {
                return report(interp, "invalid dictionary key in _set");
            }
        }
        other => {
            let rendered = format::stringify(other);
            return report(interp, &format!("incorrect compound type in _set: {rendered}"));
        }
    }

    match store_back(interp, &name, obj) {
        Ok(()) => 0,
        Err(_) => report(interp, "incorrect type assigned in _set"),
    }
}

/// `_get(compound, key)`
pub fn native_get(interp: &mut Interpreter, args: &mut ValueArray) -> i32 {
    if args.len() != 2 {
        return report(interp, "incorrect number of arguments to _get");
    }
    let mut obj = args.get_copy(0).expect("arity checked");
    let mut key = args.get_copy(1).expect("arity checked");
    if interp.resolve_value(&mut obj).is_err() || interp.resolve_value(&mut key).is_err() {
        return -1;
    }

    match obj {
        Value::Array(array) => {
            let Value::Integer(index) = key else {
                return report(interp, "expected integer index in _get");
            };
            if index < 0 || index as usize >= array.len() {
                return report(interp, "index out of bounds in _get");
            }
            let element = array.get_copy(index as usize).expect("bounds checked");
            interp.push_value(element);
            1
        }
        Value::Dictionary(dict) => {
            let element = dict.get(&key);
            interp.push_value(element);
            1
        }
        other => {
            let rendered = format::stringify(&other);
            report(interp, &format!("incorrect compound type in _get: {rendered}"))
        }
    }
}

/// `_push(array, value)`
pub fn native_push(interp: &mut Interpreter, args: &mut ValueArray) -> i32 {
    if args.len() != 2 {
        return report(interp, "incorrect number of arguments to _push");
    }
    let Some(name) = expect_identifier(args.get(0).expect("arity checked")) else {
        return report(interp, "expected identifier in _push");
    };
    let mut val = args.get_copy(1).expect("arity checked");
    if interp.resolve_value(&mut val).is_err() {
        return -1;
    }

    let Some(mut obj) = interp.variable_value(&name) else {
        return report(interp, "undeclared compound in _push");
    };

    match &mut obj {
        Value::Array(array) => {
            if !element_type_allows(interp, &name, &val) {
                return report(interp, "bad argument type in _push");
            }
            array.push(val);
        }
        other => {
            let rendered = format::stringify(other);
            return report(
                interp,
                &format!("incorrect compound type in _push: {rendered}"),
            );
        }
    }

    match store_back(interp, &name, obj) {
        Ok(()) => 0,
        Err(_) => report(interp, "incorrect type assigned in _push"),
    }
}

/// `_pop(array)`
pub fn native_pop(interp: &mut Interpreter, args: &mut ValueArray) -> i32 {
    if args.len() != 1 {
        return report(interp, "incorrect number of arguments to _pop");
    }
    let Some(name) = expect_identifier(args.get(0).expect("arity checked")) else {
        return report(interp, "expected identifier in _pop");
    };

    let Some(mut obj) = interp.variable_value(&name) else {
        return report(interp, "undeclared compound in _pop");
    };

    match &mut obj {
        Value::Array(array) => {
            let element = array.pop_or_null();
            interp.push_value(element);
        }
        other => {
            let rendered = format::stringify(other);
            return report(interp, &format!("incorrect compound type in _pop: {rendered}"));
        }
    }

    match store_back(interp, &name, obj) {
        Ok(()) => 1,
        Err(_) => report(interp, "incorrect type assigned in _pop"),
    }
}

/// `_length(compound)`
pub fn native_length(interp: &mut Interpreter, args: &mut ValueArray) -> i32 {
    if args.len() != 1 {
        return report(interp, "incorrect number of arguments to _length");
    }
    let mut obj = args.get_copy(0).expect("arity checked");
    if interp.resolve_value(&mut obj).is_err() {
        return -1;
    }

    let length = match obj {
        Value::Array(array) => array.len(),
        Value::Dictionary(dict) => dict.len(),
        Value::String(string) => string.len(),
        other => {
            let rendered = format::stringify(&other);
            return report(
                interp,
                &format!("incorrect compound type in _length: {rendered}"),
            );
        }
    };
    interp.push_value(Value::Integer(length as i32));
    1
}

/// `_clear(compound)`
pub fn native_clear(interp: &mut Interpreter, args: &mut ValueArray) -> i32 {
    if args.len() != 1 {
        return report(interp, "incorrect number of arguments to _clear");
    }
    let Some(name) = expect_identifier(args.get(0).expect("arity checked")) else {
        return report(interp, "expected identifier in _clear");
    };

    let Some(obj) = interp.variable_value(&name) else {
        return report(interp, "undeclared compound in _clear");
    };

    let fresh = match obj {
        Value::Array(_) => Value::Array(Box::new(ValueArray::new())),
        Value::Dictionary(_) => Value::Dictionary(Box::new(ValueDictionary::new())),
        other => {
            let rendered = format::stringify(&other);
            return report(
                interp,
                &format!("incorrect compound type in _clear: {rendered}"),
            );
        }
    };

    match store_back(interp, &name, fresh) {
        Ok(()) => 0,
        Err(_) => report(interp, "incorrect type assigned in _clear"),
    }
}

/// Install the fixed set of built-ins into the current (root) scope.
pub fn install_defaults(interp: &mut Interpreter) {
    interp.install_native("_set", native_set);
    interp.install_native("_get", native_get);
    interp.install_native("_push", native_push);
    interp.install_native("_pop", native_pop);
    interp.install_native("_length", native_length);
    interp.install_native("_clear", native_clear);
}

// the natives are exercised end to end (dot dispatch included) by the
// crate-level interpreter tests in tests/e2e.rs
