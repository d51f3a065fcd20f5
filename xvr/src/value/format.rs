//! Value rendering for `print` and diagnostics
//!
//! Strings render bare at the top level but double-quoted inside
//! compounds; the empty dictionary renders as `[:]` to stay
//! distinguishable from the empty array.

use super::{TypeValue, Value, ValueTag};

/// Render a value the way `print` shows it.
pub fn stringify(value: &Value) -> String {
    render(value, false)
}

fn render(value: &Value, quote_strings: bool) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::String(s) => {
            if quote_strings {
                format!("\"{}\"", s.as_str())
            } else {
                s.as_str().into_owned()
            }
        }
        Value::Identifier(id) => id.name().into_owned(),
        Value::Array(array) => {
            let elements: Vec<String> =
                array.iter().map(|element| render(element, true)).collect();
            format!("[{}]", elements.join(","))
        }
        Value::Dictionary(dict) => {
            if dict.is_empty() {
                return "[:]".to_string();
            }
            let pairs: Vec<String> = dict
                .iter()
                .map(|(key, val)| format!("{}:{}", render(key, true), render(val, true)))
                .collect();
            format!("[{}]", pairs.join(","))
        }
        Value::Function(_) | Value::FunctionNative(_) | Value::FunctionHook(_) => {
            "(procedure)".to_string()
        }
        Value::Type(ty) => format!("<{}>", render_type(ty)),
        Value::Opaque(_) => "(opaque)".to_string(),
        Value::Any => "(any)".to_string(),
        Value::IndexBlank => "(blank)".to_string(),
        Value::RestArg => "(rest)".to_string(),
    }
}

fn render_type(ty: &TypeValue) -> String {
    let base = match ty.tag {
        ValueTag::Null => "null".to_string(),
        ValueTag::Boolean => "bool".to_string(),
        ValueTag::Integer => "int".to_string(),
        ValueTag::Float => "float".to_string(),
        ValueTag::String => "string".to_string(),
        ValueTag::Array => match ty.subtypes.first() {
            Some(element) => format!("[{}]", render_type(element)),
            None => "array".to_string(),
        },
        ValueTag::Dictionary => match (ty.subtypes.first(), ty.subtypes.get(1)) {
            (Some(key), Some(value)) => {
                format!("[{}:{}]", render_type(key), render_type(value))
            }
            _ => "dictionary".to_string(),
        },
        ValueTag::Function => "fn".to_string(),
        ValueTag::Opaque => "opaque".to_string(),
        ValueTag::Any => "any".to_string(),
        ValueTag::FunctionRest => "...".to_string(),
        other => format!("type:{}", other as u8),
    };

    if ty.constant {
        format!("{base} const")
    } else {
        base
    }
}

/// `%g`-flavored float rendering: whole floats keep one decimal place so
/// they stay visually distinct from integers.
pub fn format_float(f: f32) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f == f.trunc() && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}
