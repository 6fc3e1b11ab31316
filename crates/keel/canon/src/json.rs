use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonError;

/// Serialize a value to canonical JSON.
///
/// Object keys are sorted by code point, separators are `,` and `:` with no
/// surrounding whitespace, and every character outside printable ASCII is
/// written as a `\uXXXX` escape (UTF-16 units, lowercase hex). Key order is
/// imposed here rather than inherited from the map type behind
/// [`serde_json::Value`].
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonError> {
    let value = serde_json::to_value(value)?;
    Ok(canonical_value_string(&value))
}

/// Canonical JSON as bytes (the digest input).
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonError> {
    canonical_json(value).map(String::into_bytes)
}

/// Canonical encoding of an already-built JSON value. Infallible.
pub fn canonical_value_string(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key]);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04x}", unit);
                }
            }
        }
    }
    out.push('"');
}
