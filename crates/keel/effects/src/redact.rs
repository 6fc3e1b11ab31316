//! Secret redaction (`redact-secrets-v1`).
//!
//! Applied to every artifact a handler emits before it is serialized or
//! digested, so no emitted artifact can carry a credential.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Replacement text for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Object keys whose values are always redacted.
static SENSITIVE_KEYS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(secret|password|passwd|token)",
        r"(?i)(api[_-]?key|authorization|credential|private[_-]?key|signature)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Secret-looking substrings inside otherwise harmless string values.
static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"sk-[a-zA-Z0-9\-_]{20,}",
        r"AKIA[A-Z0-9]{16}",
        r"gh[pousr]_[A-Za-z0-9_]{36,}",
        r"(?i)bearer\s+[a-zA-Z0-9_.=\-]+",
        r"-----BEGIN\s+(RSA\s+)?PRIVATE\s+KEY-----",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Return a copy of `value` with sensitive keys and secret-looking strings
/// replaced by [`REDACTED`].
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, inner) in map {
                if SENSITIVE_KEYS.iter().any(|re| re.is_match(key)) {
                    out.insert(key.clone(), Value::String(REDACTED.into()));
                } else {
                    out.insert(key.clone(), redact_value(inner));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::String(s) => Value::String(redact_str(s)),
        other => other.clone(),
    }
}

fn redact_str(s: &str) -> String {
    let mut out = s.to_string();
    for pattern in SECRET_PATTERNS.iter() {
        if pattern.is_match(&out) {
            out = pattern.replace_all(&out, REDACTED).into_owned();
        }
    }
    out
}
