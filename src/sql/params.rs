//! Text forms of values for binding; the SQL side casts each parameter to its column type.

use crate::value::Scalar;
use serde_json::Value;
use std::fmt::Write;

/// Body value as bind text. `None` binds SQL NULL.
pub fn json_bind_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(v.to_string()),
    }
}

/// Stored value as bind text. Bytes use the `\x` hex form accepted by `bytea`.
pub fn scalar_bind_text(v: &Scalar) -> Option<String> {
    match v {
        Scalar::Bytes(b) => {
            let mut s = String::with_capacity(2 + b.len() * 2);
            s.push_str("\\x");
            for byte in b {
                let _ = write!(s, "{:02x}", byte);
            }
            Some(s)
        }
        Scalar::Decimal(d) => Some(d.to_string()),
        other => other.to_text(),
    }
}
