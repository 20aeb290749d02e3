//! Built-in field transforms.
//!
//! Each transform coerces one value with best-effort, default-on-failure
//! semantics: it never errors. `to_int` on an unparsable value yields `0`,
//! `to_float` yields `0.0`, `to_boolean` yields `false`.

use serde_json::Value;

pub const TO_UPPERCASE: &str = "to_uppercase";
pub const TO_LOWERCASE: &str = "to_lowercase";
pub const TO_BOOLEAN: &str = "to_boolean";
pub const TO_INT: &str = "to_int";
pub const TO_FLOAT: &str = "to_float";

/// Names reserved for built-in transforms.
pub const BUILTIN_NAMES: &[&str] = &[TO_UPPERCASE, TO_LOWERCASE, TO_BOOLEAN, TO_INT, TO_FLOAT];

/// String values treated as `true` by [`to_boolean`] (compared
/// case-insensitively after trimming). Includes the German "ja" used by
/// the legacy ERP exports.
const TRUTHY_STRINGS: &[&str] = &["true", "1", "yes", "y", "on", "t", "ja", "j", "x"];

/// Whether `name` refers to a built-in transform.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Apply a built-in transform. Returns `None` if `name` is not a built-in.
pub fn apply(name: &str, value: &Value) -> Option<Value> {
    let out = match name {
        TO_UPPERCASE => map_text(value, |s| s.to_uppercase()),
        TO_LOWERCASE => map_text(value, |s| s.to_lowercase()),
        TO_BOOLEAN => Value::Bool(to_boolean(value)),
        TO_INT => Value::from(to_int(value)),
        TO_FLOAT => serde_json::Number::from_f64(to_float(value))
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(0)),
        _ => return None,
    };
    Some(out)
}

/// Case conversion applies to strings and to the text form of scalars.
/// `null`, arrays and objects pass through unchanged.
fn map_text(value: &Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        Value::Number(n) => Value::String(f(&n.to_string())),
        Value::Bool(b) => Value::String(f(&b.to_string())),
        other => other.clone(),
    }
}

/// Best-effort boolean coercion.
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let lowered = s.trim().to_lowercase();
            TRUTHY_STRINGS.contains(&lowered.as_str())
        }
        _ => false,
    }
}

/// Best-effort integer coercion. Floats are truncated toward zero.
pub fn to_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| parse_decimal(trimmed).map(|f| f.trunc() as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Best-effort float coercion. Non-finite results collapse to `0.0`.
pub fn to_float(value: &Value) -> f64 {
    let f = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => parse_decimal(s.trim()).unwrap_or(0.0),
        _ => 0.0,
    };
    if f.is_finite() {
        f
    } else {
        0.0
    }
}

/// Parse a decimal number, accepting a comma as the decimal separator when
/// no dot is present (`"3,5"` -> `3.5`).
fn parse_decimal(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    let normalized = if s.contains(',') && !s.contains('.') {
        s.replace(',', ".")
    } else {
        s.to_string()
    };
    normalized.parse::<f64>().ok().filter(|f| f.is_finite())
}
