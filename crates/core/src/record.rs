//! Untyped record shapes flowing through the pipeline.

use serde_json::Value;

/// One row read from the legacy source: string keys to arbitrary JSON values.
pub type LegacyRecord = serde_json::Map<String, Value>;

/// Transformed field values ready for field-by-field assignment onto a
/// target record.
pub type TargetFields = serde_json::Map<String, Value>;

/// Default name of the legacy identity field.
pub const DEFAULT_IDENTITY_FIELD: &str = "__KEY";

/// Whether a value counts as "empty" for optional-field skipping.
///
/// `null` and the empty string are empty; whitespace-only strings, `0` and
/// `false` are real values.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Read the legacy identifier of a record.
///
/// Strings are trimmed; integers and floats are rendered without quotes.
/// Returns `None` when the field is absent, blank, or not a scalar, which
/// marks the record as unidentifiable.
pub fn legacy_id(record: &LegacyRecord, identity_field: &str) -> Option<String> {
    match record.get(identity_field)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
