//! Identifier rules for entity types, transformation function names and
//! target model identifiers.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Maximum identifier length (PostgreSQL's identifier limit minus one).
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"));

/// Validate a snake_case identifier such as `"variant_product"`.
///
/// `kind` names the thing being validated and is used in the error message.
///
/// ```
/// use syncbridge_core::naming::validate_identifier;
///
/// assert!(validate_identifier("entity type", "customer").is_ok());
/// assert!(validate_identifier("entity type", "Customer").is_err());
/// ```
pub fn validate_identifier(kind: &str, value: &str) -> Result<(), CoreError> {
    if value.is_empty() {
        return Err(CoreError::Validation(format!("{kind} cannot be empty")));
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CoreError::Validation(format!(
            "{kind} exceeds maximum length of {MAX_IDENTIFIER_LENGTH} characters"
        )));
    }
    if !IDENTIFIER_RE.is_match(value) {
        return Err(CoreError::Validation(format!(
            "Invalid {kind} '{value}': must be lowercase snake_case starting with a letter"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_snake_case() {
        assert!(validate_identifier("entity type", "variant_product").is_ok());
        assert!(validate_identifier("entity type", "widget2").is_ok());
    }

    #[test]
    fn rejects_empty() {
        let err = validate_identifier("entity type", "").unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn rejects_leading_digit_and_uppercase() {
        assert!(validate_identifier("model", "1widget").is_err());
        assert!(validate_identifier("model", "Widget").is_err());
        assert!(validate_identifier("model", "app.Widget").is_err());
    }

    #[test]
    fn rejects_overlong() {
        let name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(validate_identifier("function name", &name).is_err());
    }
}
