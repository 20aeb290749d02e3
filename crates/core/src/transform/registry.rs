//! Run-scoped registry of compiled transformation functions.

use std::collections::HashMap;

use serde_json::Value;

use super::{builtin, compile, Program, TransformFunctionError};
use crate::error::CoreError;
use crate::naming::validate_identifier;

/// Validate a custom transformation function's name: snake_case and not
/// shadowing a built-in transform.
pub fn validate_function_name(name: &str) -> Result<(), CoreError> {
    validate_identifier("function name", name)?;
    if builtin::is_builtin(name) {
        return Err(CoreError::Validation(format!(
            "'{name}' is a built-in transform and cannot be redefined"
        )));
    }
    Ok(())
}

/// Named transforms available to the field mapping resolver during one run.
///
/// Lookup order for [`execute`](Self::execute): built-in transforms, then
/// registered functions, then identity.
#[derive(Debug, Default, Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Program>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register one function, replacing any previous definition.
    pub fn register(&mut self, name: &str, source: &str) -> Result<(), TransformFunctionError> {
        let program = compile(source)?;
        self.functions.insert(name.to_string(), program);
        Ok(())
    }

    /// Build a registry from stored `(name, code)` pairs.
    ///
    /// Functions that no longer compile are logged and left out, so fields
    /// referencing them fall back to identity.
    pub fn from_functions<'a>(functions: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut registry = Self::new();
        for (name, code) in functions {
            if let Err(e) = registry.register(name, code) {
                tracing::warn!(function = name, error = %e, "Skipping transformation function that fails to compile");
            }
        }
        registry
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Apply the named transform to `value`.
    ///
    /// Never fails: a custom function that errors is logged and the input is
    /// returned unchanged, so a broken function degrades to a no-op on that
    /// field instead of failing the record or the run.
    pub fn execute(&self, name: &str, value: &Value) -> Value {
        if let Some(out) = builtin::apply(name, value) {
            return out;
        }
        let Some(program) = self.functions.get(name) else {
            return value.clone();
        };
        match program.run(value) {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(function = name, error = %e, "Transformation function failed, keeping original value");
                value.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builtin_takes_precedence() {
        let registry = FunctionRegistry::new();
        assert_eq!(registry.execute("to_uppercase", &json!("abc")), json!("ABC"));
    }

    #[test]
    fn unknown_name_is_identity() {
        let registry = FunctionRegistry::new();
        assert_eq!(registry.execute("no_such_fn", &json!(5)), json!(5));
    }

    #[test]
    fn custom_function_runs() {
        let mut registry = FunctionRegistry::new();
        registry
            .register("prefix_sku", "result = \"SKU-\" + value")
            .unwrap();
        assert_eq!(registry.execute("prefix_sku", &json!("1")), json!("SKU-1"));
    }

    #[test]
    fn runtime_failure_returns_input() {
        let mut registry = FunctionRegistry::new();
        registry.register("halve", "result = value / 2").unwrap();
        assert_eq!(registry.execute("halve", &json!("text")), json!("text"));
    }

    #[test]
    fn from_functions_skips_broken_code() {
        let registry =
            FunctionRegistry::from_functions([("ok", "result = value"), ("broken", "result = (")]);
        assert!(registry.contains("ok"));
        assert!(!registry.contains("broken"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.execute("broken", &json!("x")), json!("x"));
    }

    #[test]
    fn builtin_names_are_reserved() {
        assert!(validate_function_name("to_int").is_err());
        assert!(validate_function_name("strip_zeros").is_ok());
        assert!(validate_function_name("Strip").is_err());
    }
}
