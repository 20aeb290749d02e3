//! Field transforms: built-in coercions and operator-authored
//! transformation functions.
//!
//! Transformation functions are written in a small expression language
//! instead of a general-purpose interpreter. A program sees the input as
//! `value` and must assign its output to `result`:
//!
//! ```text
//! let cleaned = trim(value)
//! result = if cleaned == "" { null } else { upper(cleaned) }
//! ```
//!
//! The language has no loops, no I/O and a fixed function whitelist, and
//! evaluation is bounded by [`MAX_EVAL_STEPS`]. A failing program never
//! aborts a sync: [`FunctionRegistry::execute`] logs the error and returns
//! the input unchanged.

pub mod builtin;
mod eval;
mod lexer;
mod parser;
pub mod registry;

use serde_json::Value;

pub use eval::{INPUT_BINDING, RESULT_BINDING};
pub use registry::FunctionRegistry;

/// Maximum length of a transformation function's source text, in bytes.
pub const MAX_FUNCTION_SOURCE_LENGTH: usize = 16 * 1024;

/// Maximum expression nesting accepted by the parser.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Maximum number of expression evaluations per invocation.
pub const MAX_EVAL_STEPS: usize = 10_000;

/// Errors raised while compiling or running a transformation function.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformFunctionError {
    #[error("Syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Function did not assign a value to '{RESULT_BINDING}'")]
    MissingResult,

    #[error("Evaluation exceeded {limit} steps")]
    BudgetExceeded { limit: usize },
}

/// A compiled transformation function.
#[derive(Debug, Clone)]
pub struct Program {
    stmts: Vec<parser::Stmt>,
}

impl Program {
    /// Evaluate the program with `value` bound to the input.
    pub fn run(&self, value: &Value) -> Result<Value, TransformFunctionError> {
        eval::Evaluator::new(value.clone()).run(&self.stmts)
    }
}

/// Parse and check a transformation function's source.
///
/// This is the write-time validator: code that compiles here can only fail
/// at runtime on value-dependent errors (type mismatches, division by zero,
/// a missing `result` binding on some branch).
pub fn compile(source: &str) -> Result<Program, TransformFunctionError> {
    if source.len() > MAX_FUNCTION_SOURCE_LENGTH {
        return Err(TransformFunctionError::Syntax {
            line: 1,
            message: format!(
                "source exceeds maximum length of {MAX_FUNCTION_SOURCE_LENGTH} bytes"
            ),
        });
    }
    let tokens = lexer::tokenize(source)?;
    let stmts = parser::parse(tokens)?;
    if !stmts
        .iter()
        .any(|s| matches!(s, parser::Stmt::Bind(name, _) if name == RESULT_BINDING))
    {
        return Err(TransformFunctionError::Syntax {
            line: 1,
            message: format!("function never assigns '{RESULT_BINDING}'"),
        });
    }
    Ok(Program { stmts })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn run(source: &str, value: Value) -> Result<Value, TransformFunctionError> {
        compile(source)?.run(&value)
    }

    // -- compile ------------------------------------------------------------

    #[test]
    fn compile_requires_result_assignment() {
        let err = compile("let x = value").unwrap_err();
        assert_matches!(err, TransformFunctionError::Syntax { message, .. }
            if message.contains("never assigns 'result'"));
    }

    #[test]
    fn compile_rejects_oversized_source() {
        let src = format!("result = \"{}\"", "a".repeat(MAX_FUNCTION_SOURCE_LENGTH));
        assert!(compile(&src).is_err());
    }

    // -- arithmetic and strings --------------------------------------------

    #[test]
    fn identity_program() {
        assert_eq!(run("result = value", json!("K1")).unwrap(), json!("K1"));
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(run("result = value * 2 + 1", json!(20)).unwrap(), json!(41));
        assert_eq!(run("result = value / 2", json!(10)).unwrap(), json!(5));
    }

    #[test]
    fn inexact_division_yields_float() {
        assert_eq!(run("result = value / 4", json!(10)).unwrap(), json!(2.5));
    }

    #[test]
    fn plus_concatenates_with_strings() {
        assert_eq!(
            run("result = \"SKU-\" + value", json!(17)).unwrap(),
            json!("SKU-17")
        );
    }

    #[test]
    fn division_by_zero_is_runtime_error() {
        assert_matches!(
            run("result = value / 0", json!(1)),
            Err(TransformFunctionError::Runtime(_))
        );
    }

    #[test]
    fn integer_overflow_edges_are_runtime_errors() {
        for src in [
            "result = value / -1",
            "result = value % -1",
            "result = -value",
            "result = value - 1",
            "result = abs(value)",
        ] {
            assert_matches!(
                run(src, json!(i64::MIN)),
                Err(TransformFunctionError::Runtime(msg)) if msg.contains("overflow"),
                "{src}"
            );
        }
    }

    #[test]
    fn min_value_divides_exactly_by_one() {
        assert_eq!(run("result = value / 1", json!(i64::MIN)).unwrap(), json!(i64::MIN));
    }

    // -- control flow -------------------------------------------------------

    #[test]
    fn if_else_expression() {
        let src = r#"
            let cleaned = trim(value)
            result = if cleaned == "" { null } else { upper(cleaned) }
        "#;
        assert_eq!(run(src, json!("  abc ")).unwrap(), json!("ABC"));
        assert_eq!(run(src, json!("   ")).unwrap(), json!(null));
    }

    #[test]
    fn short_circuit_skips_failing_branch() {
        assert_eq!(
            run("result = false && (1 / 0)", json!(null)).unwrap(),
            json!(false)
        );
    }

    #[test]
    fn runtime_error_before_result_assignment() {
        let src = "if value { 1 } else { 2 }\nresult = 1";
        assert!(run(src, json!(true)).is_ok());
        // Assignment exists but a runtime error precedes it.
        assert_matches!(
            run("let x = missing\nresult = 1", json!(1)),
            Err(TransformFunctionError::Runtime(msg)) if msg.contains("undefined variable")
        );
    }

    // -- nested values ------------------------------------------------------

    #[test]
    fn index_into_objects_and_arrays() {
        let value = json!({"dims": [10, 20, 30], "name": "Widget"});
        assert_eq!(
            run("result = value[\"dims\"][-1]", value.clone()).unwrap(),
            json!(30)
        );
        assert_eq!(run("result = value[\"missing\"]", value).unwrap(), json!(null));
    }

    // -- function library ---------------------------------------------------

    #[test]
    fn string_functions() {
        assert_eq!(
            run("result = replace(lower(value), \" \", \"_\")", json!("Red Shoe")).unwrap(),
            json!("red_shoe")
        );
        assert_eq!(
            run("result = substr(value, 0, 3)", json!("ABC-1")).unwrap(),
            json!("ABC")
        );
        assert_eq!(
            run("result = join(split(value, \";\"), \",\")", json!("a;b;c")).unwrap(),
            json!("a,b,c")
        );
    }

    #[test]
    fn conversion_functions() {
        assert_eq!(run("result = int(value)", json!(" 12 ")).unwrap(), json!(12));
        assert_eq!(run("result = round(value, 1)", json!(2.345)).unwrap(), json!(2.3));
        assert_eq!(run("result = round(value)", json!(2.5)).unwrap(), json!(3));
        assert_matches!(
            run("result = int(value)", json!("twelve")),
            Err(TransformFunctionError::Runtime(_))
        );
    }

    #[test]
    fn coalesce_and_default() {
        assert_eq!(
            run("result = coalesce(value, \"n/a\")", json!("")).unwrap(),
            json!("n/a")
        );
        assert_eq!(
            run("result = default(value, 0)", json!(null)).unwrap(),
            json!(0)
        );
    }

    #[test]
    fn min_max_and_contains() {
        assert_eq!(run("result = max(value, 3, 9)", json!(5)).unwrap(), json!(9));
        assert_eq!(run("result = min(value, 3, 9)", json!(5)).unwrap(), json!(3));
        assert_eq!(
            run("result = contains([\"a\", \"b\"], value)", json!("b")).unwrap(),
            json!(true)
        );
    }
}
