//! Mapping configuration model and the field mapping resolver.
//!
//! A [`MappingConfig`] describes, for one entity type, which legacy table to
//! read, which target model to write, and how each legacy field maps onto a
//! target field. The stored JSON shape of the field map is:
//!
//! ```json
//! { "Art_Nr": { "new_field": "product_sku", "transform": "to_uppercase", "required": true } }
//! ```
//!
//! Key order is significant and preserved.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::record::{is_blank, LegacyRecord, TargetFields, DEFAULT_IDENTITY_FIELD};
use crate::transform::FunctionRegistry;

/// Maximum number of field rules in one mapping configuration.
pub const MAX_FIELD_MAPPINGS: usize = 200;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How one legacy field maps onto the target record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(rename = "new_field", alias = "target_field")]
    pub target_field: String,
    #[serde(
        rename = "transform",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transform_name: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// Ordered legacy field name -> rule map.
pub type FieldMappings = IndexMap<String, FieldRule>;

/// The resolved configuration for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingConfig {
    pub entity_type: String,
    pub legacy_table: String,
    pub target_model: String,
    /// Legacy field holding the record's identifier.
    #[serde(default = "default_identity_field")]
    pub identity_field: String,
    pub field_mappings: FieldMappings,
    pub is_active: bool,
}

fn default_identity_field() -> String {
    DEFAULT_IDENTITY_FIELD.to_string()
}

impl MappingConfig {
    /// Transform names referenced by the field rules, in rule order.
    pub fn referenced_transforms(&self) -> impl Iterator<Item = &str> {
        self.field_mappings
            .values()
            .filter_map(|rule| rule.transform_name.as_deref())
    }
}

/// A legacy record could not be converted into target fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordTransformError {
    #[error("Required field '{field}' is missing")]
    MissingRequired { field: String },
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a stored `field_mappings` JSON value and parse it.
///
/// Rejects non-objects, more than [`MAX_FIELD_MAPPINGS`] rules, rules without
/// a non-empty `new_field`, non-string `transform`, non-boolean `required`,
/// and two legacy fields writing the same target field.
pub fn validate_field_mappings(value: &Value) -> Result<FieldMappings, CoreError> {
    let Some(obj) = value.as_object() else {
        return Err(CoreError::Validation(
            "Field mappings must be a JSON object".to_string(),
        ));
    };
    if obj.is_empty() {
        return Err(CoreError::Validation(
            "Field mappings must contain at least one rule".to_string(),
        ));
    }
    if obj.len() > MAX_FIELD_MAPPINGS {
        return Err(CoreError::Validation(format!(
            "Field mappings exceed maximum of {MAX_FIELD_MAPPINGS} rules"
        )));
    }

    let mut mappings = FieldMappings::with_capacity(obj.len());
    let mut targets: IndexMap<&str, &str> = IndexMap::new();

    for (legacy_field, rule) in obj {
        if legacy_field.trim().is_empty() {
            return Err(CoreError::Validation(
                "Legacy field names cannot be empty".to_string(),
            ));
        }
        let Some(rule_obj) = rule.as_object() else {
            return Err(CoreError::Validation(format!(
                "Rule for '{legacy_field}' must be a JSON object"
            )));
        };
        let target = rule_obj
            .get("new_field")
            .or_else(|| rule_obj.get("target_field"))
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if target.is_empty() {
            return Err(CoreError::Validation(format!(
                "Rule for '{legacy_field}' is missing 'new_field'"
            )));
        }
        if let Some(t) = rule_obj.get("transform") {
            if !(t.is_null() || t.is_string()) {
                return Err(CoreError::Validation(format!(
                    "Rule for '{legacy_field}' has a non-string 'transform'"
                )));
            }
        }
        if let Some(r) = rule_obj.get("required") {
            if !r.is_boolean() {
                return Err(CoreError::Validation(format!(
                    "Rule for '{legacy_field}' has a non-boolean 'required'"
                )));
            }
        }
        if let Some(previous) = targets.insert(target, legacy_field) {
            return Err(CoreError::Validation(format!(
                "Target field '{target}' is mapped from both '{previous}' and '{legacy_field}'"
            )));
        }

        let parsed: FieldRule = serde_json::from_value(rule.clone()).map_err(|e| {
            CoreError::Validation(format!("Invalid rule for '{legacy_field}': {e}"))
        })?;
        let parsed = FieldRule {
            target_field: target.to_string(),
            transform_name: parsed
                .transform_name
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            required: parsed.required,
        };
        mappings.insert(legacy_field.clone(), parsed);
    }

    Ok(mappings)
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Converts legacy records into target field maps.
///
/// Pure apart from invoking transformation functions, which themselves
/// never fail (see [`FunctionRegistry::execute`]).
pub struct FieldMappingResolver<'a> {
    functions: &'a FunctionRegistry,
}

impl<'a> FieldMappingResolver<'a> {
    pub fn new(functions: &'a FunctionRegistry) -> Self {
        Self { functions }
    }

    /// Apply `config.field_mappings` to one legacy record, in rule order.
    ///
    /// - Absent field: skipped, unless the rule is required.
    /// - `null` or `""`: skipped when optional so partial records never
    ///   overwrite existing target values with blanks. A required field keeps
    ///   its blank value and goes through the transform like any other.
    /// - Otherwise the named transform is applied (identity when unnamed or
    ///   unknown) and written under the rule's target field.
    pub fn transform(
        &self,
        record: &LegacyRecord,
        config: &MappingConfig,
    ) -> Result<TargetFields, RecordTransformError> {
        let mut out = TargetFields::new();
        for (legacy_field, rule) in &config.field_mappings {
            let Some(value) = record.get(legacy_field) else {
                if rule.required {
                    return Err(RecordTransformError::MissingRequired {
                        field: legacy_field.clone(),
                    });
                }
                continue;
            };
            if is_blank(value) && !rule.required {
                continue;
            }
            let transformed = match rule.transform_name.as_deref() {
                Some(name) => self.functions.execute(name, value),
                None => value.clone(),
            };
            out.insert(rule.target_field.clone(), transformed);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn widget_config() -> MappingConfig {
        let mappings = validate_field_mappings(&json!({
            "Art_Nr": { "new_field": "product_sku", "required": true },
            "Bezeichnung": { "new_field": "name", "transform": "to_uppercase" },
            "Preis": { "new_field": "price", "transform": "to_float" },
            "Aktiv": { "new_field": "is_active", "transform": "to_boolean" }
        }))
        .unwrap();
        MappingConfig {
            entity_type: "widget".into(),
            legacy_table: "Artikel".into(),
            target_model: "products".into(),
            identity_field: DEFAULT_IDENTITY_FIELD.into(),
            field_mappings: mappings,
            is_active: true,
        }
    }

    fn record(value: Value) -> LegacyRecord {
        value.as_object().cloned().unwrap()
    }

    // -- validate_field_mappings -----------------------------------------

    #[test]
    fn parse_preserves_order() {
        let config = widget_config();
        let keys: Vec<&str> = config.field_mappings.keys().map(String::as_str).collect();
        assert_eq!(keys, ["Art_Nr", "Bezeichnung", "Preis", "Aktiv"]);
    }

    #[test]
    fn parse_accepts_target_field_alias() {
        let m = validate_field_mappings(&json!({"a": {"target_field": "b"}})).unwrap();
        assert_eq!(m["a"].target_field, "b");
        assert!(!m["a"].required);
        assert!(m["a"].transform_name.is_none());
    }

    #[test]
    fn parse_rejects_non_object() {
        assert!(validate_field_mappings(&json!([1, 2])).is_err());
        assert!(validate_field_mappings(&json!({})).is_err());
    }

    #[test]
    fn parse_rejects_missing_target() {
        let err = validate_field_mappings(&json!({"a": {"required": true}})).unwrap_err();
        assert!(err.to_string().contains("missing 'new_field'"));
    }

    #[test]
    fn parse_rejects_bad_types() {
        assert!(validate_field_mappings(&json!({"a": {"new_field": "b", "required": "yes"}})).is_err());
        assert!(validate_field_mappings(&json!({"a": {"new_field": "b", "transform": 3}})).is_err());
    }

    #[test]
    fn parse_rejects_duplicate_targets() {
        let err = validate_field_mappings(&json!({
            "a": {"new_field": "x"},
            "b": {"new_field": "x"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("mapped from both"));
    }

    #[test]
    fn parse_rejects_too_many_rules() {
        let mut obj = serde_json::Map::new();
        for i in 0..=MAX_FIELD_MAPPINGS {
            obj.insert(format!("f{i}"), json!({"new_field": format!("t{i}")}));
        }
        assert!(validate_field_mappings(&Value::Object(obj)).is_err());
    }

    #[test]
    fn referenced_transforms_lists_names() {
        let config = widget_config();
        let names: Vec<&str> = config.referenced_transforms().collect();
        assert_eq!(names, ["to_uppercase", "to_float", "to_boolean"]);
    }

    // -- resolver -----------------------------------------------------------

    #[test]
    fn scenario_single_required_field() {
        let registry = FunctionRegistry::new();
        let resolver = FieldMappingResolver::new(&registry);
        let out = resolver
            .transform(&record(json!({"__KEY": "K1", "Art_Nr": "ABC-1"})), &widget_config())
            .unwrap();
        assert_eq!(Value::Object(out), json!({"product_sku": "ABC-1"}));
    }

    #[test]
    fn applies_transforms_in_order() {
        let registry = FunctionRegistry::new();
        let resolver = FieldMappingResolver::new(&registry);
        let out = resolver
            .transform(
                &record(json!({
                    "Aktiv": "ja",
                    "Preis": "9,95",
                    "Bezeichnung": "schraube",
                    "Art_Nr": "S-1"
                })),
                &widget_config(),
            )
            .unwrap();
        let keys: Vec<&str> = out.keys().map(String::as_str).collect();
        assert_eq!(keys, ["product_sku", "name", "price", "is_active"]);
        assert_eq!(out["name"], json!("SCHRAUBE"));
        assert_eq!(out["price"], json!(9.95));
        assert_eq!(out["is_active"], json!(true));
    }

    #[test]
    fn missing_required_field_fails() {
        let registry = FunctionRegistry::new();
        let resolver = FieldMappingResolver::new(&registry);
        let err = resolver
            .transform(&record(json!({"__KEY": "K1"})), &widget_config())
            .unwrap_err();
        assert_matches!(err, RecordTransformError::MissingRequired { field } if field == "Art_Nr");
    }

    #[test]
    fn blank_required_field_is_written() {
        let registry = FunctionRegistry::new();
        let resolver = FieldMappingResolver::new(&registry);
        let out = resolver
            .transform(&record(json!({"Art_Nr": null})), &widget_config())
            .unwrap();
        assert_eq!(Value::Object(out), json!({"product_sku": null}));
    }

    #[test]
    fn blank_required_field_goes_through_transform() {
        let registry = FunctionRegistry::new();
        let resolver = FieldMappingResolver::new(&registry);
        let mut config = widget_config();
        config.field_mappings["Art_Nr"].transform_name = Some("to_int".into());
        let out = resolver
            .transform(&record(json!({"Art_Nr": ""})), &config)
            .unwrap();
        assert_eq!(out["product_sku"], json!(0));
    }

    #[test]
    fn blank_optional_fields_are_omitted() {
        let registry = FunctionRegistry::new();
        let resolver = FieldMappingResolver::new(&registry);
        let out = resolver
            .transform(
                &record(json!({"Art_Nr": "A", "Bezeichnung": "", "Preis": null})),
                &widget_config(),
            )
            .unwrap();
        assert_eq!(Value::Object(out), json!({"product_sku": "A"}));
    }

    #[test]
    fn custom_function_failure_keeps_value() {
        let mut registry = FunctionRegistry::new();
        registry.register("shout", "result = value * 2").unwrap();
        let resolver = FieldMappingResolver::new(&registry);
        let mut config = widget_config();
        config.field_mappings["Bezeichnung"].transform_name = Some("shout".into());
        let out = resolver
            .transform(&record(json!({"Art_Nr": "A", "Bezeichnung": "bolt"})), &config)
            .unwrap();
        assert_eq!(out["name"], json!("bolt"));
    }
}
