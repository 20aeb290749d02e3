//! Administrative catalog helpers.
//!
//! Write paths for mapping configurations and transformation functions.
//! Everything is validated here, at write time, so the synchronizer can
//! treat stored configuration as trusted input.

use std::sync::Arc;

use sqlx::PgPool;
use syncbridge_core::field_mapping::{validate_field_mappings, MappingConfig};
use syncbridge_core::naming::validate_identifier;
use syncbridge_core::record::DEFAULT_IDENTITY_FIELD;
use syncbridge_core::transform::builtin::is_builtin;
use syncbridge_core::transform::compile;
use syncbridge_core::transform::registry::validate_function_name;
use syncbridge_db::models::mapping_config::{
    CreateMappingConfig, MappingConfigRow, UpdateMappingConfig,
};
use syncbridge_db::models::transformation_function::{
    CreateTransformationFunction, TransformationFunction, UpdateTransformationFunction,
};
use syncbridge_db::repositories::{MappingConfigRepo, TransformationFunctionRepo};

use crate::error::CatalogError;
use crate::model::ModelRegistry;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check a function's name and that its code compiles.
pub fn validate_function(name: &str, code: &str) -> Result<(), CatalogError> {
    validate_function_name(name)?;
    validate_function_code(code)
}

fn validate_function_code(code: &str) -> Result<(), CatalogError> {
    compile(code)
        .map(|_| ())
        .map_err(|e| CatalogError::Validation(format!("Invalid transformation code: {e}")))
}

/// Validate a mapping configuration payload and resolve it to the domain
/// model. Does not check that referenced custom transforms exist.
pub fn validate_mapping_config(
    input: &CreateMappingConfig,
    models: &ModelRegistry,
) -> Result<MappingConfig, CatalogError> {
    validate_identifier("entity type", &input.entity_type)?;

    let legacy_table = input.legacy_table.trim();
    if legacy_table.is_empty() {
        return Err(CatalogError::Validation(
            "legacy_table cannot be empty".to_string(),
        ));
    }
    if !models.contains(&input.target_model) {
        return Err(CatalogError::Validation(format!(
            "Unknown target model '{}'",
            input.target_model
        )));
    }

    let identity_field = input
        .identity_field
        .as_deref()
        .map(str::trim)
        .unwrap_or(DEFAULT_IDENTITY_FIELD);
    if identity_field.is_empty() {
        return Err(CatalogError::Validation(
            "identity_field cannot be empty".to_string(),
        ));
    }

    let field_mappings = validate_field_mappings(&input.field_mappings)?;
    Ok(MappingConfig {
        entity_type: input.entity_type.clone(),
        legacy_table: legacy_table.to_string(),
        target_model: input.target_model.clone(),
        identity_field: identity_field.to_string(),
        field_mappings,
        is_active: input.is_active.unwrap_or(true),
    })
}

/// Custom (non-built-in) transform names referenced by `config`, sorted and
/// de-duplicated.
pub fn custom_transforms(config: &MappingConfig) -> Vec<String> {
    let mut names: Vec<String> = config
        .referenced_transforms()
        .filter(|name| !is_builtin(name))
        .map(str::to_string)
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Validated write access to mapping configurations and transformation
/// functions.
pub struct Catalog {
    pool: PgPool,
    models: Arc<ModelRegistry>,
}

impl Catalog {
    pub fn new(pool: PgPool, models: Arc<ModelRegistry>) -> Self {
        Self { pool, models }
    }

    pub async fn register_function(
        &self,
        input: &CreateTransformationFunction,
    ) -> Result<TransformationFunction, CatalogError> {
        validate_function(&input.name, &input.code)?;
        let function = TransformationFunctionRepo::create(&self.pool, input).await?;
        tracing::info!(name = %function.name, "Registered transformation function");
        Ok(function)
    }

    /// Update a function by name. New code must compile; a changed body
    /// bumps the stored version.
    pub async fn update_function(
        &self,
        name: &str,
        input: &UpdateTransformationFunction,
    ) -> Result<TransformationFunction, CatalogError> {
        if let Some(code) = &input.code {
            validate_function_code(code)?;
        }
        let existing = TransformationFunctionRepo::find_by_name(&self.pool, name)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("Transformation function '{name}'")))?;
        let updated = TransformationFunctionRepo::update(&self.pool, existing.id, input)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("Transformation function '{name}'")))?;
        if updated.version != existing.version {
            tracing::info!(name, version = updated.version, "Transformation function code changed");
        }
        Ok(updated)
    }

    /// Create or replace the configuration for `input.entity_type`.
    ///
    /// Every referenced custom transform must exist and be active.
    pub async fn save_mapping_config(
        &self,
        input: &CreateMappingConfig,
    ) -> Result<MappingConfigRow, CatalogError> {
        let config = validate_mapping_config(input, &self.models)?;

        let custom = custom_transforms(&config);
        if !custom.is_empty() {
            let found = TransformationFunctionRepo::list_active_by_names(&self.pool, &custom).await?;
            let missing: Vec<&str> = custom
                .iter()
                .filter(|name| !found.iter().any(|f| &f.name == *name))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(CatalogError::Validation(format!(
                    "Unknown or inactive transformation function(s): {}",
                    missing.join(", ")
                )));
            }
        }

        let row = match MappingConfigRepo::find_by_entity_type(&self.pool, &config.entity_type).await? {
            Some(existing) => {
                let update = UpdateMappingConfig {
                    legacy_table: Some(config.legacy_table.clone()),
                    target_model: Some(config.target_model.clone()),
                    identity_field: Some(config.identity_field.clone()),
                    field_mappings: Some(input.field_mappings.clone()),
                    is_active: Some(config.is_active),
                };
                MappingConfigRepo::update(&self.pool, existing.id, &update)
                    .await?
                    .ok_or_else(|| {
                        CatalogError::NotFound(format!("Mapping config '{}'", config.entity_type))
                    })?
            }
            None => {
                let create = CreateMappingConfig {
                    entity_type: config.entity_type.clone(),
                    legacy_table: config.legacy_table.clone(),
                    target_model: config.target_model.clone(),
                    identity_field: Some(config.identity_field.clone()),
                    field_mappings: input.field_mappings.clone(),
                    is_active: Some(config.is_active),
                };
                MappingConfigRepo::create(&self.pool, &create).await?
            }
        };
        tracing::info!(entity_type = %row.entity_type, "Saved mapping configuration");
        Ok(row)
    }

    pub async fn set_mapping_active(
        &self,
        entity_type: &str,
        is_active: bool,
    ) -> Result<(), CatalogError> {
        if !MappingConfigRepo::set_active(&self.pool, entity_type, is_active).await? {
            return Err(CatalogError::NotFound(format!(
                "Mapping config '{entity_type}'"
            )));
        }
        Ok(())
    }

    pub async fn set_function_active(&self, name: &str, is_active: bool) -> Result<(), CatalogError> {
        if !TransformationFunctionRepo::set_active(&self.pool, name, is_active).await? {
            return Err(CatalogError::NotFound(format!(
                "Transformation function '{name}'"
            )));
        }
        Ok(())
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
    use crate::model::builtin_models;

    fn product_input(field_mappings: serde_json::Value) -> CreateMappingConfig {
        CreateMappingConfig {
            entity_type: "widget".into(),
            legacy_table: " Artikel ".into(),
            target_model: "products".into(),
            identity_field: None,
            field_mappings,
            is_active: None,
        }
    }

    // -- functions ----------------------------------------------------------

    #[test]
    fn valid_function_passes() {
        assert!(validate_function("strip_prefix", "result = replace(value, \"ART-\", \"\")").is_ok());
    }

    #[test]
    fn syntax_error_is_rejected_at_write_time() {
        assert_matches!(
            validate_function("broken", "result = (value"),
            Err(CatalogError::Validation(msg)) if msg.starts_with("Invalid transformation code")
        );
    }

    #[test]
    fn code_without_result_is_rejected() {
        assert_matches!(
            validate_function("no_result", "let x = value"),
            Err(CatalogError::Validation(_))
        );
    }

    #[test]
    fn builtin_names_are_reserved() {
        assert_matches!(
            validate_function("to_uppercase", "result = value"),
            Err(CatalogError::Validation(_))
        );
    }

    // -- mapping configs ----------------------------------------------------

    #[test]
    fn mapping_config_defaults_are_applied() {
        let models = builtin_models().unwrap();
        let config = validate_mapping_config(
            &product_input(json!({ "Art_Nr": { "new_field": "product_sku", "required": true } })),
            &models,
        )
        .unwrap();
        assert_eq!(config.legacy_table, "Artikel");
        assert_eq!(config.identity_field, DEFAULT_IDENTITY_FIELD);
        assert!(config.is_active);
    }

    #[test]
    fn unknown_target_model_is_rejected() {
        let models = builtin_models().unwrap();
        let mut input = product_input(json!({ "A": { "new_field": "a" } }));
        input.target_model = "orders".into();
        assert_matches!(
            validate_mapping_config(&input, &models),
            Err(CatalogError::Validation(msg)) if msg.contains("orders")
        );
    }

    #[test]
    fn invalid_entity_type_is_rejected() {
        let models = builtin_models().unwrap();
        let mut input = product_input(json!({ "A": { "new_field": "a" } }));
        input.entity_type = "Variant Product".into();
        assert_matches!(
            validate_mapping_config(&input, &models),
            Err(CatalogError::Validation(_))
        );
    }

    #[test]
    fn duplicate_target_fields_are_rejected() {
        let models = builtin_models().unwrap();
        let input = product_input(json!({
            "Name1": { "new_field": "name" },
            "Name2": { "new_field": "name" }
        }));
        assert_matches!(
            validate_mapping_config(&input, &models),
            Err(CatalogError::Validation(_))
        );
    }

    #[test]
    fn custom_transforms_excludes_builtins_and_dedups() {
        let models = builtin_models().unwrap();
        let config = validate_mapping_config(
            &product_input(json!({
                "A": { "new_field": "name", "transform": "strip_prefix" },
                "B": { "new_field": "description", "transform": "to_uppercase" },
                "C": { "new_field": "product_sku", "transform": "strip_prefix" }
            })),
            &models,
        )
        .unwrap();
        assert_eq!(custom_transforms(&config), vec!["strip_prefix".to_string()]);
    }
}
