//! Mapping configuration model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use syncbridge_core::error::CoreError;
use syncbridge_core::field_mapping::{validate_field_mappings, MappingConfig};
use syncbridge_core::types::{DbId, Timestamp};

/// A row from the `mapping_configs` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MappingConfigRow {
    pub id: DbId,
    pub entity_type: String,
    pub legacy_table: String,
    pub target_model: String,
    pub identity_field: String,
    pub field_mappings: serde_json::Value,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl MappingConfigRow {
    /// Parse the stored field map into the domain configuration.
    pub fn into_config(self) -> Result<MappingConfig, CoreError> {
        let field_mappings = validate_field_mappings(&self.field_mappings)?;
        Ok(MappingConfig {
            entity_type: self.entity_type,
            legacy_table: self.legacy_table,
            target_model: self.target_model,
            identity_field: self.identity_field,
            field_mappings,
            is_active: self.is_active,
        })
    }
}

/// DTO for creating a mapping configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMappingConfig {
    pub entity_type: String,
    pub legacy_table: String,
    pub target_model: String,
    pub identity_field: Option<String>,
    pub field_mappings: serde_json::Value,
    pub is_active: Option<bool>,
}

/// DTO for updating a mapping configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMappingConfig {
    pub legacy_table: Option<String>,
    pub target_model: Option<String>,
    pub identity_field: Option<String>,
    pub field_mappings: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}
