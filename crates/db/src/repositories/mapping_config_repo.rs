//! Repository for the `mapping_configs` table.

use sqlx::PgPool;
use syncbridge_core::types::DbId;

use crate::models::mapping_config::{CreateMappingConfig, MappingConfigRow, UpdateMappingConfig};

/// Column list for mapping_configs queries.
const COLUMNS: &str = "id, entity_type, legacy_table, target_model, identity_field, \
    field_mappings, is_active, created_at, updated_at";

/// Provides CRUD operations for mapping configurations.
pub struct MappingConfigRepo;

impl MappingConfigRepo {
    /// Insert a new configuration.
    ///
    /// `field_mappings` is bound as text and cast to `json` so key order is
    /// stored exactly as given.
    pub async fn create(
        pool: &PgPool,
        input: &CreateMappingConfig,
    ) -> Result<MappingConfigRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO mapping_configs
                (entity_type, legacy_table, target_model, identity_field, field_mappings, is_active)
             VALUES ($1, $2, $3, COALESCE($4, '__KEY'), $5::json, COALESCE($6, TRUE))
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MappingConfigRow>(&query)
            .bind(&input.entity_type)
            .bind(&input.legacy_table)
            .bind(&input.target_model)
            .bind(&input.identity_field)
            .bind(input.field_mappings.to_string())
            .bind(input.is_active)
            .fetch_one(pool)
            .await
    }

    /// Find the configuration for an entity type, active or not.
    pub async fn find_by_entity_type(
        pool: &PgPool,
        entity_type: &str,
    ) -> Result<Option<MappingConfigRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM mapping_configs WHERE entity_type = $1");
        sqlx::query_as::<_, MappingConfigRow>(&query)
            .bind(entity_type)
            .fetch_optional(pool)
            .await
    }

    /// Find the active configuration for an entity type.
    pub async fn find_active_by_entity_type(
        pool: &PgPool,
        entity_type: &str,
    ) -> Result<Option<MappingConfigRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM mapping_configs WHERE entity_type = $1 AND is_active"
        );
        sqlx::query_as::<_, MappingConfigRow>(&query)
            .bind(entity_type)
            .fetch_optional(pool)
            .await
    }

    /// Update a configuration. Only non-`None` fields are applied.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateMappingConfig,
    ) -> Result<Option<MappingConfigRow>, sqlx::Error> {
        let query = format!(
            "UPDATE mapping_configs SET
                legacy_table = COALESCE($2, legacy_table),
                target_model = COALESCE($3, target_model),
                identity_field = COALESCE($4, identity_field),
                field_mappings = COALESCE($5::json, field_mappings),
                is_active = COALESCE($6, is_active)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MappingConfigRow>(&query)
            .bind(id)
            .bind(&input.legacy_table)
            .bind(&input.target_model)
            .bind(&input.identity_field)
            .bind(input.field_mappings.as_ref().map(|v| v.to_string()))
            .bind(input.is_active)
            .fetch_optional(pool)
            .await
    }

    /// Activate or deactivate a configuration.
    pub async fn set_active(
        pool: &PgPool,
        entity_type: &str,
        is_active: bool,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE mapping_configs SET is_active = $2 WHERE entity_type = $1")
                .bind(entity_type)
                .bind(is_active)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all configurations ordered by entity type.
    pub async fn list(pool: &PgPool) -> Result<Vec<MappingConfigRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM mapping_configs ORDER BY entity_type");
        sqlx::query_as::<_, MappingConfigRow>(&query)
            .fetch_all(pool)
            .await
    }
}
