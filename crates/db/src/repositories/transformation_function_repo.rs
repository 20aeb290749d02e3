//! Repository for the `transformation_functions` table.

use sqlx::PgPool;
use syncbridge_core::types::DbId;

use crate::models::transformation_function::{
    CreateTransformationFunction, TransformationFunction, UpdateTransformationFunction,
};

/// Column list for transformation_functions queries.
const COLUMNS: &str = "id, name, description, code, version, is_active, created_at, updated_at";

/// Provides CRUD operations for stored transformation functions.
///
/// Code is validated by the caller before it reaches this layer.
pub struct TransformationFunctionRepo;

impl TransformationFunctionRepo {
    /// Insert a new function at version 1.
    pub async fn create(
        pool: &PgPool,
        input: &CreateTransformationFunction,
    ) -> Result<TransformationFunction, sqlx::Error> {
        let query = format!(
            "INSERT INTO transformation_functions (name, description, code, is_active)
             VALUES ($1, $2, $3, COALESCE($4, TRUE))
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TransformationFunction>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.code)
            .bind(input.is_active)
            .fetch_one(pool)
            .await
    }

    /// Find a function by its unique name.
    pub async fn find_by_name(
        pool: &PgPool,
        name: &str,
    ) -> Result<Option<TransformationFunction>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM transformation_functions WHERE name = $1");
        sqlx::query_as::<_, TransformationFunction>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// List all active functions, ordered by name.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<TransformationFunction>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM transformation_functions WHERE is_active ORDER BY name"
        );
        sqlx::query_as::<_, TransformationFunction>(&query)
            .fetch_all(pool)
            .await
    }

    /// List the active functions among `names`.
    pub async fn list_active_by_names(
        pool: &PgPool,
        names: &[String],
    ) -> Result<Vec<TransformationFunction>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM transformation_functions
             WHERE is_active AND name = ANY($1)
             ORDER BY name"
        );
        sqlx::query_as::<_, TransformationFunction>(&query)
            .bind(names)
            .fetch_all(pool)
            .await
    }

    /// Update a function. A changed `code` bumps `version`.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateTransformationFunction,
    ) -> Result<Option<TransformationFunction>, sqlx::Error> {
        let query = format!(
            "UPDATE transformation_functions SET
                description = COALESCE($2, description),
                version = version + CASE WHEN $3::text IS NOT NULL AND $3::text <> code THEN 1 ELSE 0 END,
                code = COALESCE($3, code),
                is_active = COALESCE($4, is_active)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TransformationFunction>(&query)
            .bind(id)
            .bind(&input.description)
            .bind(&input.code)
            .bind(input.is_active)
            .fetch_optional(pool)
            .await
    }

    /// Activate or deactivate a function by name.
    pub async fn set_active(pool: &PgPool, name: &str, is_active: bool) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE transformation_functions SET is_active = $2 WHERE name = $1")
                .bind(name)
                .bind(is_active)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
