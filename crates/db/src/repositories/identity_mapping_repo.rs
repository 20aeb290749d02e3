//! Repository for the `identity_mappings` table.
//!
//! The `(entity_type, legacy_id)` and `(entity_type, new_id)` unique
//! constraints make [`IdentityMappingRepo::create`] atomic: a concurrent
//! duplicate insert fails with SQLSTATE 23505 instead of overwriting.

use sqlx::{PgExecutor, PgPool};
use syncbridge_core::search::{clamp_limit, clamp_offset, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};

use crate::models::identity_mapping::{CreateIdentityMapping, IdentityMapping};

/// Column list for identity_mappings queries.
const COLUMNS: &str = "id, entity_type, legacy_id, new_id, created_at, last_synced_at";

/// Provides lookup and write operations for identity mappings.
pub struct IdentityMappingRepo;

impl IdentityMappingRepo {
    /// Find the mapping for a legacy record.
    pub async fn lookup<'e>(
        executor: impl PgExecutor<'e>,
        entity_type: &str,
        legacy_id: &str,
    ) -> Result<Option<IdentityMapping>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM identity_mappings WHERE entity_type = $1 AND legacy_id = $2"
        );
        sqlx::query_as::<_, IdentityMapping>(&query)
            .bind(entity_type)
            .bind(legacy_id)
            .fetch_optional(executor)
            .await
    }

    /// Find the mapping pointing at a target record.
    pub async fn find_by_new_id<'e>(
        executor: impl PgExecutor<'e>,
        entity_type: &str,
        new_id: &str,
    ) -> Result<Option<IdentityMapping>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM identity_mappings WHERE entity_type = $1 AND new_id = $2"
        );
        sqlx::query_as::<_, IdentityMapping>(&query)
            .bind(entity_type)
            .bind(new_id)
            .fetch_optional(executor)
            .await
    }

    /// Insert a new mapping. Fails with a unique violation if either side of
    /// the pair is already mapped.
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        input: &CreateIdentityMapping,
    ) -> Result<IdentityMapping, sqlx::Error> {
        let query = format!(
            "INSERT INTO identity_mappings (entity_type, legacy_id, new_id)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, IdentityMapping>(&query)
            .bind(&input.entity_type)
            .bind(&input.legacy_id)
            .bind(&input.new_id)
            .fetch_one(executor)
            .await
    }

    /// Set `last_synced_at` to now. Returns `None` if the pair does not exist.
    pub async fn touch<'e>(
        executor: impl PgExecutor<'e>,
        entity_type: &str,
        legacy_id: &str,
    ) -> Result<Option<IdentityMapping>, sqlx::Error> {
        let query = format!(
            "UPDATE identity_mappings SET last_synced_at = now()
             WHERE entity_type = $1 AND legacy_id = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, IdentityMapping>(&query)
            .bind(entity_type)
            .bind(legacy_id)
            .fetch_optional(executor)
            .await
    }

    /// Point an existing mapping at a different target record and touch it.
    ///
    /// Only used to recover from a target row that disappeared out-of-band.
    pub async fn rebind<'e>(
        executor: impl PgExecutor<'e>,
        entity_type: &str,
        legacy_id: &str,
        new_id: &str,
    ) -> Result<Option<IdentityMapping>, sqlx::Error> {
        let query = format!(
            "UPDATE identity_mappings SET new_id = $3, last_synced_at = now()
             WHERE entity_type = $1 AND legacy_id = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, IdentityMapping>(&query)
            .bind(entity_type)
            .bind(legacy_id)
            .bind(new_id)
            .fetch_optional(executor)
            .await
    }

    /// Count mappings for an entity type.
    pub async fn count_by_entity_type(pool: &PgPool, entity_type: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM identity_mappings WHERE entity_type = $1")
            .bind(entity_type)
            .fetch_one(pool)
            .await
    }

    /// List mappings for an entity type, most recently synced first.
    pub async fn list_by_entity_type(
        pool: &PgPool,
        entity_type: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<IdentityMapping>, sqlx::Error> {
        let limit = clamp_limit(limit, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT);
        let offset = clamp_offset(offset);
        let query = format!(
            "SELECT {COLUMNS} FROM identity_mappings
             WHERE entity_type = $1
             ORDER BY last_synced_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, IdentityMapping>(&query)
            .bind(entity_type)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}
