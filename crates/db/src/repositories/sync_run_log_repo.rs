//! Repository for the `sync_run_logs` table.

use sqlx::PgPool;
use syncbridge_core::search::{clamp_limit, clamp_offset, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};
use syncbridge_core::sync_status::{RunCounters, SyncRunStatus};
use syncbridge_core::types::{DbId, Timestamp};

use crate::models::sync_run_log::SyncRunLog;

/// Column list for sync_run_logs queries.
const COLUMNS: &str = "id, entity_type, legacy_table, status, incremental, started_at, completed_at, \
    records_processed, records_created, records_updated, records_failed, records_skipped, \
    error_message";

/// Provides lifecycle operations for sync run logs.
pub struct SyncRunLogRepo;

impl SyncRunLogRepo {
    /// Open a run log in `in_progress` with all counters at zero.
    pub async fn start(
        pool: &PgPool,
        entity_type: &str,
        legacy_table: Option<&str>,
        incremental: bool,
    ) -> Result<SyncRunLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO sync_run_logs (entity_type, legacy_table, status, incremental)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SyncRunLog>(&query)
            .bind(entity_type)
            .bind(legacy_table)
            .bind(SyncRunStatus::InProgress.as_str())
            .bind(incremental)
            .fetch_one(pool)
            .await
    }

    /// Write final counters and status and stamp `completed_at`.
    pub async fn finish(
        pool: &PgPool,
        id: DbId,
        status: SyncRunStatus,
        counters: &RunCounters,
        error_message: Option<&str>,
    ) -> Result<Option<SyncRunLog>, sqlx::Error> {
        let query = format!(
            "UPDATE sync_run_logs SET
                status = $2,
                records_processed = $3,
                records_created = $4,
                records_updated = $5,
                records_failed = $6,
                records_skipped = $7,
                error_message = $8,
                completed_at = now()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SyncRunLog>(&query)
            .bind(id)
            .bind(status.as_str())
            .bind(counters.processed)
            .bind(counters.created)
            .bind(counters.updated)
            .bind(counters.failed)
            .bind(counters.skipped)
            .bind(error_message)
            .fetch_optional(pool)
            .await
    }

    /// Mark a run failed, keeping whatever counters were reached.
    pub async fn fail(
        pool: &PgPool,
        id: DbId,
        counters: &RunCounters,
        error_message: &str,
    ) -> Result<Option<SyncRunLog>, sqlx::Error> {
        Self::finish(pool, id, SyncRunStatus::Failed, counters, Some(error_message)).await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<SyncRunLog>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sync_run_logs WHERE id = $1");
        sqlx::query_as::<_, SyncRunLog>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List runs for an entity type, newest first.
    pub async fn list_by_entity_type(
        pool: &PgPool,
        entity_type: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<SyncRunLog>, sqlx::Error> {
        let limit = clamp_limit(limit, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT);
        let offset = clamp_offset(offset);
        let query = format!(
            "SELECT {COLUMNS} FROM sync_run_logs
             WHERE entity_type = $1
             ORDER BY started_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, SyncRunLog>(&query)
            .bind(entity_type)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Start time of the most recent successful run of `entity_type` that
    /// read from `legacy_table`.
    ///
    /// This is the incremental extraction watermark. Runs still in progress
    /// and failed runs never count.
    pub async fn last_successful_start(
        pool: &PgPool,
        entity_type: &str,
        legacy_table: &str,
    ) -> Result<Option<Timestamp>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT MAX(started_at)
             FROM sync_run_logs
             WHERE entity_type = $1
               AND legacy_table = $2
               AND status IN ($3, $4)",
        )
        .bind(entity_type)
        .bind(legacy_table)
        .bind(SyncRunStatus::Completed.as_str())
        .bind(SyncRunStatus::PartiallyCompleted.as_str())
        .fetch_one(pool)
        .await
    }
}
