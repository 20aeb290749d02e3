//! Repository for the `sync_record_logs` table.

use sqlx::PgPool;
use syncbridge_core::types::DbId;

use crate::models::sync_record_log::{CreateSyncRecordLog, SyncRecordLog};

/// Column list for sync_record_logs queries.
const COLUMNS: &str = "id, run_id, legacy_id, action, target_id, message, created_at";

/// Provides append and read operations for per-record audit entries.
pub struct SyncRecordLogRepo;

impl SyncRecordLogRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateSyncRecordLog,
    ) -> Result<SyncRecordLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO sync_record_logs (run_id, legacy_id, action, target_id, message)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SyncRecordLog>(&query)
            .bind(input.run_id)
            .bind(&input.legacy_id)
            .bind(&input.action)
            .bind(&input.target_id)
            .bind(&input.message)
            .fetch_one(pool)
            .await
    }

    /// All entries of a run in insertion order.
    pub async fn list_by_run(pool: &PgPool, run_id: DbId) -> Result<Vec<SyncRecordLog>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sync_record_logs WHERE run_id = $1 ORDER BY id");
        sqlx::query_as::<_, SyncRecordLog>(&query)
            .bind(run_id)
            .fetch_all(pool)
            .await
    }
}
