//! Per-record sync audit model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use syncbridge_core::types::{DbId, Timestamp};

/// A row from the `sync_record_logs` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SyncRecordLog {
    pub id: DbId,
    pub run_id: DbId,
    pub legacy_id: Option<String>,
    pub action: String,
    pub target_id: Option<String>,
    pub message: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for appending a record log entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSyncRecordLog {
    pub run_id: DbId,
    pub legacy_id: Option<String>,
    pub action: String,
    pub target_id: Option<String>,
    pub message: Option<String>,
}
