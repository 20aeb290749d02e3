//! Sync run log model.

use serde::Serialize;
use sqlx::FromRow;
use syncbridge_core::sync_status::{RunCounters, SyncRunStatus};
use syncbridge_core::types::{DbId, Timestamp};

/// A row from the `sync_run_logs` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SyncRunLog {
    pub id: DbId,
    pub entity_type: String,
    /// `None` when the run failed before resolving its configuration.
    pub legacy_table: Option<String>,
    pub status: String,
    pub incremental: bool,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub records_processed: i32,
    pub records_created: i32,
    pub records_updated: i32,
    pub records_failed: i32,
    pub records_skipped: i32,
    pub error_message: Option<String>,
}

impl SyncRunLog {
    /// Parsed status. `None` only if the row holds a value outside the
    /// check constraint.
    pub fn run_status(&self) -> Option<SyncRunStatus> {
        SyncRunStatus::from_str(&self.status)
    }

    pub fn counters(&self) -> RunCounters {
        RunCounters {
            processed: self.records_processed,
            created: self.records_created,
            updated: self.records_updated,
            failed: self.records_failed,
            skipped: self.records_skipped,
        }
    }
}
