//! Run status, per-record actions and run counters for entity
//! synchronization.
//!
//! Pure types with string conversions matching the values stored in the
//! `sync_run_logs` and `sync_record_logs` tables.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sync Run Status
// ---------------------------------------------------------------------------

/// Status of one synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    PartiallyCompleted,
}

impl SyncRunStatus {
    /// Return the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PartiallyCompleted => "partially_completed",
        }
    }

    /// Parse a status string. Returns `None` for unknown values.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "partially_completed" => Some(Self::PartiallyCompleted),
            _ => None,
        }
    }

    /// Whether the run has been finalized.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::PartiallyCompleted
        )
    }

    /// Whether the run finished without a fatal error. Incremental
    /// extraction uses the start of the last such run as its watermark.
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyCompleted)
    }

    /// All valid status values.
    pub const ALL: &'static [&'static str] = &[
        "pending",
        "in_progress",
        "completed",
        "failed",
        "partially_completed",
    ];
}

impl std::fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Record Action
// ---------------------------------------------------------------------------

/// What happened to one legacy record during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    Created,
    Updated,
    /// The mapping existed but its target row was gone; a new row was
    /// created and the mapping rebound to it.
    Recreated,
    Failed,
    /// The record had no usable identity value.
    Skipped,
}

impl RecordAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Recreated => "recreated",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "recreated" => Some(Self::Recreated),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// All valid action values.
    pub const ALL: &'static [&'static str] =
        &["created", "updated", "recreated", "failed", "skipped"];
}

impl std::fmt::Display for RecordAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Running tallies for one sync run.
///
/// `processed` is the number of extracted records. Once every record has been
/// visited, `processed == created + updated + failed + skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub processed: i32,
    pub created: i32,
    pub updated: i32,
    pub failed: i32,
    /// Unidentifiable records: processed but neither created, updated nor failed.
    pub skipped: i32,
}

impl RunCounters {
    /// Tally one record outcome. `Recreated` counts as a create.
    pub fn record(&mut self, action: RecordAction) {
        match action {
            RecordAction::Created | RecordAction::Recreated => self.created += 1,
            RecordAction::Updated => self.updated += 1,
            RecordAction::Failed => self.failed += 1,
            RecordAction::Skipped => self.skipped += 1,
        }
    }

    /// Whether every processed record has been classified exactly once.
    pub fn is_balanced(&self) -> bool {
        self.processed == self.created + self.updated + self.failed + self.skipped
    }

    /// Terminal status for a run that finished without a fatal error.
    pub fn final_status(&self) -> SyncRunStatus {
        if self.failed == 0 {
            SyncRunStatus::Completed
        } else {
            SyncRunStatus::PartiallyCompleted
        }
    }
}

/// Statistics returned to the caller of a sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub total_fetched: i32,
    pub created: i32,
    pub updated: i32,
    pub errors: i32,
    pub skipped: i32,
}

impl From<RunCounters> for SyncStats {
    fn from(c: RunCounters) -> Self {
        Self {
            total_fetched: c.processed,
            created: c.created,
            updated: c.updated,
            errors: c.failed,
            skipped: c.skipped,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- SyncRunStatus ------------------------------------------------------

    #[test]
    fn status_round_trip() {
        for s in SyncRunStatus::ALL {
            let status = SyncRunStatus::from_str(s).unwrap();
            assert_eq!(status.as_str(), *s);
        }
    }

    #[test]
    fn status_unknown_returns_none() {
        assert!(SyncRunStatus::from_str("partial").is_none());
    }

    #[test]
    fn status_serde_matches_as_str() {
        let json = serde_json::to_string(&SyncRunStatus::PartiallyCompleted).unwrap();
        assert_eq!(json, "\"partially_completed\"");
    }

    #[test]
    fn terminal_and_successful_states() {
        assert!(!SyncRunStatus::InProgress.is_terminal());
        assert!(SyncRunStatus::Failed.is_terminal());
        assert!(!SyncRunStatus::Failed.is_successful());
        assert!(SyncRunStatus::PartiallyCompleted.is_successful());
    }

    // -- RecordAction -------------------------------------------------------

    #[test]
    fn action_round_trip() {
        for s in RecordAction::ALL {
            let action = RecordAction::from_str(s).unwrap();
            assert_eq!(action.as_str(), *s);
        }
    }

    #[test]
    fn action_display_matches_as_str() {
        assert_eq!(format!("{}", RecordAction::Recreated), "recreated");
    }

    // -- RunCounters --------------------------------------------------------

    #[test]
    fn recreated_counts_as_created() {
        let mut c = RunCounters::default();
        c.record(RecordAction::Recreated);
        c.record(RecordAction::Created);
        assert_eq!(c.created, 2);
    }

    #[test]
    fn balanced_includes_skipped() {
        let mut c = RunCounters {
            processed: 4,
            ..Default::default()
        };
        c.record(RecordAction::Created);
        c.record(RecordAction::Updated);
        c.record(RecordAction::Failed);
        assert!(!c.is_balanced());
        c.record(RecordAction::Skipped);
        assert!(c.is_balanced());
    }

    #[test]
    fn final_status_depends_on_failures() {
        let mut c = RunCounters::default();
        assert_eq!(c.final_status(), SyncRunStatus::Completed);
        c.record(RecordAction::Failed);
        assert_eq!(c.final_status(), SyncRunStatus::PartiallyCompleted);
    }

    #[test]
    fn stats_from_counters() {
        let c = RunCounters {
            processed: 5,
            created: 2,
            updated: 1,
            failed: 1,
            skipped: 1,
        };
        let stats = SyncStats::from(c);
        assert_eq!(stats.total_fetched, 5);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.skipped, 1);
    }
}
