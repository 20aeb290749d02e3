//! Storage seams used by the [`EntitySynchronizer`](crate::EntitySynchronizer).
//!
//! A backend provides three capabilities: reading configuration
//! ([`ConfigSource`]), recording run and record audit logs
//! ([`RunLogStore`]), and opening atomic load units ([`LoadBackend`]).
//! [`SyncStore`] is the combination of all three.

use async_trait::async_trait;
use serde::Serialize;
use syncbridge_core::field_mapping::MappingConfig;
use syncbridge_core::record::TargetFields;
use syncbridge_core::sync_status::{RecordAction, RunCounters, SyncRunStatus};
use syncbridge_core::types::DbId;

use crate::error::StoreError;

/// An active transformation function as stored by operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFunction {
    pub name: String,
    pub code: String,
}

/// One per-record audit entry appended to the run's record log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordAudit {
    pub run_id: DbId,
    pub legacy_id: Option<String>,
    pub action: RecordAction,
    pub target_id: Option<String>,
    pub message: Option<String>,
}

#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// The active mapping configuration for `entity_type`, if any.
    ///
    /// A stored configuration that cannot be parsed is reported as
    /// [`StoreError::Rejected`].
    async fn active_mapping_config(
        &self,
        entity_type: &str,
    ) -> Result<Option<MappingConfig>, StoreError>;

    /// Active functions among `names`. Unknown or inactive names are omitted.
    async fn transformation_functions(
        &self,
        names: &[String],
    ) -> Result<Vec<StoredFunction>, StoreError>;
}

#[async_trait]
pub trait RunLogStore: Send + Sync {
    /// Open a run log in `in_progress` and return its id.
    ///
    /// `legacy_table` is `None` when the run could not resolve its
    /// configuration.
    async fn start_run(
        &self,
        entity_type: &str,
        legacy_table: Option<&str>,
        incremental: bool,
    ) -> Result<DbId, StoreError>;

    /// Finalize a run log. Called exactly once per started run.
    async fn finish_run(
        &self,
        run_id: DbId,
        status: SyncRunStatus,
        counters: &RunCounters,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn append_record_audit(&self, entry: &RecordAudit) -> Result<(), StoreError>;
}

/// Opens atomic units spanning the identity mapping store and the target
/// store.
#[async_trait]
pub trait LoadBackend: Send + Sync {
    /// Whether `target_model` can be written by this backend.
    async fn supports_model(&self, target_model: &str) -> bool;

    async fn begin(&self) -> Result<Box<dyn LoadTransaction>, StoreError>;
}

/// One atomic unit of identity mapping and target writes for a single
/// record. Dropping it without [`commit`](LoadTransaction::commit) rolls
/// every write back.
#[async_trait]
pub trait LoadTransaction: Send {
    /// The mapped target id for a legacy record, if one exists.
    async fn lookup(
        &mut self,
        entity_type: &str,
        legacy_id: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Fails with [`StoreError::DuplicateKey`] if either side is already
    /// mapped for `entity_type`.
    async fn create_mapping(
        &mut self,
        entity_type: &str,
        legacy_id: &str,
        new_id: &str,
    ) -> Result<(), StoreError>;

    /// Advance `last_synced_at`. Fails with [`StoreError::NotFound`] if the
    /// pair does not exist.
    async fn touch(&mut self, entity_type: &str, legacy_id: &str) -> Result<(), StoreError>;

    /// Point an existing mapping at a new target id.
    async fn rebind(
        &mut self,
        entity_type: &str,
        legacy_id: &str,
        new_id: &str,
    ) -> Result<(), StoreError>;

    async fn create_target(
        &mut self,
        target_model: &str,
        fields: &TargetFields,
    ) -> Result<String, StoreError>;

    async fn get_target(
        &mut self,
        target_model: &str,
        id: &str,
    ) -> Result<Option<TargetFields>, StoreError>;

    /// Overwrite the given fields on an existing target record.
    async fn update_target(
        &mut self,
        target_model: &str,
        id: &str,
        fields: &TargetFields,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Everything the synchronizer needs from persistence.
pub trait SyncStore: ConfigSource + RunLogStore + LoadBackend {}

impl<T: ConfigSource + RunLogStore + LoadBackend> SyncStore for T {}
