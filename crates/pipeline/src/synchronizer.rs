//! Entity Synchronizer.
//!
//! Runs one entity type through extract, transform and load:
//!
//! 1. Resolve the active mapping configuration and its custom transforms.
//! 2. Open a run log (`in_progress`) tagged with the legacy table. A
//!    configuration failure from step 1 finalizes the log as `failed` and
//!    returns [`SyncError::Configuration`].
//! 3. Extract the full record set. Failure finalizes the log as `failed` and
//!    returns [`SyncError::Extraction`].
//! 4. Process records sequentially, each in its own [`LoadTransaction`].
//!    Record-level failures are counted and audited; the loop continues.
//! 5. Finalize the log as `completed` or `partially_completed`. Partial runs
//!    carry a failure summary in the log's error message.
//!
//! Only store unavailability escapes step 4, failing the run with
//! [`SyncError::Failure`] so an external retry policy can act. Re-running is
//! idempotent because every record resolves through the identity mapping
//! store first.

use std::sync::Arc;

use serde::Serialize;
use syncbridge_core::field_mapping::{FieldMappingResolver, MappingConfig};
use syncbridge_core::record::{legacy_id, LegacyRecord, TargetFields};
use syncbridge_core::sync_status::{RecordAction, RunCounters, SyncRunStatus, SyncStats};
use syncbridge_core::transform::builtin::is_builtin;
use syncbridge_core::transform::FunctionRegistry;
use syncbridge_core::types::DbId;

use crate::error::{StoreError, SyncError};
use crate::extract::Extractor;
use crate::hooks::{HookContext, HookError, HookRegistry};
use crate::store::{RecordAudit, SyncStore};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of loading one transformed record.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoadOutcome {
    Created(String),
    Updated(String),
    /// The mapped target row was missing and has been re-created.
    Recreated { previous: String, fresh: String },
}

impl LoadOutcome {
    fn action(&self) -> RecordAction {
        match self {
            Self::Created(_) => RecordAction::Created,
            Self::Updated(_) => RecordAction::Updated,
            Self::Recreated { .. } => RecordAction::Recreated,
        }
    }

    fn target_id(&self) -> &str {
        match self {
            Self::Created(id) | Self::Updated(id) => id,
            Self::Recreated { fresh, .. } => fresh,
        }
    }
}

/// Why loading a record did not commit.
#[derive(Debug)]
enum LoadError {
    /// Isolated to this record.
    Record(String),
    /// Aborts the run.
    Fatal(StoreError),
}

impl From<StoreError> for LoadError {
    fn from(err: StoreError) -> Self {
        if err.is_fatal() {
            Self::Fatal(err)
        } else {
            Self::Record(err.to_string())
        }
    }
}

impl From<HookError> for LoadError {
    fn from(err: HookError) -> Self {
        match err {
            HookError::Store(store) => Self::from(store),
            HookError::Rejected(_) => Self::Record(err.to_string()),
        }
    }
}

/// Transformed view of one record produced by [`EntitySynchronizer::preview`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewRecord {
    pub legacy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<TargetFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Configuration and compiled transforms for one run.
struct RunContext {
    config: MappingConfig,
    functions: FunctionRegistry,
}

/// Run log message for a run with record-level failures.
fn failure_summary(counters: &RunCounters, first_failure: Option<&str>) -> Option<String> {
    if counters.failed == 0 {
        return None;
    }
    Some(match first_failure {
        Some(first) => format!("{} record(s) failed; first: {first}", counters.failed),
        None => format!("{} record(s) failed", counters.failed),
    })
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

/// Orchestrates synchronization runs. Cheap to share behind an `Arc`; runs
/// for different entity types may execute concurrently.
pub struct EntitySynchronizer {
    store: Arc<dyn SyncStore>,
    extractor: Arc<dyn Extractor>,
    hooks: HookRegistry,
}

impl EntitySynchronizer {
    pub fn new(store: Arc<dyn SyncStore>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            store,
            extractor,
            hooks: HookRegistry::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Synchronize one entity type and return its statistics.
    ///
    /// Record-level failures never surface here; they are visible through
    /// `SyncStats::errors` and the run log.
    pub async fn run_sync(
        &self,
        entity_type: &str,
        incremental_only: bool,
    ) -> Result<SyncStats, SyncError> {
        let resolved = self.resolve_context(entity_type).await;
        let legacy_table = resolved.as_ref().ok().map(|ctx| ctx.config.legacy_table.as_str());
        let run_id = self
            .store
            .start_run(entity_type, legacy_table, incremental_only)
            .await
            .map_err(|e| SyncError::Failure(format!("Could not open run log: {e}")))?;
        tracing::info!(entity_type, run_id, incremental_only, "Sync run started");

        let mut counters = RunCounters::default();

        let ctx = match resolved {
            Ok(ctx) => ctx,
            Err(err) => return Err(self.abort_run(run_id, entity_type, &counters, err).await),
        };

        let records = match self
            .extractor
            .extract(entity_type, &ctx.config.legacy_table, incremental_only)
            .await
        {
            Ok(records) => records,
            Err(err) => {
                let err = SyncError::Extraction(err);
                return Err(self.abort_run(run_id, entity_type, &counters, err).await);
            }
        };
        tracing::info!(
            entity_type,
            run_id,
            legacy_table = %ctx.config.legacy_table,
            count = records.len(),
            "Extracted legacy records"
        );

        let resolver = FieldMappingResolver::new(&ctx.functions);
        let mut first_failure = None;
        for record in &records {
            counters.processed += 1;
            match self
                .process_record(run_id, &ctx, &resolver, record, &mut first_failure)
                .await
            {
                Ok(action) => counters.record(action),
                Err(fatal) => {
                    let err = SyncError::Failure(fatal.to_string());
                    return Err(self.abort_run(run_id, entity_type, &counters, err).await);
                }
            }
        }

        let status = counters.final_status();
        let summary = failure_summary(&counters, first_failure.as_deref());
        self.store
            .finish_run(run_id, status, &counters, summary.as_deref())
            .await
            .map_err(|e| SyncError::Failure(format!("Could not finalize run log: {e}")))?;

        tracing::info!(
            entity_type,
            run_id,
            status = %status,
            processed = counters.processed,
            created = counters.created,
            updated = counters.updated,
            failed = counters.failed,
            skipped = counters.skipped,
            "Sync run finished"
        );
        Ok(SyncStats::from(counters))
    }

    /// Transform up to `limit` records without writing anything.
    ///
    /// Always extracts the full table and opens no run log.
    pub async fn preview(
        &self,
        entity_type: &str,
        limit: usize,
    ) -> Result<Vec<PreviewRecord>, SyncError> {
        let ctx = self.resolve_context(entity_type).await?;
        let records = self
            .extractor
            .extract(entity_type, &ctx.config.legacy_table, false)
            .await?;
        let resolver = FieldMappingResolver::new(&ctx.functions);

        Ok(records
            .iter()
            .take(limit)
            .map(|record| {
                let legacy_id = legacy_id(record, &ctx.config.identity_field);
                match resolver.transform(record, &ctx.config) {
                    Ok(fields) => PreviewRecord {
                        legacy_id,
                        fields: Some(fields),
                        error: None,
                    },
                    Err(e) => PreviewRecord {
                        legacy_id,
                        fields: None,
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect())
    }

    async fn resolve_context(&self, entity_type: &str) -> Result<RunContext, SyncError> {
        let config = match self.store.active_mapping_config(entity_type).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                return Err(SyncError::Configuration(format!(
                    "No active mapping configuration for entity type '{entity_type}'"
                )))
            }
            Err(e) if e.is_fatal() => return Err(SyncError::Failure(e.to_string())),
            Err(e) => {
                return Err(SyncError::Configuration(format!(
                    "Invalid mapping configuration for entity type '{entity_type}': {e}"
                )))
            }
        };

        if !self.store.supports_model(&config.target_model).await {
            return Err(SyncError::Configuration(format!(
                "Unknown target model '{}' for entity type '{entity_type}'",
                config.target_model
            )));
        }

        let mut names: Vec<String> = config
            .referenced_transforms()
            .filter(|name| !is_builtin(name))
            .map(str::to_string)
            .collect();
        names.sort_unstable();
        names.dedup();

        let functions = if names.is_empty() {
            FunctionRegistry::new()
        } else {
            let stored = self
                .store
                .transformation_functions(&names)
                .await
                .map_err(|e| SyncError::Failure(format!("Could not load transforms: {e}")))?;
            for missing in names.iter().filter(|n| !stored.iter().any(|f| &f.name == *n)) {
                tracing::warn!(
                    entity_type,
                    function = %missing,
                    "Referenced transformation function is missing or inactive, using identity"
                );
            }
            FunctionRegistry::from_functions(
                stored.iter().map(|f| (f.name.as_str(), f.code.as_str())),
            )
        };

        Ok(RunContext { config, functions })
    }

    /// Handle one extracted record. `Err` only for run-fatal store failures.
    ///
    /// The first record-level failure of the run is kept in `first_failure`
    /// as `"<legacy_id>: <reason>"`.
    async fn process_record(
        &self,
        run_id: DbId,
        ctx: &RunContext,
        resolver: &FieldMappingResolver<'_>,
        record: &LegacyRecord,
        first_failure: &mut Option<String>,
    ) -> Result<RecordAction, StoreError> {
        let entity_type = ctx.config.entity_type.as_str();

        let Some(legacy_id) = legacy_id(record, &ctx.config.identity_field) else {
            tracing::debug!(
                entity_type,
                identity_field = %ctx.config.identity_field,
                "Skipping record without identity value"
            );
            self.audit(RecordAudit {
                run_id,
                legacy_id: None,
                action: RecordAction::Skipped,
                target_id: None,
                message: Some(format!(
                    "Missing identity field '{}'",
                    ctx.config.identity_field
                )),
            })
            .await;
            return Ok(RecordAction::Skipped);
        };

        let fields = match resolver.transform(record, &ctx.config) {
            Ok(fields) => fields,
            Err(e) => {
                tracing::warn!(entity_type, legacy_id = %legacy_id, error = %e, "Record transform failed");
                first_failure.get_or_insert_with(|| format!("{legacy_id}: {e}"));
                self.record_failure(run_id, &legacy_id, e.to_string()).await;
                return Ok(RecordAction::Failed);
            }
        };

        match self.load(ctx, &legacy_id, record, &fields).await {
            Ok(outcome) => {
                tracing::debug!(
                    entity_type,
                    legacy_id = %legacy_id,
                    target_id = %outcome.target_id(),
                    action = %outcome.action(),
                    "Record loaded"
                );
                if let LoadOutcome::Recreated { previous, fresh } = &outcome {
                    self.audit(RecordAudit {
                        run_id,
                        legacy_id: Some(legacy_id.clone()),
                        action: RecordAction::Recreated,
                        target_id: Some(fresh.clone()),
                        message: Some(format!(
                            "Target record '{previous}' was missing; mapping rebound"
                        )),
                    })
                    .await;
                }
                Ok(outcome.action())
            }
            Err(LoadError::Record(reason)) => {
                tracing::warn!(entity_type, legacy_id = %legacy_id, error = %reason, "Record load failed");
                first_failure.get_or_insert_with(|| format!("{legacy_id}: {reason}"));
                self.record_failure(run_id, &legacy_id, reason).await;
                Ok(RecordAction::Failed)
            }
            Err(LoadError::Fatal(e)) => {
                tracing::error!(entity_type, legacy_id = %legacy_id, error = %e, "Store unavailable during load");
                Err(e)
            }
        }
    }

    /// Write one record and its identity mapping atomically.
    ///
    /// The transaction is dropped, and rolled back, on any early return.
    async fn load(
        &self,
        ctx: &RunContext,
        legacy_id: &str,
        record: &LegacyRecord,
        fields: &TargetFields,
    ) -> Result<LoadOutcome, LoadError> {
        let entity_type = ctx.config.entity_type.as_str();
        let model = ctx.config.target_model.as_str();

        let mut tx = self.store.begin().await?;
        let outcome = match tx.lookup(entity_type, legacy_id).await? {
            Some(new_id) => match tx.get_target(model, &new_id).await? {
                Some(_) => {
                    tx.update_target(model, &new_id, fields).await?;
                    tx.touch(entity_type, legacy_id).await?;
                    LoadOutcome::Updated(new_id)
                }
                None => {
                    tracing::warn!(
                        entity_type,
                        legacy_id,
                        missing_target_id = %new_id,
                        "Mapped target record is missing, re-creating"
                    );
                    let fresh = tx.create_target(model, fields).await?;
                    tx.rebind(entity_type, legacy_id, &fresh).await?;
                    LoadOutcome::Recreated {
                        previous: new_id,
                        fresh,
                    }
                }
            },
            None => {
                let new_id = tx.create_target(model, fields).await?;
                tx.create_mapping(entity_type, legacy_id, &new_id).await?;
                LoadOutcome::Created(new_id)
            }
        };

        if let Some(hook) = self.hooks.get(entity_type) {
            let hook_ctx = HookContext {
                entity_type,
                target_model: model,
                legacy_id,
                legacy_record: record,
                target_id: outcome.target_id(),
                fields,
            };
            hook.enrich(&mut *tx, hook_ctx).await?;
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn record_failure(&self, run_id: DbId, legacy_id: &str, message: String) {
        self.audit(RecordAudit {
            run_id,
            legacy_id: Some(legacy_id.to_string()),
            action: RecordAction::Failed,
            target_id: None,
            message: Some(message),
        })
        .await;
    }

    /// Append a record audit entry. Failures are logged and ignored.
    async fn audit(&self, entry: RecordAudit) {
        if let Err(e) = self.store.append_record_audit(&entry).await {
            tracing::warn!(
                run_id = entry.run_id,
                legacy_id = ?entry.legacy_id,
                action = %entry.action,
                error = %e,
                "Failed to write record audit entry"
            );
        }
    }

    /// Mark the run failed and hand back the error for the caller.
    async fn abort_run(
        &self,
        run_id: DbId,
        entity_type: &str,
        counters: &RunCounters,
        err: SyncError,
    ) -> SyncError {
        let message = err.to_string();
        tracing::error!(entity_type, run_id, error = %message, "Sync run failed");
        if let Err(e) = self
            .store
            .finish_run(run_id, SyncRunStatus::Failed, counters, Some(&message))
            .await
        {
            tracing::error!(entity_type, run_id, error = %e, "Failed to finalize run log");
        }
        err
    }
}
