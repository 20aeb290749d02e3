//! PostgreSQL backend.
//!
//! Each [`PgLoadTransaction`] wraps one `sqlx` transaction, so the target
//! write and its identity mapping write commit or roll back together.
//! Dropping the transaction without committing rolls it back.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use syncbridge_core::field_mapping::MappingConfig;
use syncbridge_core::record::TargetFields;
use syncbridge_core::sync_status::{RunCounters, SyncRunStatus};
use syncbridge_core::types::{DbId, Timestamp};
use syncbridge_db::models::identity_mapping::CreateIdentityMapping;
use syncbridge_db::models::sync_record_log::CreateSyncRecordLog;
use syncbridge_db::repositories::{
    IdentityMappingRepo, MappingConfigRepo, SyncRecordLogRepo, SyncRunLogRepo,
    TransformationFunctionRepo,
};

use crate::error::{ExtractionError, StoreError};
use crate::extract::WatermarkSource;
use crate::model::{ModelRegistry, PgTargetModel};
use crate::store::{
    ConfigSource, LoadBackend, LoadTransaction, RecordAudit, RunLogStore, StoredFunction,
};

/// Production [`SyncStore`](crate::store::SyncStore) over a connection pool
/// and a start-up populated [`ModelRegistry`].
#[derive(Clone)]
pub struct PgSyncStore {
    pool: PgPool,
    models: Arc<ModelRegistry>,
}

impl PgSyncStore {
    pub fn new(pool: PgPool, models: Arc<ModelRegistry>) -> Self {
        Self { pool, models }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConfigSource for PgSyncStore {
    async fn active_mapping_config(
        &self,
        entity_type: &str,
    ) -> Result<Option<MappingConfig>, StoreError> {
        let Some(row) = MappingConfigRepo::find_active_by_entity_type(&self.pool, entity_type).await?
        else {
            return Ok(None);
        };
        row.into_config()
            .map(Some)
            .map_err(|e| StoreError::Rejected(e.to_string()))
    }

    async fn transformation_functions(
        &self,
        names: &[String],
    ) -> Result<Vec<StoredFunction>, StoreError> {
        let functions = TransformationFunctionRepo::list_active_by_names(&self.pool, names).await?;
        Ok(functions
            .into_iter()
            .map(|f| StoredFunction {
                name: f.name,
                code: f.code,
            })
            .collect())
    }
}

#[async_trait]
impl RunLogStore for PgSyncStore {
    async fn start_run(
        &self,
        entity_type: &str,
        legacy_table: Option<&str>,
        incremental: bool,
    ) -> Result<DbId, StoreError> {
        let run = SyncRunLogRepo::start(&self.pool, entity_type, legacy_table, incremental).await?;
        Ok(run.id)
    }

    async fn finish_run(
        &self,
        run_id: DbId,
        status: SyncRunStatus,
        counters: &RunCounters,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        SyncRunLogRepo::finish(&self.pool, run_id, status, counters, error_message)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("sync run {run_id}")))?;
        Ok(())
    }

    async fn append_record_audit(&self, entry: &RecordAudit) -> Result<(), StoreError> {
        SyncRecordLogRepo::create(
            &self.pool,
            &CreateSyncRecordLog {
                run_id: entry.run_id,
                legacy_id: entry.legacy_id.clone(),
                action: entry.action.as_str().to_string(),
                target_id: entry.target_id.clone(),
                message: entry.message.clone(),
            },
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WatermarkSource for PgSyncStore {
    async fn last_successful_start(
        &self,
        entity_type: &str,
        table: &str,
    ) -> Result<Option<Timestamp>, ExtractionError> {
        SyncRunLogRepo::last_successful_start(&self.pool, entity_type, table)
            .await
            .map_err(|e| ExtractionError::Connectivity(format!("Watermark lookup failed: {e}")))
    }
}

#[async_trait]
impl LoadBackend for PgSyncStore {
    async fn supports_model(&self, target_model: &str) -> bool {
        self.models.contains(target_model)
    }

    async fn begin(&self) -> Result<Box<dyn LoadTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLoadTransaction {
            tx,
            models: Arc::clone(&self.models),
        }))
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

pub struct PgLoadTransaction {
    tx: Transaction<'static, Postgres>,
    models: Arc<ModelRegistry>,
}

impl PgLoadTransaction {
    fn model(&self, target_model: &str) -> Result<Arc<dyn PgTargetModel>, StoreError> {
        self.models
            .get(target_model)
            .cloned()
            .ok_or_else(|| StoreError::UnknownModel(target_model.to_string()))
    }
}

#[async_trait]
impl LoadTransaction for PgLoadTransaction {
    async fn lookup(
        &mut self,
        entity_type: &str,
        legacy_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let mapping = IdentityMappingRepo::lookup(&mut *self.tx, entity_type, legacy_id).await?;
        Ok(mapping.map(|m| m.new_id))
    }

    async fn create_mapping(
        &mut self,
        entity_type: &str,
        legacy_id: &str,
        new_id: &str,
    ) -> Result<(), StoreError> {
        let input = CreateIdentityMapping {
            entity_type: entity_type.to_string(),
            legacy_id: legacy_id.to_string(),
            new_id: new_id.to_string(),
        };
        IdentityMappingRepo::create(&mut *self.tx, &input).await?;
        Ok(())
    }

    async fn touch(&mut self, entity_type: &str, legacy_id: &str) -> Result<(), StoreError> {
        IdentityMappingRepo::touch(&mut *self.tx, entity_type, legacy_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("mapping {entity_type} '{legacy_id}'")))?;
        Ok(())
    }

    async fn rebind(
        &mut self,
        entity_type: &str,
        legacy_id: &str,
        new_id: &str,
    ) -> Result<(), StoreError> {
        IdentityMappingRepo::rebind(&mut *self.tx, entity_type, legacy_id, new_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("mapping {entity_type} '{legacy_id}'")))?;
        Ok(())
    }

    async fn create_target(
        &mut self,
        target_model: &str,
        fields: &TargetFields,
    ) -> Result<String, StoreError> {
        let model = self.model(target_model)?;
        model.create(&mut *self.tx, fields).await
    }

    async fn get_target(
        &mut self,
        target_model: &str,
        id: &str,
    ) -> Result<Option<TargetFields>, StoreError> {
        let model = self.model(target_model)?;
        model.get_by_id(&mut *self.tx, id).await
    }

    async fn update_target(
        &mut self,
        target_model: &str,
        id: &str,
        fields: &TargetFields,
    ) -> Result<(), StoreError> {
        let model = self.model(target_model)?;
        model.update(&mut *self.tx, id, fields).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
