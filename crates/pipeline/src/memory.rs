//! In-memory backend and legacy source.
//!
//! [`MemoryStore`] implements every store seam over a single mutex-guarded
//! state. A [`MemoryTransaction`] holds the lock for its whole lifetime and
//! restores a snapshot of the identity mappings and target rows when
//! dropped uncommitted, which gives the same atomicity as a database
//! transaction. Used by the integration tests and for local dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use syncbridge_core::field_mapping::MappingConfig;
use syncbridge_core::record::{LegacyRecord, TargetFields};
use syncbridge_core::sync_status::{RunCounters, SyncRunStatus};
use syncbridge_core::types::{DbId, Timestamp};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{ExtractionError, StoreError};
use crate::extract::{LegacySource, WatermarkSource};
use crate::store::{
    ConfigSource, LoadBackend, LoadTransaction, RecordAudit, RunLogStore, StoredFunction,
};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// One identity mapping as held by the memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMapping {
    pub new_id: String,
    pub created_at: Timestamp,
    pub last_synced_at: Timestamp,
}

/// One run log as held by the memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRun {
    pub id: DbId,
    pub entity_type: String,
    pub legacy_table: Option<String>,
    pub status: SyncRunStatus,
    pub incremental: bool,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub counters: RunCounters,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct MemoryModel {
    rows: BTreeMap<String, TargetFields>,
    unique_fields: Vec<String>,
}

/// The part of the state a load transaction may change.
#[derive(Debug, Clone, Default)]
struct LoadState {
    mappings: BTreeMap<(String, String), MemoryMapping>,
    models: HashMap<String, MemoryModel>,
    next_target_id: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    configs: HashMap<String, MappingConfig>,
    functions: HashMap<String, (StoredFunction, bool)>,
    runs: Vec<MemoryRun>,
    audits: Vec<RecordAudit>,
    load: LoadState,
    clock: Option<Timestamp>,
    /// Remaining transactions before `begin` reports the store unavailable.
    load_budget: Option<usize>,
}

impl MemoryState {
    /// Wall-clock time, forced strictly increasing.
    fn tick(&mut self) -> Timestamp {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory implementation of [`SyncStore`](crate::store::SyncStore).
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the configuration for `config.entity_type`.
    pub async fn put_mapping_config(&self, config: MappingConfig) {
        let mut state = self.state.lock().await;
        state.configs.insert(config.entity_type.clone(), config);
    }

    pub async fn put_function(&self, name: &str, code: &str, is_active: bool) {
        let function = StoredFunction {
            name: name.to_string(),
            code: code.to_string(),
        };
        let mut state = self.state.lock().await;
        state
            .functions
            .insert(name.to_string(), (function, is_active));
    }

    /// Declare a writable target model. Values of `unique_fields` must be
    /// unique across the model's rows.
    pub async fn add_model(&self, name: &str, unique_fields: &[&str]) {
        let mut state = self.state.lock().await;
        state.load.models.insert(
            name.to_string(),
            MemoryModel {
                rows: BTreeMap::new(),
                unique_fields: unique_fields.iter().map(|f| f.to_string()).collect(),
            },
        );
    }

    /// Let `remaining` more load transactions start; after that `begin`
    /// fails with [`StoreError::Unavailable`]. `None` removes the limit.
    pub async fn limit_loads(&self, remaining: Option<usize>) {
        self.state.lock().await.load_budget = remaining;
    }

    /// Insert a mapping directly, bypassing the synchronizer.
    pub async fn insert_mapping(&self, entity_type: &str, legacy_id: &str, new_id: &str) {
        let mut state = self.state.lock().await;
        let now = state.tick();
        state.load.mappings.insert(
            (entity_type.to_string(), legacy_id.to_string()),
            MemoryMapping {
                new_id: new_id.to_string(),
                created_at: now,
                last_synced_at: now,
            },
        );
    }

    pub async fn mapping(&self, entity_type: &str, legacy_id: &str) -> Option<MemoryMapping> {
        let state = self.state.lock().await;
        state
            .load
            .mappings
            .get(&(entity_type.to_string(), legacy_id.to_string()))
            .cloned()
    }

    pub async fn mapping_count(&self, entity_type: &str) -> usize {
        let state = self.state.lock().await;
        state
            .load
            .mappings
            .keys()
            .filter(|(entity, _)| entity == entity_type)
            .count()
    }

    pub async fn target(&self, model: &str, id: &str) -> Option<TargetFields> {
        let state = self.state.lock().await;
        state.load.models.get(model)?.rows.get(id).cloned()
    }

    pub async fn target_count(&self, model: &str) -> usize {
        let state = self.state.lock().await;
        state.load.models.get(model).map_or(0, |m| m.rows.len())
    }

    /// Remove a target row out-of-band, leaving any mapping in place.
    pub async fn delete_target(&self, model: &str, id: &str) -> bool {
        let mut state = self.state.lock().await;
        state
            .load
            .models
            .get_mut(model)
            .is_some_and(|m| m.rows.remove(id).is_some())
    }

    pub async fn runs(&self) -> Vec<MemoryRun> {
        self.state.lock().await.runs.clone()
    }

    pub async fn audits(&self, run_id: DbId) -> Vec<RecordAudit> {
        let state = self.state.lock().await;
        state
            .audits
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ConfigSource for MemoryStore {
    async fn active_mapping_config(
        &self,
        entity_type: &str,
    ) -> Result<Option<MappingConfig>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .configs
            .get(entity_type)
            .filter(|c| c.is_active)
            .cloned())
    }

    async fn transformation_functions(
        &self,
        names: &[String],
    ) -> Result<Vec<StoredFunction>, StoreError> {
        let state = self.state.lock().await;
        Ok(names
            .iter()
            .filter_map(|name| state.functions.get(name))
            .filter(|(_, active)| *active)
            .map(|(function, _)| function.clone())
            .collect())
    }
}

#[async_trait]
impl RunLogStore for MemoryStore {
    async fn start_run(
        &self,
        entity_type: &str,
        legacy_table: Option<&str>,
        incremental: bool,
    ) -> Result<DbId, StoreError> {
        let mut state = self.state.lock().await;
        let started_at = state.tick();
        let id = state.runs.len() as DbId + 1;
        state.runs.push(MemoryRun {
            id,
            entity_type: entity_type.to_string(),
            legacy_table: legacy_table.map(str::to_string),
            status: SyncRunStatus::InProgress,
            incremental,
            started_at,
            completed_at: None,
            counters: RunCounters::default(),
            error_message: None,
        });
        Ok(id)
    }

    async fn finish_run(
        &self,
        run_id: DbId,
        status: SyncRunStatus,
        counters: &RunCounters,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let completed_at = state.tick();
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| StoreError::NotFound(format!("sync run {run_id}")))?;
        if run.status.is_terminal() {
            return Err(StoreError::Rejected(format!(
                "Sync run {run_id} is already finalized as {}",
                run.status
            )));
        }
        run.status = status;
        run.counters = *counters;
        run.error_message = error_message.map(str::to_string);
        run.completed_at = Some(completed_at);
        Ok(())
    }

    async fn append_record_audit(&self, entry: &RecordAudit) -> Result<(), StoreError> {
        self.state.lock().await.audits.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl WatermarkSource for MemoryStore {
    async fn last_successful_start(
        &self,
        entity_type: &str,
        table: &str,
    ) -> Result<Option<Timestamp>, ExtractionError> {
        let state = self.state.lock().await;
        Ok(state
            .runs
            .iter()
            .filter(|run| run.status.is_successful())
            .filter(|run| run.entity_type == entity_type)
            .filter(|run| run.legacy_table.as_deref() == Some(table))
            .map(|run| run.started_at)
            .max())
    }
}

#[async_trait]
impl LoadBackend for MemoryStore {
    async fn supports_model(&self, target_model: &str) -> bool {
        let state = self.state.lock().await;
        state.load.models.contains_key(target_model)
    }

    async fn begin(&self) -> Result<Box<dyn LoadTransaction>, StoreError> {
        let mut guard = self.state.clone().lock_owned().await;
        if let Some(remaining) = guard.load_budget.as_mut() {
            if *remaining == 0 {
                return Err(StoreError::Unavailable(
                    "memory store load budget exhausted".to_string(),
                ));
            }
            *remaining -= 1;
        }
        let snapshot = guard.load.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            snapshot: Some(snapshot),
        }))
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Exclusive, rollback-on-drop view of a [`MemoryStore`].
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: Option<LoadState>,
}

impl MemoryTransaction {
    fn model_mut(&mut self, target_model: &str) -> Result<&mut MemoryModel, StoreError> {
        self.guard
            .load
            .models
            .get_mut(target_model)
            .ok_or_else(|| StoreError::UnknownModel(target_model.to_string()))
    }

    fn key(entity_type: &str, legacy_id: &str) -> (String, String) {
        (entity_type.to_string(), legacy_id.to_string())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.guard.load = snapshot;
        }
    }
}

/// Rejects `fields` if a unique field value already belongs to another row.
fn check_unique(
    model: &MemoryModel,
    target_model: &str,
    own_id: Option<&str>,
    fields: &TargetFields,
) -> Result<(), StoreError> {
    for unique in &model.unique_fields {
        let Some(value) = fields.get(unique).filter(|v| !v.is_null()) else {
            continue;
        };
        let clash = model
            .rows
            .iter()
            .any(|(id, row)| Some(id.as_str()) != own_id && row.get(unique) == Some(value));
        if clash {
            return Err(StoreError::DuplicateKey(format!(
                "{target_model}.{unique} = {value} already exists"
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl LoadTransaction for MemoryTransaction {
    async fn lookup(
        &mut self,
        entity_type: &str,
        legacy_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .guard
            .load
            .mappings
            .get(&Self::key(entity_type, legacy_id))
            .map(|m| m.new_id.clone()))
    }

    async fn create_mapping(
        &mut self,
        entity_type: &str,
        legacy_id: &str,
        new_id: &str,
    ) -> Result<(), StoreError> {
        let key = Self::key(entity_type, legacy_id);
        let load = &self.guard.load;
        if load.mappings.contains_key(&key) {
            return Err(StoreError::DuplicateKey(format!(
                "Mapping for {entity_type} '{legacy_id}' already exists"
            )));
        }
        if load
            .mappings
            .iter()
            .any(|((entity, _), m)| entity == entity_type && m.new_id == new_id)
        {
            return Err(StoreError::DuplicateKey(format!(
                "Target '{new_id}' is already mapped for {entity_type}"
            )));
        }
        let now = self.guard.tick();
        self.guard.load.mappings.insert(
            key,
            MemoryMapping {
                new_id: new_id.to_string(),
                created_at: now,
                last_synced_at: now,
            },
        );
        Ok(())
    }

    async fn touch(&mut self, entity_type: &str, legacy_id: &str) -> Result<(), StoreError> {
        let now = self.guard.tick();
        let mapping = self
            .guard
            .load
            .mappings
            .get_mut(&Self::key(entity_type, legacy_id))
            .ok_or_else(|| StoreError::NotFound(format!("mapping {entity_type} '{legacy_id}'")))?;
        mapping.last_synced_at = now;
        Ok(())
    }

    async fn rebind(
        &mut self,
        entity_type: &str,
        legacy_id: &str,
        new_id: &str,
    ) -> Result<(), StoreError> {
        let now = self.guard.tick();
        let mapping = self
            .guard
            .load
            .mappings
            .get_mut(&Self::key(entity_type, legacy_id))
            .ok_or_else(|| StoreError::NotFound(format!("mapping {entity_type} '{legacy_id}'")))?;
        mapping.new_id = new_id.to_string();
        mapping.last_synced_at = now;
        Ok(())
    }

    async fn create_target(
        &mut self,
        target_model: &str,
        fields: &TargetFields,
    ) -> Result<String, StoreError> {
        let model = self.model_mut(target_model)?;
        check_unique(model, target_model, None, fields)?;
        self.guard.load.next_target_id += 1;
        let id = self.guard.load.next_target_id.to_string();
        self.model_mut(target_model)?
            .rows
            .insert(id.clone(), fields.clone());
        Ok(id)
    }

    async fn get_target(
        &mut self,
        target_model: &str,
        id: &str,
    ) -> Result<Option<TargetFields>, StoreError> {
        Ok(self.model_mut(target_model)?.rows.get(id).cloned())
    }

    async fn update_target(
        &mut self,
        target_model: &str,
        id: &str,
        fields: &TargetFields,
    ) -> Result<(), StoreError> {
        let model = self.model_mut(target_model)?;
        check_unique(model, target_model, Some(id), fields)?;
        let row = model
            .rows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("{target_model} record '{id}'")))?;
        for (field, value) in fields {
            row.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        this.snapshot = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Legacy source
// ---------------------------------------------------------------------------

/// In-memory [`LegacySource`] with failure injection.
///
/// Every table is returned in full; requested watermarks are recorded so
/// callers can assert on them.
#[derive(Default)]
pub struct MemorySource {
    tables: Mutex<HashMap<String, Vec<LegacyRecord>>>,
    failure: Mutex<Option<ExtractionError>>,
    requests: Mutex<Vec<(String, Option<Timestamp>)>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_table(&self, table: &str, rows: Vec<LegacyRecord>) {
        self.tables.lock().await.insert(table.to_string(), rows);
    }

    /// Make every subsequent fetch fail with `failure` (or succeed again).
    pub async fn fail_with(&self, failure: Option<ExtractionError>) {
        *self.failure.lock().await = failure;
    }

    /// `(table, modified_since)` of every fetch so far.
    pub async fn requests(&self) -> Vec<(String, Option<Timestamp>)> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LegacySource for MemorySource {
    async fn fetch(
        &self,
        table: &str,
        modified_since: Option<Timestamp>,
    ) -> Result<Vec<LegacyRecord>, ExtractionError> {
        self.requests
            .lock()
            .await
            .push((table.to_string(), modified_since));
        if let Some(failure) = self.failure.lock().await.clone() {
            return Err(failure);
        }
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .ok_or_else(|| ExtractionError::UnknownTable(table.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn fields(value: serde_json::Value) -> TargetFields {
        value.as_object().cloned().unwrap()
    }

    async fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_model("products", &["product_sku"]).await;
        store
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = store().await;
        {
            let mut tx = store.begin().await.unwrap();
            let id = tx
                .create_target("products", &fields(json!({ "product_sku": "A" })))
                .await
                .unwrap();
            tx.create_mapping("widget", "K1", &id).await.unwrap();
        }
        assert_eq!(store.target_count("products").await, 0);
        assert!(store.mapping("widget", "K1").await.is_none());
    }

    #[tokio::test]
    async fn committed_transaction_persists() {
        let store = store().await;
        let mut tx = store.begin().await.unwrap();
        let id = tx
            .create_target("products", &fields(json!({ "product_sku": "A" })))
            .await
            .unwrap();
        tx.create_mapping("widget", "K1", &id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.mapping("widget", "K1").await.unwrap().new_id, id);
    }

    #[tokio::test]
    async fn duplicate_mapping_is_rejected_on_either_side() {
        let store = store().await;
        store.insert_mapping("widget", "K1", "1").await;
        let mut tx = store.begin().await.unwrap();

        assert_matches!(
            tx.create_mapping("widget", "K1", "2").await,
            Err(StoreError::DuplicateKey(_))
        );
        assert_matches!(
            tx.create_mapping("widget", "K9", "1").await,
            Err(StoreError::DuplicateKey(_))
        );
        assert!(tx.create_mapping("gadget", "K1", "1").await.is_ok());
    }

    #[tokio::test]
    async fn touch_of_unknown_pair_is_not_found() {
        let store = store().await;
        let mut tx = store.begin().await.unwrap();
        assert_matches!(
            tx.touch("widget", "nope").await,
            Err(StoreError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn unknown_model_is_reported() {
        let store = store().await;
        assert!(!store.supports_model("orders").await);
        let mut tx = store.begin().await.unwrap();
        assert_matches!(
            tx.create_target("orders", &TargetFields::new()).await,
            Err(StoreError::UnknownModel(_))
        );
    }

    #[tokio::test]
    async fn run_log_is_finalized_once() {
        let store = store().await;
        let id = store.start_run("widget", Some("Artikel"), false).await.unwrap();
        let counters = RunCounters::default();
        store
            .finish_run(id, SyncRunStatus::Completed, &counters, None)
            .await
            .unwrap();
        assert_matches!(
            store
                .finish_run(id, SyncRunStatus::Failed, &counters, Some("late"))
                .await,
            Err(StoreError::Rejected(_))
        );
    }

    #[tokio::test]
    async fn load_budget_makes_store_unavailable() {
        let store = store().await;
        store.limit_loads(Some(0)).await;
        assert_matches!(store.begin().await.err(), Some(StoreError::Unavailable(_)));
    }
}
