//! Post-load enrichment hooks.
//!
//! Some entity types carry derived attributes that a flat field mapping
//! cannot express. A hook registered for the entity type runs after the
//! primary create or update, inside the same [`LoadTransaction`], so a hook
//! failure rolls the whole record back.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use syncbridge_core::record::{LegacyRecord, TargetFields};

use crate::error::StoreError;
use crate::store::LoadTransaction;

/// Inputs handed to an [`EnrichmentHook`].
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub entity_type: &'a str,
    pub target_model: &'a str,
    pub legacy_id: &'a str,
    pub legacy_record: &'a LegacyRecord,
    /// Id of the record just created or updated.
    pub target_id: &'a str,
    /// Fields written by the primary load.
    pub fields: &'a TargetFields,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    #[error("Enrichment rejected record: {0}")]
    Rejected(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait EnrichmentHook: Send + Sync {
    async fn enrich(
        &self,
        tx: &mut dyn LoadTransaction,
        ctx: HookContext<'_>,
    ) -> Result<(), HookError>;
}

/// Entity type -> hook.
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn EnrichmentHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` for `entity_type`, replacing any previous one.
    pub fn register(&mut self, entity_type: &str, hook: Arc<dyn EnrichmentHook>) {
        if self.hooks.insert(entity_type.to_string(), hook).is_some() {
            tracing::warn!(entity_type, "Replaced existing enrichment hook");
        }
    }

    pub fn get(&self, entity_type: &str) -> Option<&Arc<dyn EnrichmentHook>> {
        self.hooks.get(entity_type)
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
