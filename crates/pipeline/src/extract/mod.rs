//! Legacy record extraction.
//!
//! [`Extractor`] is what the synchronizer consumes. [`SourceExtractor`]
//! implements it on top of a raw [`LegacySource`] and a [`WatermarkSource`]
//! that knows when the table was last synchronized successfully.

mod http;

use std::sync::Arc;

use async_trait::async_trait;
use syncbridge_core::record::LegacyRecord;
use syncbridge_core::types::Timestamp;

use crate::error::ExtractionError;

pub use http::{parse_rows, HttpLegacySource};

/// Produces the complete, ordered record set for one run.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Read every record of `table`, or only those modified since the last
    /// successful run of `entity_type` against that table when
    /// `incremental_only` is set.
    ///
    /// Partial results are never returned: any failure fails the whole call.
    async fn extract(
        &self,
        entity_type: &str,
        table: &str,
        incremental_only: bool,
    ) -> Result<Vec<LegacyRecord>, ExtractionError>;
}

/// Raw access to the legacy system.
#[async_trait]
pub trait LegacySource: Send + Sync {
    async fn fetch(
        &self,
        table: &str,
        modified_since: Option<Timestamp>,
    ) -> Result<Vec<LegacyRecord>, ExtractionError>;
}

/// Incremental extraction watermark lookup.
#[async_trait]
pub trait WatermarkSource: Send + Sync {
    /// Start time of the most recent completed or partially completed run of
    /// `entity_type` that read `table`.
    ///
    /// Runs of other entity types sharing the table never count, nor do runs
    /// made before the entity was repointed at `table`.
    async fn last_successful_start(
        &self,
        entity_type: &str,
        table: &str,
    ) -> Result<Option<Timestamp>, ExtractionError>;
}

/// [`Extractor`] that narrows incremental fetches to records modified since
/// the last successful run.
pub struct SourceExtractor {
    source: Arc<dyn LegacySource>,
    watermarks: Arc<dyn WatermarkSource>,
}

impl SourceExtractor {
    pub fn new(source: Arc<dyn LegacySource>, watermarks: Arc<dyn WatermarkSource>) -> Self {
        Self { source, watermarks }
    }
}

#[async_trait]
impl Extractor for SourceExtractor {
    async fn extract(
        &self,
        entity_type: &str,
        table: &str,
        incremental_only: bool,
    ) -> Result<Vec<LegacyRecord>, ExtractionError> {
        let modified_since = if incremental_only {
            self.watermarks.last_successful_start(entity_type, table).await?
        } else {
            None
        };
        if incremental_only && modified_since.is_none() {
            tracing::info!(entity_type, table, "No previous successful run, extracting full table");
        }

        let records = self.source.fetch(table, modified_since).await?;
        tracing::debug!(table, count = records.len(), ?modified_since, "Extracted legacy records");
        Ok(records)
    }
}
