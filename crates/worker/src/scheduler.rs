//! Periodic synchronization of several entity types.
//!
//! Every pass runs all configured entity types concurrently, each under the
//! retry policy. Runs for different entity types share nothing but the
//! store, so one failing entity type never blocks the others.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use syncbridge_core::sync_status::SyncStats;
use syncbridge_pipeline::{EntitySynchronizer, SyncError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::retry::{sync_entity, RetryPolicy};

/// Outcome of one entity type within a pass.
#[derive(Debug)]
pub struct PassResult {
    pub entity_type: String,
    pub outcome: Result<SyncStats, SyncError>,
}

pub struct Scheduler {
    sync: Arc<EntitySynchronizer>,
    entity_types: Vec<String>,
    incremental: bool,
    retry: RetryPolicy,
    interval: Option<Duration>,
}

impl Scheduler {
    pub fn new(sync: Arc<EntitySynchronizer>, config: &WorkerConfig) -> Self {
        Self {
            sync,
            entity_types: config.entity_types.clone(),
            incremental: config.incremental,
            retry: config.retry.clone(),
            interval: config.interval,
        }
    }

    /// Run passes until `cancel` fires, or a single pass when no interval is
    /// configured. Returns the number of entity types that failed in the last
    /// completed pass.
    pub async fn run(&self, cancel: CancellationToken) -> usize {
        let Some(period) = self.interval else {
            return failures(&self.run_pass(&cancel).await);
        };

        tracing::info!(
            interval_secs = period.as_secs(),
            entity_types = ?self.entity_types,
            "Sync scheduler started"
        );
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_failures = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Sync scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    last_failures = failures(&self.run_pass(&cancel).await);
                }
            }
        }
        last_failures
    }

    /// Synchronize every configured entity type once, concurrently.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Vec<PassResult> {
        let runs = self.entity_types.iter().map(|entity_type| async move {
            let outcome = sync_entity(
                &self.sync,
                entity_type,
                self.incremental,
                &self.retry,
                cancel,
            )
            .await;
            PassResult {
                entity_type: entity_type.clone(),
                outcome,
            }
        });
        let results = join_all(runs).await;

        for result in &results {
            match &result.outcome {
                Ok(stats) => tracing::info!(
                    entity_type = %result.entity_type,
                    fetched = stats.total_fetched,
                    created = stats.created,
                    updated = stats.updated,
                    errors = stats.errors,
                    skipped = stats.skipped,
                    "Entity synchronized"
                ),
                Err(e) => tracing::error!(
                    entity_type = %result.entity_type,
                    error = %e,
                    "Entity synchronization failed"
                ),
            }
        }
        results
    }
}

fn failures(results: &[PassResult]) -> usize {
    results.iter().filter(|r| r.outcome.is_err()).count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;
    use syncbridge_core::field_mapping::{validate_field_mappings, MappingConfig};
    use syncbridge_pipeline::memory::{MemorySource, MemoryStore};
    use syncbridge_pipeline::SourceExtractor;

    use super::*;

    async fn scheduler(entity_types: &[&str], interval: Option<Duration>) -> (Scheduler, Arc<MemorySource>) {
        let store = MemoryStore::new();
        store.add_model("customers", &[]).await;
        store
            .put_mapping_config(MappingConfig {
                entity_type: "customer".into(),
                legacy_table: "Kunden".into(),
                target_model: "customers".into(),
                identity_field: "__KEY".into(),
                field_mappings: validate_field_mappings(&json!({
                    "Name": { "new_field": "name" }
                }))
                .unwrap(),
                is_active: true,
            })
            .await;

        let source = Arc::new(MemorySource::new());
        source
            .set_table(
                "Kunden",
                vec![json!({ "__KEY": "1", "Name": "Meyer" })
                    .as_object()
                    .cloned()
                    .unwrap()],
            )
            .await;

        let extractor = SourceExtractor::new(source.clone(), Arc::new(store.clone()));
        let sync = Arc::new(EntitySynchronizer::new(Arc::new(store), Arc::new(extractor)));
        let scheduler = Scheduler {
            sync,
            entity_types: entity_types.iter().map(|e| e.to_string()).collect(),
            incremental: false,
            retry: RetryPolicy {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                multiplier: 2.0,
            },
            interval,
        };
        (scheduler, source)
    }

    #[tokio::test]
    async fn pass_reports_each_entity_type() {
        let (scheduler, source) = scheduler(&["customer", "supplier"], None).await;

        let results = scheduler.run_pass(&CancellationToken::new()).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entity_type, "customer");
        assert_matches!(&results[0].outcome, Ok(stats) if stats.created == 1);
        assert_matches!(&results[1].outcome, Err(SyncError::Configuration(_)));
        // The configuration error is not retried and never reaches the source.
        assert_eq!(source.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn single_pass_mode_returns_failure_count() {
        let (scheduler, _) = scheduler(&["customer", "supplier"], None).await;
        assert_eq!(scheduler.run(CancellationToken::new()).await, 1);
    }

    #[tokio::test]
    async fn cancelled_scheduler_stops() {
        let (scheduler, _) = scheduler(&["customer"], Some(Duration::from_secs(3600))).await;
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        let handle = tokio::spawn(async move { scheduler.run(cancel).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        stopper.cancel();

        let failures = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failures, 0);
    }
}
