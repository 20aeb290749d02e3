use std::sync::Arc;

use syncbridge_pipeline::{
    builtin_models, EntitySynchronizer, HttpLegacySource, PgSyncStore, SourceExtractor,
};
use syncbridge_worker::config::WorkerConfig;
use syncbridge_worker::scheduler::Scheduler;
use syncbridge_worker::telemetry::init_tracing;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid worker configuration: {e}");
            std::process::exit(2);
        }
    };

    // --- Tracing ---
    init_tracing(config.log_format);
    tracing::info!(
        entity_types = ?config.entity_types,
        incremental = config.incremental,
        interval_secs = config.interval.map(|d| d.as_secs()),
        "Sync worker starting"
    );

    // --- Database ---
    let pool = syncbridge_db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .expect("Failed to connect to database");
    syncbridge_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    syncbridge_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database connected, migrations applied");

    // --- Pipeline ---
    let models = Arc::new(builtin_models().expect("Built-in target models must be valid"));
    let store = Arc::new(PgSyncStore::new(pool.clone(), models));
    let source = HttpLegacySource::new(
        &config.legacy_api_url,
        config.legacy_api_token.clone(),
        config.legacy_request_timeout,
    )
    .expect("Failed to build legacy source client");
    let extractor = SourceExtractor::new(Arc::new(source), store.clone());
    let sync = Arc::new(EntitySynchronizer::new(store, Arc::new(extractor)));

    // --- Run ---
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let scheduler = Scheduler::new(sync, &config);
    let failures = scheduler.run(cancel).await;

    pool.close().await;
    tracing::info!(failures, "Sync worker stopped");
    if failures > 0 {
        std::process::exit(1);
    }
}

/// Cancel `cancel` on SIGINT or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
    cancel.cancel();
}
