//! # Mirsal API Main Entry Point
//!
//! This is the main entry point for the mirsal delivery service.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use migration::{Migrator, MigratorTrait};
use mirsal::channels::{ChannelSender, EmailSender, SmsSender};
use mirsal::rate_limit::RateLimiter;
use mirsal::{
    config::ConfigLoader, db::init_pool, outbox_worker::OutboxWorker, server::run_server,
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = init_pool(&config).await?;
    Migrator::up(&db, None).await?;

    // The delivery loop runs in-process unless disabled, in which case the
    // cron endpoint drives delivery.
    let shutdown = CancellationToken::new();
    let worker_handle = if config.worker.loop_enabled {
        let worker_config = Arc::new(config.clone());
        let senders: Vec<Arc<dyn ChannelSender>> = vec![
            Arc::new(SmsSender::new(&worker_config.channels)),
            Arc::new(EmailSender::new(&worker_config.channels)),
        ];
        let limiter = Arc::new(RateLimiter::from_config(&worker_config));
        let worker = OutboxWorker::new(worker_config, db.clone(), senders, limiter);

        let worker_shutdown = shutdown.child_token();
        Some(tokio::spawn(async move {
            worker.run(worker_shutdown).await
        }))
    } else {
        tracing::info!("Outbox worker loop disabled, delivery driven by cron endpoint");
        None
    };

    let result = run_server(config, db).await;

    shutdown.cancel();
    if let Some(handle) = worker_handle {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(error = ?err, "Outbox worker exited with error"),
            Err(err) => tracing::error!(error = ?err, "Outbox worker task panicked"),
        }
    }

    result
}
