mod bootstrap;
mod health;
mod pipeline;
mod webhook;

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use leadline_core::config::{AppConfig, LoadOptions};

const WRITE_DRAIN_INTERVAL_SECS: u64 = 15;
const WRITE_DRAIN_BATCH: u32 = 25;
const LEDGER_PURGE_INTERVAL_SECS: u64 = 3600;

fn init_logging(config: &AppConfig) {
    use leadline_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    spawn_write_drain_worker(app.pipeline.clone());
    spawn_ledger_purge_worker(app.ledger.clone());

    let state = webhook::WebhookState {
        pipeline: app.pipeline.clone(),
        ledger: app.ledger.clone(),
        webhook_secret: app.config.crm.webhook_secret.clone(),
        location_id: app.config.crm.location_id.clone(),
        dedup_retention_hours: app.config.engagement.dedup_retention_hours,
    };
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        contact_id = "unknown",
        attempt_id = "unknown",
        bind_address = %address,
        "leadline-server started"
    );

    axum::serve(listener, webhook::router(state))
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        contact_id = "unknown",
        attempt_id = "unknown",
        "leadline-server stopping"
    );

    Ok(())
}

/// Retries queued CRM writes whose backoff has elapsed.
fn spawn_write_drain_worker(pipeline: std::sync::Arc<pipeline::EngagementPipeline>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(WRITE_DRAIN_INTERVAL_SECS)).await;
            match pipeline.drain_due_writes(WRITE_DRAIN_BATCH).await {
                Ok(0) => {}
                Ok(count) => {
                    tracing::info!(
                        event_name = "system.write_queue.drained",
                        correlation_id = "write-queue",
                        contact_id = "unknown",
                        attempt_id = "unknown",
                        count,
                        "retried due crm write tasks"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        event_name = "system.write_queue.drain_failed",
                        correlation_id = "write-queue",
                        contact_id = "unknown",
                        attempt_id = "unknown",
                        error = %error,
                        "write queue drain pass failed"
                    );
                }
            }
        }
    });
}

/// Evicts dedup ledger entries past their retention window.
fn spawn_ledger_purge_worker(
    ledger: std::sync::Arc<dyn leadline_db::repositories::EventLedgerRepository>,
) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(LEDGER_PURGE_INTERVAL_SECS)).await;
            match ledger.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => {
                    tracing::info!(
                        event_name = "system.ledger.purged",
                        correlation_id = "ledger-purge",
                        contact_id = "unknown",
                        attempt_id = "unknown",
                        purged,
                        "expired dedup entries removed"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        event_name = "system.ledger.purge_failed",
                        correlation_id = "ledger-purge",
                        contact_id = "unknown",
                        attempt_id = "unknown",
                        error = %error,
                        "dedup ledger purge failed"
                    );
                }
            }
        }
    });
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
