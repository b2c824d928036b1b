use std::sync::Arc;

use leadline_core::config::{AppConfig, ConfigError, LoadOptions};
use leadline_db::repositories::{
    EventLedgerRepository, SqlAttemptRepository, SqlContactClaimRepository,
    SqlEventLedgerRepository, SqlWriteQueueRepository,
};
use leadline_db::{connect_with_settings, migrations, DbPool};
use leadline_telephony::{HttpCrmClient, HttpSmsClient, HttpVoiceClient};
use thiserror::Error;
use tracing::info;

use crate::pipeline::EngagementPipeline;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub pipeline: Arc<EngagementPipeline>,
    pub ledger: Arc<dyn EventLedgerRepository>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        contact_id = "unknown",
        attempt_id = "unknown",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        contact_id = "unknown",
        attempt_id = "unknown",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        contact_id = "unknown",
        attempt_id = "unknown",
        "database migrations applied"
    );

    let pipeline = Arc::new(EngagementPipeline::new(
        Arc::new(SqlAttemptRepository::new(db_pool.clone())),
        Arc::new(SqlContactClaimRepository::new(db_pool.clone())),
        Arc::new(SqlWriteQueueRepository::new(db_pool.clone())),
        Arc::new(HttpVoiceClient::new(config.voice.clone())),
        Arc::new(HttpSmsClient::new(config.sms.clone())),
        Arc::new(HttpCrmClient::new(config.crm.clone())),
        config.engagement.clone(),
        config.sms.clone(),
    ));
    let ledger: Arc<dyn EventLedgerRepository> =
        Arc::new(SqlEventLedgerRepository::new(db_pool.clone()));

    Ok(Application { config, db_pool, pipeline, ledger })
}

#[cfg(test)]
mod tests {
    use leadline_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_required_crm_credentials() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("crm.api_key"));
    }

    #[tokio::test]
    async fn integration_smoke_covers_startup_and_baseline_tables() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN \
             ('lead_event_ledger', 'contact_claim', 'engagement_attempt', 'crm_write_task')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected foundation tables to be available after bootstrap");
        assert_eq!(table_count, 4, "bootstrap should expose baseline engagement tables");

        app.db_pool.close().await;
    }

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                crm_api_key: Some("ghl-test-key".to_string()),
                crm_location_id: Some("loc-test".to_string()),
                voice_api_key: Some("vapi-test-key".to_string()),
                voice_assistant_id: Some("asst-test".to_string()),
                sms_account_sid: Some("AC-test".to_string()),
                sms_auth_token: Some("tw-test-token".to_string()),
                sms_from_number: Some("+15035550000".to_string()),
                sms_business_name: Some("Test Plumbing".to_string()),
                sms_callback_number: Some("+15035550111".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }
}
