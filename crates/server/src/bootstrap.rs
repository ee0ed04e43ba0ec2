use std::sync::Arc;

use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

use frontdesk_booking::AppointmentCoordinator;
use frontdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use frontdesk_core::quota::QuotaTracker;
use frontdesk_core::session::SessionQuotaGate;
use frontdesk_db::repositories::{AppointmentRepository, SqlAppointmentRepository, SqlCounterStore};
use frontdesk_db::{connect_with_settings, migrations, DbPool};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub repository: Arc<dyn AppointmentRepository>,
    pub coordinator: Arc<AppointmentCoordinator>,
    pub quota: Arc<QuotaTracker>,
    pub session_gate: Arc<SessionQuotaGate>,
}

impl Application {
    pub fn maintenance_token(&self) -> Option<String> {
        self.config
            .server
            .maintenance_token
            .as_ref()
            .map(|secret| secret.expose_secret().to_string())
    }
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
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

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
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let repository: Arc<dyn AppointmentRepository> =
        Arc::new(SqlAppointmentRepository::new(db_pool.clone()));
    let coordinator = Arc::new(AppointmentCoordinator::new(repository.clone()));
    let quota = Arc::new(QuotaTracker::with_limit(
        config.chat.free_message_limit,
        Arc::new(SqlCounterStore::new(db_pool.clone())),
    ));
    let session_gate = Arc::new(SessionQuotaGate::new(
        config.chat.free_message_limit,
        config.chat.session_window_hours as i64,
    ));

    Ok(Application { config, db_pool, repository, coordinator, quota, session_gate })
}
