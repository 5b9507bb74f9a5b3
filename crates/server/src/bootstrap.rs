use std::sync::Arc;

use axum::Router;
use secrecy::SecretString;
use thiserror::Error;
use tracing::info;

use venuely_agent::conversation::ConversationManager;
use venuely_agent::llm::{AnthropicClient, LlmClient, LlmError};
use venuely_agent::runtime::AgentRuntime;
use venuely_core::config::{AppConfig, ConfigError, LoadOptions};
use venuely_db::repositories::{
    ActionRepository, BookingRepository, ConversationRepository, SqlActionRepository,
    SqlBookingRepository, SqlConversationRepository, SqlVenueRepository, VenueRepository,
};
use venuely_db::{connect_with_settings, migrations, DbPool};

use crate::api::{self, ApiState};
use crate::approvals::DecisionService;
use crate::collaborators::{BroadcastHub, RepositoryBookingWriter, TracingNotifier};
use crate::health;
use crate::sweep::SweepService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub router: Router,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("model client setup failed: {0}")]
    Llm(#[source] LlmError),
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

    let llm: Arc<dyn LlmClient> =
        Arc::new(AnthropicClient::new(&config.llm).map_err(BootstrapError::Llm)?);
    let router = build_router(&config, db_pool.clone(), llm, config.sweep.shared_secret.clone());

    Ok(Application { config, db_pool, router })
}

/// Wires repositories, services and routes. Separated from config/database
/// setup so tests can assemble the router around their own doubles.
pub fn build_router(
    config: &AppConfig,
    db_pool: DbPool,
    llm: Arc<dyn LlmClient>,
    sweep_secret: Option<SecretString>,
) -> Router {
    let venues: Arc<dyn VenueRepository> = Arc::new(SqlVenueRepository::new(db_pool.clone()));
    let conversations: Arc<dyn ConversationRepository> =
        Arc::new(SqlConversationRepository::new(db_pool.clone()));
    let actions: Arc<dyn ActionRepository> = Arc::new(SqlActionRepository::new(db_pool.clone()));
    let bookings: Arc<dyn BookingRepository> = Arc::new(SqlBookingRepository::new(db_pool.clone()));

    let runtime = Arc::new(AgentRuntime::new(
        llm,
        venues.clone(),
        conversations.clone(),
        bookings.clone(),
        actions.clone(),
        config.agent.max_tool_rounds,
        config.agent.conversation_ttl_days,
    ));

    let decisions = Arc::new(DecisionService::new(
        venues,
        conversations.clone(),
        actions.clone(),
        bookings.clone(),
        Arc::new(RepositoryBookingWriter::new(bookings)),
        Arc::new(TracingNotifier),
        Arc::new(BroadcastHub::default()),
    ));

    let sweep = Arc::new(SweepService::new(
        conversations.clone(),
        actions.clone(),
        config.agent.action_stale_days,
    ));

    let manager = Arc::new(ConversationManager::new(
        conversations.clone(),
        config.agent.conversation_ttl_days,
    ));

    let api_state = ApiState {
        runtime,
        decisions,
        sweep,
        manager,
        conversations,
        actions,
        sweep_secret,
    };

    api::router(api_state).merge(health::router(db_pool))
}

#[cfg(test)]
mod tests {
    use venuely_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap, BootstrapError};

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_model_api_key() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(matches!(result, Err(BootstrapError::Llm(_))));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_builds_the_router() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                llm_api_key: Some("test-key".to_string()),
                sweep_shared_secret: Some("sweep-secret".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with a key and in-memory database");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('venue', 'conversation', 'agent_action', 'booking')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("baseline tables should exist after bootstrap");
        assert_eq!(table_count, 4);

        app.db_pool.close().await;
    }
}
