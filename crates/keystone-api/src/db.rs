//! Postgres pool bootstrap and schema migrations

use keystone_core::config::DatabaseConfig;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Pool bootstrap errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Invalid database configuration: {0}")]
    Config(String),

    #[error("Failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Build connection options from the URL, or from the discrete fields
pub fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions, DbError> {
    if let Some(url) = config.url.as_deref().filter(|u| !u.is_empty()) {
        return PgConnectOptions::from_str(url).map_err(|e| DbError::Config(e.to_string()));
    }

    let ssl_mode = PgSslMode::from_str(&config.ssl_mode)
        .map_err(|e| DbError::Config(format!("ssl_mode {}: {e}", config.ssl_mode)))?;

    Ok(PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database)
        .ssl_mode(ssl_mode))
}

/// Pool sizing and timeouts from config
pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    let max_lifetime = match config.max_lifetime_mins {
        0 => None,
        mins => Some(Duration::from_secs(mins * 60)),
    };

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .max_lifetime(max_lifetime)
}

/// Open the pool and wait for the first connection
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let options = connect_options(config)?;
    let pool = pool_options(config)
        .connect_with(options)
        .await
        .map_err(DbError::Connect)?;

    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "database pool ready"
    );
    Ok(pool)
}

/// Apply the embedded migrations
pub async fn migrate(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("database migrations applied");
    Ok(())
}
