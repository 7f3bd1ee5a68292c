//! Keystone API Server
//!
//! REST API server for registration, login and token refresh.
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use clap::Parser;
use keystone_api::{create_router, db, logging, repository::PgRepositoryRegistry, state::AppState};
use keystone_core::config::{AppConfig, ConfigSource};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "keystone-api")]
#[command(author = "hephaex <hephaex@gmail.com>")]
#[command(version)]
#[command(about = "Authentication and user administration API", long_about = None)]
struct Cli {
    /// Directory holding the configuration file
    #[arg(long, default_value = ".", env = "CONFIG_PATH")]
    config_path: PathBuf,

    /// Configuration file name (.env style, or .toml)
    #[arg(long, default_value = ".env", env = "CONFIG_FILENAME")]
    config_filename: String,

    /// Skip embedded schema migrations at startup
    #[arg(long)]
    skip_migrations: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_file = cli.config_path.join(&cli.config_filename);
    let (config, source) = AppConfig::load(&config_file)
        .with_context(|| format!("loading configuration from {}", config_file.display()))?;

    // Initialize tracing
    logging::init(&config.logging);
    match &source {
        ConfigSource::Toml(path) => tracing::info!(path = %path.display(), "loaded TOML config"),
        ConfigSource::Dotenv(path) => tracing::info!(path = %path.display(), "loaded dotenv file"),
        ConfigSource::EnvironmentOnly(path) => tracing::warn!(
            path = %path.display(),
            "dotenv file not found, using environment only"
        ),
    }
    tracing::info!(
        app = %config.app.name,
        environment = ?config.app.environment,
        "configuration loaded"
    );

    // Connect to the database
    let pool = db::connect(&config.database)
        .await
        .context("connecting to database")?;
    if cli.skip_migrations {
        tracing::warn!("skipping schema migrations");
    } else {
        db::migrate(&pool).await.context("running migrations")?;
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = AppState::new(config, PgRepositoryRegistry::new(pool.clone()))
        .context("building token codec")?;

    // Create router
    let app = create_router(Arc::new(state));

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Keystone API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
