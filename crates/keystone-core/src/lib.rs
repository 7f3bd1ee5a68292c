//! Keystone Core - configuration and shared domain types
//!
//! This crate holds the pieces every other Keystone crate depends on:
//! - Configuration management (env, dotenv and TOML sources)
//! - The persisted `User` model and role tags

pub mod config;
pub mod models;

pub use config::{
    ApiKeyConfig, AppConfig, AppSection, ConfigError, ConfigSource, DatabaseConfig, Environment, GuardConfig,
    LoggingConfig, ServerConfig,
};
pub use models::{normalize_email, User, ROLE_ADMIN, ROLE_USER};
