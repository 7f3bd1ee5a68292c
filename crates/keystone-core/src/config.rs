//! Keystone Configuration Management
//!
//! Handles configuration from environment variables, `.env` files and TOML
//! config files, with sensible defaults for development. The resulting
//! [`AppConfig`] is built once at process start and passed by reference to
//! every component that needs it.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Signing secret used when nothing is configured. Rejected in production.
pub const DEVELOPMENT_JWT_SECRET: &str = "development-secret-key-change-in-production";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Application identity and environment
    pub app: AppSection,

    /// Server configuration
    pub server: ServerConfig,

    /// Database connection
    pub database: DatabaseConfig,

    /// Token signing and lifetimes
    pub guard: GuardConfig,

    /// API keys for the coarse pre-auth gate
    pub api_keys: ApiKeyConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    /// Load configuration the way the server binary does.
    ///
    /// A `.toml` file is parsed as a full config document; any other file is
    /// treated as a dotenv file whose entries are exported before the
    /// environment is read. A missing dotenv file is not an error. The result
    /// is always validated.
    ///
    /// Nothing is logged here since logging is configured from the result;
    /// the returned `ConfigSource` says which file, if any, was used.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, ConfigSource), ConfigError> {
        let path = path.as_ref();
        let (config, source) = if path.extension().is_some_and(|ext| ext == "toml") {
            let config = Self::from_file(path)?.with_env_override()?;
            (config, ConfigSource::Toml(path.to_path_buf()))
        } else {
            let source = match dotenvy::from_path(path) {
                Ok(()) => ConfigSource::Dotenv(path.to_path_buf()),
                Err(e) if e.not_found() => ConfigSource::EnvironmentOnly(path.to_path_buf()),
                Err(e) => {
                    return Err(ConfigError::ParseError {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })
                }
            };
            (Self::from_env()?, source)
        };

        config.validate()?;
        Ok((config, source))
    }

    /// Check that every required value is present and coherent
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.trim().is_empty() {
            return Err(ConfigError::MissingRequired("APP_NAME".to_string()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "APP_PORT".to_string(),
                value: "0".to_string(),
            });
        }
        if self.guard.jwt_secret.is_empty() {
            return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
        }
        if self.app.environment.is_prod() && self.guard.jwt_secret == DEVELOPMENT_JWT_SECRET {
            return Err(ConfigError::InvalidValue {
                key: "JWT_SECRET".to_string(),
                value: "<development default>".to_string(),
            });
        }
        if self.guard.access_ttl_hours <= 0 || self.guard.access_ttl().is_none() {
            return Err(ConfigError::InvalidValue {
                key: "JWT_TTL_HOURS".to_string(),
                value: self.guard.access_ttl_hours.to_string(),
            });
        }
        if self.guard.refresh_ttl_days <= 0 || self.guard.refresh_ttl().is_none() {
            return Err(ConfigError::InvalidValue {
                key: "JWT_REFRESH_TTL_DAYS".to_string(),
                value: self.guard.refresh_ttl_days.to_string(),
            });
        }
        if self.api_keys.x_api_key.is_empty() {
            return Err(ConfigError::MissingRequired("X_API_KEY".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DB_MAX_OPEN_CONS".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // App
        env_string("APP_NAME", &mut self.app.name);
        env_parse("APP_ENV", &mut self.app.environment)?;

        // Server
        env_string("APP_HOST", &mut self.server.host);
        env_parse("APP_PORT", &mut self.server.port)?;
        env_parse("REQUEST_TIMEOUT_SECS", &mut self.server.request_timeout_secs)?;
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = split_list(&origins);
        }

        // PostgreSQL
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        env_string("DB_HOST", &mut self.database.host);
        env_parse("DB_PORT", &mut self.database.port)?;
        env_string("DB_USER", &mut self.database.username);
        env_string("DB_PASS", &mut self.database.password);
        env_string("DB_NAME", &mut self.database.database);
        env_string("DB_SSL_MODE", &mut self.database.ssl_mode);
        env_parse("DB_CONN_TIMEOUT", &mut self.database.connect_timeout_secs)?;
        env_parse("DB_MAX_OPEN_CONS", &mut self.database.max_connections)?;
        env_parse("DB_MAX_IDLE_CONS", &mut self.database.min_connections)?;
        env_parse("DB_CONN_MAX_LIFETIME", &mut self.database.max_lifetime_mins)?;

        // Guard
        env_string("JWT_SECRET", &mut self.guard.jwt_secret);
        env_parse("JWT_TTL_HOURS", &mut self.guard.access_ttl_hours)?;
        env_parse("JWT_REFRESH_TTL_DAYS", &mut self.guard.refresh_ttl_days)?;
        if let Ok(roles) = std::env::var("ADMIN_ROLES") {
            self.guard.admin_roles = split_list(&roles);
        }

        // API keys
        env_string("X_API_KEY", &mut self.api_keys.x_api_key);

        // Logging
        env_string("APP_LOG_LEVEL", &mut self.logging.level);
        match std::env::var("LOG_FORMAT") {
            Ok(format) => self.logging.json_format = format.eq_ignore_ascii_case("json"),
            Err(_) => self.logging.json_format |= self.app.environment.is_prod(),
        }

        Ok(())
    }
}

fn env_string(key: &str, target: &mut String) {
    if let Ok(value) = std::env::var(key) {
        *target = value;
    }
}

fn env_parse<T: FromStr>(key: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(key) {
        *target = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Application identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// Application name, also used as the token issuer
    pub name: String,

    /// Deployment environment
    pub environment: Environment,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "keystone".to_string(),
            environment: Environment::Development,
        }
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Development,
    Local,
}

impl Environment {
    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" | "dev" => Ok(Self::Development),
            "local" => Ok(Self::Local),
            _ => Err(ConfigError::InvalidValue {
                key: "APP_ENV".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Allowed origins for CORS (empty allows any origin)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            cors_origins: vec![],
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full PostgreSQL URL; takes precedence over the discrete fields below
    pub url: Option<String>,

    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,

    /// libpq ssl mode (disable, prefer, require, ...)
    pub ssl_mode: String,

    /// Connection acquire timeout in seconds
    pub connect_timeout_secs: u64,

    /// Maximum pool size
    pub max_connections: u32,

    /// Connections kept open while idle
    pub min_connections: u32,

    /// Maximum connection lifetime in minutes (0 = unlimited)
    pub max_lifetime_mins: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "postgres".to_string(),
            ssl_mode: "disable".to_string(),
            connect_timeout_secs: 30,
            max_connections: 20,
            min_connections: 0,
            max_lifetime_mins: 0,
        }
    }
}

/// Where `AppConfig::load` found its values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from a TOML document, then overridden by the environment
    Toml(PathBuf),
    /// Dotenv file exported, then read from the environment
    Dotenv(PathBuf),
    /// Dotenv file missing; environment and defaults only
    EnvironmentOnly(PathBuf),
}

/// Token signing secret and lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Shared HMAC secret for signing and verifying tokens
    pub jwt_secret: String,

    /// Access token lifetime in hours
    pub access_ttl_hours: i64,

    /// Refresh token lifetime in days
    pub refresh_ttl_days: i64,

    /// Roles allowed to use the user administration endpoints
    pub admin_roles: Vec<String>,
}

impl GuardConfig {
    /// Access token lifetime; `None` when the hour count does not fit a `Duration`
    pub fn access_ttl(&self) -> Option<Duration> {
        Duration::try_hours(self.access_ttl_hours)
    }

    /// Refresh token lifetime; `None` when the day count does not fit a `Duration`
    pub fn refresh_ttl(&self) -> Option<Duration> {
        Duration::try_days(self.refresh_ttl_days)
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEVELOPMENT_JWT_SECRET.to_string(),
            access_ttl_hours: 24,
            refresh_ttl_days: 30,
            admin_roles: vec![crate::models::ROLE_ADMIN.to_string()],
        }
    }
}

/// API key gate configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApiKeyConfig {
    /// Value expected in the `x-api-key` header
    pub x_api_key: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
