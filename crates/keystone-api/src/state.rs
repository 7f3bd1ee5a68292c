//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::auth::{AuthService, PasswordConfig, RoleGate, TokenCodec, TokenError};
use crate::middleware::{ApiKey, SecurityHeaders};
use crate::repository::RepositoryRegistry;
use crate::users::UserService;
use keystone_core::config::AppConfig;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
///
/// Built once at startup and never mutated; handlers receive it as
/// `State<Arc<AppState<R>>>`.
pub struct AppState<R> {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Token issuance and validation
    pub codec: Arc<TokenCodec>,
    /// Login, refresh and registration
    pub auth: AuthService<R>,
    /// User administration
    pub users: UserService<R>,
    /// Storage gateway, used directly only for readiness checks
    pub registry: R,
    /// Server start time
    pub start_time: Instant,
}

impl<R: RepositoryRegistry> AppState<R> {
    /// Create state with production password hashing parameters
    pub fn new(config: AppConfig, registry: R) -> Result<Self, TokenError> {
        Self::with_password_config(config, registry, PasswordConfig::default())
    }

    pub fn with_password_config(
        config: AppConfig,
        registry: R,
        passwords: PasswordConfig,
    ) -> Result<Self, TokenError> {
        let codec = Arc::new(TokenCodec::new(&config.guard, config.app.name.clone())?);

        Ok(Self {
            auth: AuthService::new(registry.clone(), Arc::clone(&codec), passwords.clone()),
            users: UserService::new(registry.clone(), passwords),
            codec,
            registry,
            config: Arc::new(config),
            start_time: Instant::now(),
        })
    }

    /// Roles allowed on the user administration routes
    pub fn admin_gate(&self) -> RoleGate {
        RoleGate::new(self.config.guard.admin_roles.iter().cloned())
    }

    pub fn api_key(&self) -> ApiKey {
        ApiKey::new(&self.config.api_keys.x_api_key)
    }

    pub fn security_headers(&self) -> SecurityHeaders {
        SecurityHeaders {
            hsts: self.config.app.environment.is_prod(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepositoryRegistry;
    use keystone_core::Environment;

    #[test]
    fn test_state_from_config() {
        let mut config = AppConfig::default();
        config.app.name = "issuer-name".to_string();
        config.guard.admin_roles = vec!["admin".to_string(), "ops".to_string()];

        let state = AppState::new(config, MemoryRepositoryRegistry::new()).unwrap();
        assert_eq!(state.codec.issuer(), "issuer-name");
        assert!(state.admin_gate().allows("ops"));
        assert!(!state.admin_gate().allows("user"));
        assert!(!state.security_headers().hsts);
    }

    #[test]
    fn test_hsts_in_production() {
        let mut config = AppConfig::default();
        config.app.environment = Environment::Production;

        let state = AppState::new(config, MemoryRepositoryRegistry::new()).unwrap();
        assert!(state.security_headers().hsts);
    }

    #[test]
    fn test_empty_secret_rejected() {
        let mut config = AppConfig::default();
        config.guard.jwt_secret.clear();

        assert!(AppState::new(config, MemoryRepositoryRegistry::new()).is_err());
    }
}
