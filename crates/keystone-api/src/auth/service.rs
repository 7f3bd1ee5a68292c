//! Authentication service layer
//!
//! Credential checks, token issuance and refresh, and self-registration.
//! Tokens are stateless: nothing about an issued token is stored, so a
//! refresh token stays usable until it expires.

use super::jwt::{TokenCodec, TokenKind};
use super::middleware::AuthContext;
use super::password::{verify_password_blocking, PasswordConfig};
use crate::error::AppError;
use crate::repository::{RepositoryRegistry, UserRepository};
use crate::users::service::{create_account, UserResponse};
use keystone_core::ROLE_USER;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// User login request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

/// Self-registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    pub password: String,
}

/// Access and refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Identity of the current caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub role: String,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService<R> {
    registry: R,
    codec: Arc<TokenCodec>,
    passwords: PasswordConfig,
}

impl<R: RepositoryRegistry> AuthService<R> {
    pub fn new(registry: R, codec: Arc<TokenCodec>, passwords: PasswordConfig) -> Self {
        Self {
            registry,
            codec,
            passwords,
        }
    }

    /// Authenticate by email and password
    ///
    /// # Returns
    ///
    /// * `Ok(TokenPair)` - Access and refresh tokens bound to the user's id and role
    /// * `Err(AppError::NotFound)` - No active user has this email
    /// * `Err(AppError::InvalidCredentials)` - The password does not match
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<TokenPair, AppError> {
        request.validate()?;

        let user = self
            .registry
            .user_repository()
            .find_by_email(request.email.trim())
            .await?;

        if !verify_password_blocking(request.password, user.password.clone()).await? {
            warn!(user_id = %user.id, "login rejected: password mismatch");
            return Err(AppError::InvalidCredentials);
        }

        let tokens = TokenPair {
            access_token: self.codec.issue_access(user.id, &user.role)?,
            refresh_token: self.codec.issue_refresh(user.id, &user.role)?,
        };

        info!(user_id = %user.id, role = %user.role, "login succeeded");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new access token
    ///
    /// The refresh token is returned unchanged; it is not rotated.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self.codec.parse(refresh_token).map_err(|e| {
            warn!(error = %e, "refresh rejected: invalid token");
            AppError::unauthorized()
        })?;

        if claims.kind() != TokenKind::Refresh {
            warn!(user_id = %claims.id, kind = %claims.kind(), "refresh rejected: wrong token kind");
            return Err(AppError::unauthorized());
        }

        let access_token = self.codec.issue_access(claims.id, &claims.role)?;
        info!(user_id = %claims.id, "access token refreshed");

        Ok(TokenPair {
            access_token,
            refresh_token: refresh_token.to_string(),
        })
    }

    /// Create a self-registered account with the `user` role
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<UserResponse, AppError> {
        request.validate()?;

        let user = create_account(
            &self.registry,
            &self.passwords,
            &request.email,
            request.password,
            ROLE_USER,
        )
        .await?;

        info!(user_id = %user.id, "user registered");
        Ok(user.into())
    }

    /// The caller's identity as seen by the authorization middleware
    pub fn profile(&self, context: &AuthContext) -> ProfileResponse {
        ProfileResponse {
            user_id: context.user_id,
            role: context.role.clone(),
        }
    }
}
