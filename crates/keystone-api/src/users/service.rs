//! User service layer

use crate::auth::password::{hash_password_blocking, PasswordConfig};
use crate::error::AppError;
use crate::repository::{RepositoryRegistry, UserRepository};
use keystone_core::{User, ROLE_USER};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Public view of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub role: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
        }
    }
}

/// Admin account creation request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    pub password: String,
    /// Defaults to `user`
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub role: Option<String>,
}

/// Create an account inside one transaction
///
/// The password is hashed before the transaction opens so no connection is
/// held while Argon2 runs. The existence check and the insert share the
/// transaction; a concurrent insert that wins the race still surfaces as a
/// conflict through the unique index.
pub(crate) async fn create_account<R: RepositoryRegistry>(
    registry: &R,
    passwords: &PasswordConfig,
    email: &str,
    password: String,
    role: &str,
) -> Result<User, AppError> {
    let email = email.trim().to_string();
    let role = role.to_string();
    let password_hash = hash_password_blocking(password, passwords.clone()).await?;

    registry
        .run_in_transaction(move |tx: R| async move {
            let users = tx.user_repository();
            if users.exists_by_email(&email).await? {
                return Err(AppError::Conflict {
                    field: "email",
                    message: "Email already registered".to_string(),
                });
            }

            let user = User::new(email, password_hash, role);
            users.create(&user).await?;
            Ok(user)
        })
        .await
}

/// User administration service
#[derive(Clone)]
pub struct UserService<R> {
    registry: R,
    passwords: PasswordConfig,
}

impl<R: RepositoryRegistry> UserService<R> {
    pub fn new(registry: R, passwords: PasswordConfig) -> Self {
        Self {
            registry,
            passwords,
        }
    }

    /// All active users
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<UserResponse>, AppError> {
        let users = self.registry.user_repository().list().await?;
        Ok(users.into_iter().map(UserResponse::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: Uuid) -> Result<UserResponse, AppError> {
        let user = self.registry.user_repository().get_by_id(id).await?;
        Ok(user.into())
    }

    /// Create an account with an explicit role
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn create(&self, request: CreateUserRequest) -> Result<UserResponse, AppError> {
        request.validate()?;
        let role = request
            .role
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(ROLE_USER)
            .to_string();

        let user = create_account(
            &self.registry,
            &self.passwords,
            &request.email,
            request.password,
            &role,
        )
        .await?;

        info!(user_id = %user.id, role = %user.role, "user created");
        Ok(user.into())
    }
}
