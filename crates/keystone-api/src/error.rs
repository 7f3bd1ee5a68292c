//! API error handling
//!
//! Author: hephaex@gmail.com

use crate::auth::jwt::TokenError;
use crate::auth::middleware::AuthError;
use crate::auth::password::PasswordError;
use crate::repository::RepositoryError;
use crate::response::ErrorBody;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{json, Map, Value};
use thiserror::Error;
use validator::ValidationErrors;

/// Application error type
///
/// `Internal` details are logged when the response is built and never sent
/// to the client.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{message}")]
    Conflict { field: &'static str, message: String },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized() -> Self {
        AppError::Unauthorized("Unauthorized".to_string())
    }

    pub fn forbidden() -> Self {
        AppError::Forbidden("Forbidden".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidCredentials | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::Conflict { .. } => "CONFLICT",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Flatten validator output to `{field: [message, ...]}`
fn field_errors(errors: &ValidationErrors) -> Value {
    let mut fields = Map::new();
    for (field, errs) in errors.field_errors() {
        let messages: Vec<Value> = errs
            .iter()
            .map(|e| match &e.message {
                Some(message) => Value::String(message.to_string()),
                None => Value::String(format!("invalid {field} ({})", e.code)),
            })
            .collect();
        fields.insert(field.to_string(), Value::Array(messages));
    }
    Value::Object(fields)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Validation(errors) => {
                ErrorBody::new(self.code(), "Validation failed").with_errors(field_errors(errors))
            }
            AppError::Conflict { field, message } => {
                let mut fields = Map::new();
                fields.insert(field.to_string(), json!([message]));
                ErrorBody::new(self.code(), message.clone()).with_errors(Value::Object(fields))
            }
            AppError::Internal(details) => {
                tracing::error!(error = %details, "internal error");
                ErrorBody::new(self.code(), "Internal server error")
            }
            other => ErrorBody::new(self.code(), other.to_string()),
        };

        body.into_response_with(status)
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, .. } => {
                AppError::NotFound(format!("{} not found", capitalize(entity)))
            }
            RepositoryError::Conflict { field, .. } => AppError::Conflict {
                field,
                message: format!("{} already registered", capitalize(field)),
            },
            other => AppError::Internal(other.to_string()),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        if err.is_signing() {
            AppError::Internal(err.to_string())
        } else {
            AppError::Unauthorized("Invalid or expired token".to_string())
        }
    }
}

/// Middleware rejections share the error envelope
impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err.status() {
            StatusCode::FORBIDDEN => AppError::forbidden(),
            StatusCode::UNAUTHORIZED => AppError::unauthorized(),
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use validator::Validate;

    async fn body_json(err: AppError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[derive(Validate)]
    struct Form {
        #[validate(email(message = "must be a valid email"))]
        email: String,
    }

    #[tokio::test]
    async fn test_validation_lists_fields() {
        let errors = Form {
            email: "nope".to_string(),
        }
        .validate()
        .unwrap_err();

        let (status, body) = body_json(AppError::from(errors)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"]["email"][0], "must be a valid email");
    }

    #[tokio::test]
    async fn test_conflict_names_field() {
        let err = AppError::from(RepositoryError::Conflict {
            operation: "users.create",
            entity: "user",
            field: "email",
            key: "a@x.com".to_string(),
        });

        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Email already registered");
        assert_eq!(body["errors"]["email"][0], "Email already registered");
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let (status, body) = body_json(AppError::Internal("pool timed out".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
        assert!(!body.to_string().contains("pool timed out"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::unauthorized().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::forbidden().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::NotFound("User not found".into()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_auth_rejections_map_to_envelope() {
        let (status, body) =
            body_json(AppError::from(AuthError::RoleNotAllowed("user".into()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");
        assert_eq!(body["message"], "Forbidden");

        let (status, body) = body_json(AppError::from(AuthError::MissingAuthHeader)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Unauthorized");

        let signing = AuthError::InvalidToken(TokenError::Signing("no key".into()));
        let (status, body) = body_json(AppError::from(signing)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.to_string().contains("no key"));
    }

    #[test]
    fn test_not_found_from_repository() {
        let err = AppError::from(RepositoryError::NotFound {
            operation: "users.get_by_id",
            entity: "user",
            key: "x".to_string(),
        });
        assert_eq!(err.to_string(), "User not found");
    }

    #[test]
    fn test_token_errors_are_unauthorized_unless_signing() {
        assert_eq!(AppError::from(TokenError::Expired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::from(TokenError::Signing("bad key".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
