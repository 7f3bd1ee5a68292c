//! User administration handlers
//!
//! Every route here sits behind bearer authentication and the admin role gate.

use super::JsonBody;
use crate::error::AppError;
use crate::repository::RepositoryRegistry;
use crate::response::{ApiResponse, Envelope, ErrorBody};
use crate::state::AppState;
use crate::users::{CreateUserRequest, UserResponse};
use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;
use uuid::Uuid;

/// List active users
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "users",
    responses(
        (status = 200, description = "Active users", body = [UserResponse]),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 403, description = "Role not allowed", body = ErrorBody),
    ),
    security(("api_key" = [], "bearer_auth" = []))
)]
pub async fn list_users<R: RepositoryRegistry>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<ApiResponse<Vec<UserResponse>>, AppError> {
    let users = state.users.list().await?;
    Ok(ApiResponse::ok("Users", users))
}

/// Fetch one active user
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody),
    ),
    security(("api_key" = [], "bearer_auth" = []))
)]
pub async fn get_user<R: RepositoryRegistry>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<ApiResponse<UserResponse>, AppError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| AppError::BadRequest(format!("Invalid user id: {id}")))?;
    let user = state.users.get_by_id(id).await?;
    Ok(ApiResponse::ok("User", user))
}

/// Create an account with an explicit role
#[utoipa::path(
    post,
    path = "/api/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    ),
    security(("api_key" = [], "bearer_auth" = []))
)]
pub async fn create_user<R: RepositoryRegistry>(
    State(state): State<Arc<AppState<R>>>,
    JsonBody(request): JsonBody<CreateUserRequest>,
) -> Result<Envelope<UserResponse>, AppError> {
    let user = state.users.create(request).await?;
    Ok(Envelope(StatusCode::CREATED, ApiResponse::ok("User created", user)))
}
