//! Authentication API handlers
//!
//! Author: hephaex@gmail.com

use super::JsonBody;
use crate::auth::{
    bearer_token, AuthContext, LoginRequest, ProfileResponse, RegisterRequest, TokenPair,
};
use crate::error::AppError;
use crate::repository::RepositoryRegistry;
use crate::response::{ApiResponse, Envelope, ErrorBody};
use crate::state::AppState;
use crate::users::UserResponse;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};
use std::sync::Arc;

/// Login with email and password
///
/// Returns an access token and a refresh token bound to the user's id and role.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenPair),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 404, description = "Unknown email", body = ErrorBody),
    ),
    security(("api_key" = []))
)]
pub async fn login_handler<R: RepositoryRegistry>(
    State(state): State<Arc<AppState<R>>>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<ApiResponse<TokenPair>, AppError> {
    let tokens = state.auth.login(request).await?;
    Ok(ApiResponse::ok("Login successful", tokens))
}

/// Register a new account with the default role
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = UserResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    ),
    security(("api_key" = []))
)]
pub async fn register_handler<R: RepositoryRegistry>(
    State(state): State<Arc<AppState<R>>>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> Result<Envelope<UserResponse>, AppError> {
    let user = state.auth.register(request).await?;
    Ok(Envelope(
        StatusCode::CREATED,
        ApiResponse::ok("Registration successful", user),
    ))
}

/// Exchange a refresh token for a new access token
///
/// The refresh token goes in `Authorization: Bearer <token>` and is returned
/// unchanged.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    responses(
        (status = 200, description = "Token refreshed", body = TokenPair),
        (status = 401, description = "Missing, invalid or non-refresh token", body = ErrorBody),
    ),
    security(("api_key" = [], "bearer_auth" = []))
)]
pub async fn refresh_handler<R: RepositoryRegistry>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
) -> Result<ApiResponse<TokenPair>, AppError> {
    let token = bearer_token(&headers).map_err(|_| AppError::unauthorized())?;
    let tokens = state.auth.refresh(token).await?;
    Ok(ApiResponse::ok("Token refreshed", tokens))
}

/// Identity carried by the caller's access token
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current identity", body = ProfileResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
    ),
    security(("api_key" = [], "bearer_auth" = []))
)]
pub async fn me_handler<R: RepositoryRegistry>(
    State(state): State<Arc<AppState<R>>>,
    context: AuthContext,
) -> ApiResponse<ProfileResponse> {
    ApiResponse::ok("Profile", state.auth.profile(&context))
}
