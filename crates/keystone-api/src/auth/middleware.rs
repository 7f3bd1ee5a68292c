/// Authorization middleware for protecting routes
///
/// `require_auth` turns a bearer access token into an `AuthContext` stored in
/// the request extensions; `require_roles` then checks that context against
/// an allow-list. Handlers read the identity through the `AuthContext`
/// extractor.
use super::jwt::{TokenCodec, TokenError, TokenKind};
use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Identity of an authenticated caller
///
/// Inserted by `require_auth`; extract it in handlers by naming it as an
/// argument. Extraction fails with 401 when the route is not protected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingContext)
    }
}

/// Authorization middleware errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("Expected an access token, got {0}")]
    WrongTokenKind(TokenKind),

    #[error("Request is not authenticated")]
    MissingContext,

    #[error("Role {0} is not allowed")]
    RoleNotAllowed(String),

    #[error("No role on request")]
    MissingRole,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::RoleNotAllowed(_) | AuthError::MissingRole => StatusCode::FORBIDDEN,
            AuthError::InvalidToken(e) if e.is_signing() => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

/// Pull the token out of `Authorization: Bearer <token>`
///
/// The scheme is matched case-insensitively; the token must be non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthHeader)?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Authentication middleware that requires a valid access token
///
/// Rejects with 401 before the handler runs when the header is missing or
/// ill-formed, the token does not verify, or it is a refresh token.
///
/// # Usage
///
/// ```ignore
/// let protected = Router::new()
///     .route("/auth/me", get(me_handler))
///     .route_layer(middleware::from_fn_with_state(codec, require_auth));
/// ```
pub async fn require_auth(
    State(codec): State<Arc<TokenCodec>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(request.headers()).map_err(|e| {
        debug!(error = %e, path = %request.uri().path(), "bearer token missing");
        e
    })?;

    let claims = codec.parse(token).map_err(|e| {
        warn!(error = %e, path = %request.uri().path(), "bearer token rejected");
        AuthError::InvalidToken(e)
    })?;

    if claims.kind() != TokenKind::Access {
        warn!(user_id = %claims.id, kind = %claims.kind(), "non-access token used as bearer");
        return Err(AuthError::WrongTokenKind(claims.kind()));
    }

    request.extensions_mut().insert(AuthContext {
        user_id: claims.id,
        role: claims.role,
    });

    Ok(next.run(request).await)
}

/// Set of roles allowed through `require_roles`
#[derive(Debug, Clone, Default)]
pub struct RoleGate {
    allowed: Arc<HashSet<String>>,
}

impl RoleGate {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: Arc::new(roles.into_iter().map(Into::into).collect()),
        }
    }

    pub fn allows(&self, role: &str) -> bool {
        self.allowed.contains(role)
    }
}

/// Role gate middleware; layer it inside `require_auth`
///
/// A request without an `AuthContext` is forbidden rather than
/// unauthenticated: this layer only answers "may this identity pass".
///
/// ```ignore
/// let admin = Router::new()
///     .route("/users", get(list_users))
///     .route_layer(middleware::from_fn_with_state(gate, require_roles))
///     .route_layer(middleware::from_fn_with_state(codec, require_auth));
/// ```
pub async fn require_roles(
    State(gate): State<RoleGate>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let Some(context) = request.extensions().get::<AuthContext>() else {
        warn!(path = %request.uri().path(), "role check without identity");
        return Err(AuthError::MissingRole);
    };

    if !gate.allows(&context.role) {
        warn!(
            user_id = %context.user_id,
            role = %context.role,
            path = %request.uri().path(),
            "access denied"
        );
        return Err(AuthError::RoleNotAllowed(context.role.clone()));
    }

    Ok(next.run(request).await)
}
