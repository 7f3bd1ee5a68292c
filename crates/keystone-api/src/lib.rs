//! Keystone API - authentication and user administration server
//!
//! Provides HTTP endpoints for registration, login, token refresh and user
//! administration, backed by Postgres through the repository gateway.
//!
//! Author: hephaex@gmail.com

pub mod auth;
pub mod db;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod repository;
pub mod response;
pub mod routes;
pub mod state;
pub mod users;

use crate::repository::RepositoryRegistry;
use crate::response::ErrorBody;
use crate::state::AppState;
use axum::{
    http::{header, HeaderValue, Method, Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{AllowOrigin, Any as AnyOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::auth::login_handler,
        handlers::auth::register_handler,
        handlers::auth::refresh_handler,
        handlers::auth::me_handler,
        handlers::users::list_users,
        handlers::users::get_user,
        handlers::users::create_user,
    ),
    components(schemas(
        auth::LoginRequest,
        auth::RegisterRequest,
        auth::TokenPair,
        auth::ProfileResponse,
        users::UserResponse,
        users::CreateUserRequest,
        handlers::health::HealthResponse,
        handlers::health::ReadinessResponse,
        ErrorBody,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Login, registration and token refresh"),
        (name = "users", description = "User administration"),
        (name = "health", description = "Liveness and readiness probes"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    middleware::API_KEY_HEADER,
                ))),
            );
        }
    }
}

/// Turn a handler panic into a 500 envelope
fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    tracing::error!(panic = %detail, "handler panicked");

    ErrorBody::new("INTERNAL_ERROR", "Internal server error")
        .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static(middleware::API_KEY_HEADER),
        ]);

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if allowed.is_empty() {
        layer.allow_origin(AnyOrigin)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

/// Build the full application router
pub fn create_router<R: RepositoryRegistry>(state: Arc<AppState<R>>) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<axum::body::Body>| {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .unwrap_or("-");
        tracing::info_span!(
            "http_request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %request_id,
        )
    });

    Router::new()
        .route("/health", get(handlers::health::health_check::<R>))
        .route("/ready", get(handlers::health::readiness_check::<R>))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", routes::api_routes(&state))
        .layer(axum::middleware::from_fn_with_state(
            state.security_headers(),
            middleware::security_headers_middleware,
        ))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(trace)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Router over the in-memory registry with cheap password hashing
#[cfg(feature = "test-utils")]
pub fn create_router_for_testing() -> Router {
    create_router_for_testing_with(repository::MemoryRepositoryRegistry::new())
}

/// Test configuration: fixed API key and signing secret
#[cfg(feature = "test-utils")]
pub fn test_config() -> keystone_core::AppConfig {
    let mut config = keystone_core::AppConfig::default();
    config.app.name = "keystone-test".to_string();
    config.api_keys.x_api_key = "test-api-key".to_string();
    config.guard.jwt_secret = "test-jwt-secret".to_string();
    config
}

/// Same as `create_router_for_testing`, over a registry the caller keeps a handle to
#[cfg(feature = "test-utils")]
pub fn create_router_for_testing_with(registry: repository::MemoryRepositoryRegistry) -> Router {
    let state = AppState::with_password_config(
        test_config(),
        registry,
        auth::PasswordConfig::insecure_fast(),
    )
    .expect("test config has a signing secret");
    create_router(Arc::new(state))
}
