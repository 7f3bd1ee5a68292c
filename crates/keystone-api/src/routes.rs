//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::auth::{require_auth, require_roles};
use crate::handlers::{self, auth, users};
use crate::middleware::require_api_key;
use crate::repository::RepositoryRegistry;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Routes mounted under `/api`
///
/// Every request, including unknown paths, passes the API key gate first.
/// Authenticated routes then pass bearer auth, and the user administration
/// routes additionally pass the admin role gate.
pub fn api_routes<R: RepositoryRegistry>(state: &Arc<AppState<R>>) -> Router<Arc<AppState<R>>> {
    let authenticate = middleware::from_fn_with_state(Arc::clone(&state.codec), require_auth);

    // Public routes (API key only)
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login_handler::<R>))
        .route("/auth/register", post(auth::register_handler::<R>))
        .route("/auth/refresh", post(auth::refresh_handler::<R>));

    // Any authenticated caller
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me_handler::<R>))
        .route_layer(authenticate.clone());

    // Admin roles only; route_layer order means auth runs before the role gate
    let admin_routes = Router::new()
        .route(
            "/users",
            get(users::list_users::<R>).post(users::create_user::<R>),
        )
        .route("/users/:id", get(users::get_user::<R>))
        .route_layer(middleware::from_fn_with_state(state.admin_gate(), require_roles))
        .route_layer(authenticate);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(state.api_key(), require_api_key))
}
