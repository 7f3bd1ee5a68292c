//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod auth;
pub mod health;
pub mod users;

use crate::error::AppError;
use crate::response::ErrorBody;
use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::{StatusCode, Uri},
    response::Response,
    Json,
};

/// JSON body extractor whose rejections use the error envelope
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Fallback for unknown API routes
pub async fn not_found(uri: Uri) -> Response {
    tracing::debug!(path = %uri.path(), "no route");
    ErrorBody::new("NOT_FOUND", format!("No route for {}", uri.path()))
        .into_response_with(StatusCode::NOT_FOUND)
}
