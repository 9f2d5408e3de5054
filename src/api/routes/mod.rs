//! HTTP routes, one file per area.

pub mod auth;
pub mod kyc;
pub mod system;
pub mod transactions;

use axum::extract::rejection::JsonRejection;
use axum::{Json, Router};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/api/auth", auth::router())
        .nest("/api/transactions", transactions::router())
        .nest("/api/kyc", kyc::router())
}

/// Unwrap a JSON body, rendering rejections in the API's error shape.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}
