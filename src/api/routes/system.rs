use axum::Json;
use serde_json::{json, Value};

use crate::api::error::ApiError;

pub async fn root() -> &'static str {
    "Remittance API is running!"
}

pub async fn api_index() -> Json<Value> {
    Json(json!({ "message": "API is running" }))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
