use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_body;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let body = json_body(payload).map_err(|e| e.with_message("Registration failed"))?;
    let user = state
        .auth
        .register(&body.username, &body.email, &body.password)
        .await
        .map_err(|e| ApiError::from(e).with_message("Registration failed"))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": 201,
            "message": "Registration successful",
            "user": user,
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body = json_body(payload).map_err(|e| e.with_message("Login failed"))?;
    let (token, user) = state
        .auth
        .login(&body.email, &body.password)
        .await
        .map_err(|e| ApiError::from(e).with_message("Login failed"))?;

    Ok(Json(json!({
        "status": 200,
        "message": "Login successful",
        "token": token,
        "user": user,
    })))
}
