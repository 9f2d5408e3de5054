//! JSON error responses.
//!
//! Every failure renders as `{"error": ..., "message"?: ..., "kycStatus"?: ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use tracing::error;

use crate::database::models::KycSummary;
use crate::services::{AuthError, ServiceError};

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    message: Option<String>,
    kyc_status: Option<KycSummary>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message: None,
            kyc_status: None,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn unauthorized(error: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error)
    }

    pub fn forbidden(error: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, error)
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    /// Details are logged, never returned.
    pub fn internal(details: impl std::fmt::Display) -> Self {
        error!("Internal error: {}", details);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
            .with_message("An unexpected error occurred")
    }

    /// Attach a human-readable summary, keeping any more specific one.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message.get_or_insert_with(|| message.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => Self::bad_request(msg),
            ServiceError::InvalidCredentials => Self::bad_request("Invalid credentials"),
            ServiceError::KycRequired(summary) => Self {
                status: StatusCode::FORBIDDEN,
                error: "KYC verification required".to_string(),
                message: Some(
                    "You must complete KYC verification before making transactions".to_string(),
                ),
                kyc_status: Some(summary),
            },
            ServiceError::NotFound(msg) => Self::not_found(msg),
            ServiceError::Auth(e) => e.into(),
            ServiceError::Store(e) => Self::internal(e),
            ServiceError::Internal(msg) => Self::internal(msg),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidToken => Self::unauthorized(err.to_string()),
            AuthError::Hashing | AuthError::Signing(_) => Self::internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = Map::new();
        body.insert("error".into(), Value::String(self.error));
        if let Some(message) = self.message {
            body.insert("message".into(), Value::String(message));
        }
        if let Some(kyc_status) = self.kyc_status {
            body.insert("kycStatus".into(), json!(kyc_status));
        }
        (self.status, Json(Value::Object(body))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
