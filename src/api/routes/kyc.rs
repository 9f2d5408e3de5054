use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::json_body;
use crate::api::auth::AuthUser;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::database::models::KycSummary;
use crate::services::kyc::MAX_DOCUMENT_BYTES;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Room for the multipart framing and the text fields around the document.
const UPLOAD_BODY_LIMIT: usize = MAX_DOCUMENT_BYTES + 64 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route(
            "/upload-document",
            post(upload_document).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/complete-step", post(complete_step))
        .route("/verify", post(verify))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompleteStep {
    pub step_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub user_id: i64,
    #[serde(default = "approve")]
    pub verified: bool,
}

fn approve() -> bool {
    true
}

pub async fn status(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<KycSummary>> {
    Ok(Json(state.kyc.status(user.id()).await?))
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut document: Option<(String, Vec<u8>)> = None;
    let mut document_type = String::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "document" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                document = Some((file_name, bytes.to_vec()));
            }
            "documentType" => {
                document_type = field.text().await.map_err(multipart_error)?;
            }
            _ => {}
        }
    }

    let Some((file_name, bytes)) = document else {
        return Err(ApiError::bad_request("No file uploaded"));
    };
    let (stored, kyc_status) = state
        .kyc
        .upload_document(user.id(), &document_type, &file_name, &bytes)
        .await?;

    Ok(Json(json!({
        "message": "Document uploaded successfully",
        "documentType": stored.document_type,
        "fileName": stored.file_name,
        "kycStatus": kyc_status,
    })))
}

pub async fn complete_step(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CompleteStep>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body = json_body(payload)?;
    let kyc_status = state.kyc.complete_step(user.id(), &body.step_name).await?;
    Ok(Json(json!({
        "message": format!("{} step completed successfully", body.step_name.trim()),
        "kycStatus": kyc_status,
    })))
}

/// Manual review outcome, guarded by the shared admin token.
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Err(ApiError::forbidden("Admin verification is disabled"));
    };
    let supplied = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if supplied != expected {
        warn!("Rejected KYC verification with a bad admin token");
        return Err(ApiError::forbidden("Invalid admin token"));
    }

    let body = json_body(payload)?;
    let kyc_status = state.kyc.set_verified(body.user_id, body.verified).await?;
    let message = if body.verified {
        "KYC approved"
    } else {
        "KYC verification revoked"
    };
    Ok(Json(json!({
        "message": message,
        "userId": body.user_id,
        "kycStatus": kyc_status,
    })))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}
