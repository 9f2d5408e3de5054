//! KYC progress, document uploads and the transaction gate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::ServiceError;
use crate::database::models::{KycStatus, KycStep, KycSummary};
use crate::database::KycStore;
use crate::notify::{KycWatcher, NotificationHub, ServerEvent};
use crate::retry::{execute_with_retry, RetryPolicy};

/// Largest accepted document, in bytes.
pub const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;

const DOCUMENT_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "pdf"];

/// Where an uploaded document ended up.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub document_type: String,
    pub file_name: String,
    pub size: usize,
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Clone)]
pub struct KycService {
    kyc: Arc<dyn KycStore>,
    hub: NotificationHub,
    watcher: KycWatcher,
    upload_dir: PathBuf,
    retry: RetryPolicy,
}

impl KycService {
    pub fn new(
        kyc: Arc<dyn KycStore>,
        hub: NotificationHub,
        watcher: KycWatcher,
        upload_dir: impl Into<PathBuf>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            kyc,
            hub,
            watcher,
            upload_dir: upload_dir.into(),
            retry,
        }
    }

    /// Current status; users without a record read as unverified with no steps.
    pub async fn status(&self, user_id: i64) -> Result<KycSummary, ServiceError> {
        let kyc = self.kyc.clone();
        let status = execute_with_retry("kyc.get", &self.retry, || {
            let kyc = kyc.clone();
            async move { kyc.get(user_id).await }
        })
        .await?;
        Ok(status.map(|s| s.summary()).unwrap_or_default())
    }

    /// Fails with `KycRequired` unless the user is verified.
    pub async fn ensure_verified(&self, user_id: i64) -> Result<(), ServiceError> {
        let summary = self.status(user_id).await?;
        if summary.verified {
            Ok(())
        } else {
            Err(ServiceError::KycRequired(summary))
        }
    }

    /// Mark a user-selectable step as done.
    pub async fn complete_step(&self, user_id: i64, step_name: &str) -> Result<KycSummary, ServiceError> {
        let step_name = step_name.trim();
        if step_name.is_empty() {
            return Err(ServiceError::validation("Step name is required"));
        }
        let step = KycStep::from_selectable(step_name)
            .ok_or_else(|| ServiceError::validation("Invalid step name"))?;

        self.record_step(user_id, step).await
    }

    /// Store an identity document and record the upload step.
    pub async fn upload_document(
        &self,
        user_id: i64,
        document_type: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<(StoredDocument, KycSummary), ServiceError> {
        let document_type = document_type.trim();
        if document_type.is_empty() {
            return Err(ServiceError::validation("Document type is required"));
        }
        if !document_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ServiceError::validation("Invalid document type"));
        }
        if bytes.is_empty() {
            return Err(ServiceError::validation("No file uploaded"));
        }
        if bytes.len() > MAX_DOCUMENT_BYTES {
            return Err(ServiceError::validation("File too large. Maximum size is 5MB"));
        }
        let extension = document_extension(original_name).ok_or_else(|| {
            ServiceError::validation("Only .jpg, .jpeg, .png and .pdf files are allowed")
        })?;

        let dir = self.upload_dir.join("kyc").join(user_id.to_string());
        let file_name = format!(
            "{}_{}.{}",
            document_type,
            Utc::now().timestamp_millis(),
            extension
        );
        let path = dir.join(&file_name);
        write_document(&dir, &path, bytes).await?;
        info!("Stored {} document for user {} at {}", document_type, user_id, path.display());

        let summary = self.record_step(user_id, KycStep::DocumentUpload).await?;
        let document = StoredDocument {
            document_type: document_type.to_string(),
            file_name,
            size: bytes.len(),
            path,
        };
        Ok((document, summary))
    }

    /// Record a review outcome. An approval is pushed to a connected user.
    pub async fn set_verified(&self, user_id: i64, verified: bool) -> Result<KycSummary, ServiceError> {
        let kyc = self.kyc.clone();
        let status = execute_with_retry("kyc.set_verified", &self.retry, || {
            let kyc = kyc.clone();
            async move { kyc.set_verified(user_id, verified).await }
        })
        .await?;
        info!("KYC for user {} set to verified={}", user_id, verified);

        if let Err(e) = self.watcher.observe(user_id).await {
            warn!("KYC notification check for user {} failed: {}", user_id, e);
        }
        Ok(status.summary())
    }

    async fn record_step(&self, user_id: i64, step: KycStep) -> Result<KycSummary, ServiceError> {
        let kyc = self.kyc.clone();
        let mut status: KycStatus = execute_with_retry("kyc.add_step", &self.retry, || {
            let kyc = kyc.clone();
            async move { kyc.add_step(user_id, step.as_str()).await }
        })
        .await?;

        if !status.verified && !status.pending_verification && status.review_due(step) {
            execute_with_retry("kyc.set_pending_verification", &self.retry, || {
                let kyc = kyc.clone();
                async move { kyc.set_pending_verification(user_id, true).await }
            })
            .await?;
            status.pending_verification = true;
            info!("KYC for user {} is now pending review", user_id);
        }

        let summary = status.summary();
        self.hub.send(
            user_id,
            ServerEvent::KycStepComplete {
                step: step.as_str().to_string(),
                kyc_status: summary.clone(),
            },
        );
        Ok(summary)
    }
}

/// Lowercased extension if it is an accepted document type.
fn document_extension(file_name: &str) -> Option<String> {
    let extension = Path::new(file_name).extension()?.to_str()?.to_lowercase();
    DOCUMENT_EXTENSIONS
        .contains(&extension.as_str())
        .then_some(extension)
}

async fn write_document(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), ServiceError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ServiceError::Internal(format!("create {}: {e}", dir.display())))?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| ServiceError::Internal(format!("write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::database::Stores;

    fn service_in(upload_dir: PathBuf) -> (KycService, NotificationHub) {
        let stores = Stores::memory();
        let hub = NotificationHub::new();
        let retry = RetryPolicy::default();
        let watcher = KycWatcher::new(stores.kyc.clone(), hub.clone(), retry);
        let service = KycService::new(stores.kyc, hub.clone(), watcher, upload_dir, retry);
        (service, hub)
    }

    fn service() -> (KycService, NotificationHub) {
        service_in(std::env::temp_dir().join(format!("remitd-kyc-{}", Uuid::new_v4())))
    }

    #[tokio::test]
    async fn test_missing_record_reads_as_default() {
        let (kyc, _) = service();
        assert_eq!(kyc.status(42).await.unwrap(), KycSummary::default());
        assert!(matches!(
            kyc.ensure_verified(42).await,
            Err(ServiceError::KycRequired(summary)) if !summary.verified
        ));
    }

    #[tokio::test]
    async fn test_complete_step_validation() {
        let (kyc, _) = service();
        assert_eq!(kyc.complete_step(1, " ").await.unwrap_err().to_string(), "Step name is required");
        assert_eq!(kyc.complete_step(1, "selfie").await.unwrap_err().to_string(), "Invalid step name");
        assert_eq!(
            kyc.complete_step(1, "document_upload").await.unwrap_err().to_string(),
            "Invalid step name"
        );
    }

    #[tokio::test]
    async fn test_steps_are_idempotent_and_trigger_review() {
        let (kyc, hub) = service();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(1, Uuid::new_v4(), tx);

        kyc.complete_step(1, "basic_info").await.unwrap();
        let summary = kyc.complete_step(1, "basic_info").await.unwrap();
        assert_eq!(summary.completed_steps, vec!["basic_info"]);
        assert!(!summary.pending_verification);

        match rx.try_recv() {
            Ok(ServerEvent::KycStepComplete { step, .. }) => assert_eq!(step, "basic_info"),
            other => panic!("unexpected event: {other:?}"),
        }

        let summary = kyc.complete_step(1, "document_verification").await.unwrap();
        assert!(summary.pending_verification);
        assert!(kyc.status(1).await.unwrap().pending_verification);
    }

    #[tokio::test]
    async fn test_four_steps_trigger_review() {
        let (kyc, _) = service();
        for step in ["basic_info", "personal_details", "address_verification"] {
            assert!(!kyc.complete_step(5, step).await.unwrap().pending_verification);
        }
        let (_, summary) = kyc
            .upload_document(5, "passport", "scan.PDF", b"%PDF-1.4")
            .await
            .unwrap();
        assert_eq!(summary.completed_steps.len(), 4);
        assert!(summary.pending_verification);
    }

    #[tokio::test]
    async fn test_upload_document_writes_file() {
        let dir = std::env::temp_dir().join(format!("remitd-kyc-{}", Uuid::new_v4()));
        let (kyc, _) = service_in(dir.clone());

        let (doc, summary) = kyc
            .upload_document(9, "passport", "photo.JPG", b"\xff\xd8\xff")
            .await
            .unwrap();
        assert!(doc.file_name.starts_with("passport_"));
        assert!(doc.file_name.ends_with(".jpg"));
        assert!(doc.path.starts_with(dir.join("kyc").join("9")));
        assert_eq!(tokio::fs::read(&doc.path).await.unwrap(), b"\xff\xd8\xff");
        assert_eq!(summary.completed_steps, vec!["document_upload"]);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_files() {
        let (kyc, _) = service();
        assert!(kyc.upload_document(1, "passport", "notes.txt", b"x").await.is_err());
        assert!(kyc.upload_document(1, "../etc", "a.png", b"x").await.is_err());
        assert!(kyc.upload_document(1, "passport", "a.png", b"").await.is_err());

        let big = vec![0u8; MAX_DOCUMENT_BYTES + 1];
        let err = kyc.upload_document(1, "passport", "a.png", &big).await.unwrap_err();
        assert_eq!(err.to_string(), "File too large. Maximum size is 5MB");
    }

    #[tokio::test]
    async fn test_approval_notifies_connected_user() {
        let (kyc, hub) = service();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(3, Uuid::new_v4(), tx);
        // Seed the snapshot as the socket register does.
        kyc.watcher.observe(3).await.unwrap();

        let summary = kyc.set_verified(3, true).await.unwrap();
        assert!(summary.verified);
        assert!(!summary.pending_verification);
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::KycStatusUpdate { .. })));
        assert!(kyc.ensure_verified(3).await.is_ok());
    }

    #[test]
    fn test_document_extension() {
        assert_eq!(document_extension("a.PNG").as_deref(), Some("png"));
        assert_eq!(document_extension("a.jpeg").as_deref(), Some("jpeg"));
        assert_eq!(document_extension("a.gif"), None);
        assert_eq!(document_extension("noext"), None);
    }
}
