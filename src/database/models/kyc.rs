//! KYC verification state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Verification steps a user can complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KycStep {
    BasicInfo,
    PersonalDetails,
    AddressVerification,
    DocumentVerification,
    /// Recorded by the document upload route, not selectable via `complete-step`.
    DocumentUpload,
}

impl KycStep {
    /// Steps accepted by the `complete-step` route.
    pub const SELECTABLE: [KycStep; 4] = [
        Self::BasicInfo,
        Self::PersonalDetails,
        Self::AddressVerification,
        Self::DocumentVerification,
    ];

    /// Completed step count at which review is requested.
    pub const REVIEW_THRESHOLD: usize = 4;

    /// Parse a step name accepted by `complete-step`.
    pub fn from_selectable(s: &str) -> Option<Self> {
        Self::SELECTABLE.into_iter().find(|step| step.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasicInfo => "basic_info",
            Self::PersonalDetails => "personal_details",
            Self::AddressVerification => "address_verification",
            Self::DocumentVerification => "document_verification",
            Self::DocumentUpload => "document_upload",
        }
    }
}

/// Stored KYC record, one per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KycStatus {
    pub user_id: i64,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub pending_verification: bool,
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl KycStatus {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            verified: false,
            pending_verification: false,
            completed_steps: Vec::new(),
            rejection_reason: None,
            updated_at: Utc::now(),
        }
    }

    /// Record a step. Returns `false` if it was already completed.
    pub fn complete(&mut self, step: KycStep) -> bool {
        let name = step.as_str();
        if self.completed_steps.iter().any(|s| s == name) {
            return false;
        }
        self.completed_steps.push(name.to_string());
        true
    }

    /// Review is requested once the final step is done or enough steps are in.
    pub fn review_due(&self, last_step: KycStep) -> bool {
        last_step == KycStep::DocumentVerification
            || self.completed_steps.len() >= KycStep::REVIEW_THRESHOLD
    }

    pub fn summary(&self) -> KycSummary {
        KycSummary {
            verified: self.verified,
            pending_verification: self.pending_verification,
            completed_steps: self.completed_steps.clone(),
        }
    }
}

/// Client-facing view of a KYC record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct KycSummary {
    pub verified: bool,
    pub pending_verification: bool,
    pub completed_steps: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_is_idempotent() {
        let mut status = KycStatus::new(1);
        assert!(status.complete(KycStep::BasicInfo));
        assert!(!status.complete(KycStep::BasicInfo));
        assert_eq!(status.completed_steps, vec!["basic_info"]);
    }

    #[test]
    fn test_review_due() {
        let mut status = KycStatus::new(1);
        status.complete(KycStep::BasicInfo);
        assert!(!status.review_due(KycStep::BasicInfo));
        assert!(status.review_due(KycStep::DocumentVerification));

        status.complete(KycStep::PersonalDetails);
        status.complete(KycStep::AddressVerification);
        status.complete(KycStep::DocumentUpload);
        assert!(status.review_due(KycStep::DocumentUpload));
    }

    #[test]
    fn test_selectable_steps() {
        assert_eq!(KycStep::from_selectable("address_verification"), Some(KycStep::AddressVerification));
        assert_eq!(KycStep::from_selectable("document_upload"), None);
        assert_eq!(KycStep::from_selectable("selfie"), None);
    }

    #[test]
    fn test_summary_is_camel_case() {
        let json = serde_json::to_value(KycStatus::new(3).summary()).unwrap();
        assert_eq!(json["verified"], false);
        assert_eq!(json["pendingVerification"], false);
        assert!(json["completedSteps"].as_array().unwrap().is_empty());
    }
}
