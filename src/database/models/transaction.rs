//! Remittance transaction model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of placeholder hashes assigned when the on-chain send failed.
pub const PLACEHOLDER_HASH_PREFIX: &str = "pending_";

/// Token the recipient receives when the sender does not pick one.
pub const DEFAULT_RECEIVE_TOKEN: &str = "USDC";

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `completed` and `failed` admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored transaction record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: i64,
    /// Sender user ID.
    pub sender: i64,
    /// Recipient wallet address (`0x` + 40 hex).
    pub recipient: String,
    pub token: String,
    /// Decimal amount as submitted.
    pub amount: String,
    pub status: TransactionStatus,
    pub tx_hash: String,
    #[serde(default = "default_receive_token")]
    pub receive_token: String,
    #[serde(default)]
    pub converted_amount: Option<String>,
    #[serde(default)]
    pub remittance_id: u64,
    pub created_at: DateTime<Utc>,
}

fn default_receive_token() -> String {
    DEFAULT_RECEIVE_TOKEN.to_string()
}

impl Transaction {
    /// Whether the hash refers to a real on-chain transaction.
    pub fn has_chain_reference(&self) -> bool {
        is_chain_reference(&self.tx_hash)
    }

    /// Pending with a real hash: the explorer may still settle it.
    pub fn awaits_confirmation(&self) -> bool {
        self.status == TransactionStatus::Pending && self.has_chain_reference()
    }
}

pub fn is_chain_reference(tx_hash: &str) -> bool {
    !tx_hash.is_empty() && tx_hash != "0x" && !tx_hash.starts_with(PLACEHOLDER_HASH_PREFIX)
}

/// Fields supplied when recording a transaction; the store assigns `id` and `created_at`.
#[derive(Clone, Debug)]
pub struct NewTransaction {
    pub sender: i64,
    pub recipient: String,
    pub token: String,
    pub amount: String,
    pub status: TransactionStatus,
    pub tx_hash: String,
    pub receive_token: String,
    pub converted_amount: Option<String>,
    pub remittance_id: u64,
}

impl NewTransaction {
    pub fn into_transaction(self, id: i64, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            sender: self.sender,
            recipient: self.recipient,
            token: self.token,
            amount: self.amount,
            status: self.status,
            tx_hash: self.tx_hash,
            receive_token: self.receive_token,
            converted_amount: self.converted_amount,
            remittance_id: self.remittance_id,
            created_at,
        }
    }
}
