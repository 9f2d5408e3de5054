//! Remittance transactions: creation, listing, lookup and status updates.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::quote::parse_amount;
use super::{KycService, QuoteService, ServiceError};
use crate::chain::{RemittanceGateway, RemittanceStatus, StatusSource};
use crate::database::models::{
    is_chain_reference, NewTransaction, Transaction, TransactionStatus, DEFAULT_RECEIVE_TOKEN,
    PLACEHOLDER_HASH_PREFIX,
};
use crate::database::{StoreError, TransactionStore};
use crate::notify::{NotificationHub, ServerEvent};
use crate::poller::StatusPoller;
use crate::retry::{execute_with_retry, RetryPolicy};

pub const MAX_PAGE_SIZE: u32 = 100;

const FINALIZED: &str = "Transaction already finalized";

/// Body of a create request. `amount` may be sent as a string or a number.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransaction {
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub amount: Option<String>,
    #[serde(default)]
    pub receive_token: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub total: u64,
    pub page: u32,
    pub pages: u64,
    pub limit: u32,
}

/// A transaction plus what the gateway reports about it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub blockchain_status: Option<RemittanceStatus>,
}

#[derive(Clone)]
pub struct TransactionService {
    store: Arc<dyn TransactionStore>,
    kyc: KycService,
    quotes: QuoteService,
    gateway: Arc<dyn RemittanceGateway>,
    source: Arc<dyn StatusSource>,
    poller: StatusPoller,
    hub: NotificationHub,
    retry: RetryPolicy,
}

impl TransactionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TransactionStore>,
        kyc: KycService,
        quotes: QuoteService,
        gateway: Arc<dyn RemittanceGateway>,
        source: Arc<dyn StatusSource>,
        poller: StatusPoller,
        hub: NotificationHub,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            kyc,
            quotes,
            gateway,
            source,
            poller,
            hub,
            retry,
        }
    }

    /// Validate, send and record a remittance for a KYC-verified sender.
    pub async fn create(&self, sender: i64, req: CreateTransaction) -> Result<Transaction, ServiceError> {
        let recipient = req.recipient.as_deref().map(str::trim).unwrap_or_default();
        let token = req.token.as_deref().map(str::trim).unwrap_or_default();
        let amount = req.amount.as_deref().map(str::trim).unwrap_or_default();
        if recipient.is_empty() || token.is_empty() || amount.is_empty() {
            return Err(ServiceError::validation(
                "Recipient, token, and amount are required",
            ));
        }
        let value = parse_amount(amount)?;
        if !is_wallet_address(recipient) {
            return Err(ServiceError::validation("Invalid recipient address format"));
        }

        self.kyc.ensure_verified(sender).await?;

        let receive_token = req
            .receive_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_RECEIVE_TOKEN);
        let quote = self.quotes.quote(token, amount, receive_token).await?;

        let supplied_hash = req
            .tx_hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty());
        let (tx_hash, remittance_id) = match supplied_hash {
            Some(hash) => (hash.to_string(), 0),
            None => match self.gateway.send_remittance(recipient, token, value).await {
                Ok(receipt) => (receipt.tx_hash, receipt.remittance_id),
                Err(e) => {
                    warn!("Remittance send for user {} failed: {}", sender, e);
                    (
                        format!("{PLACEHOLDER_HASH_PREFIX}{}", Utc::now().timestamp_millis()),
                        0,
                    )
                }
            },
        };

        let status = if is_chain_reference(&tx_hash) {
            self.source
                .check(&tx_hash)
                .await
                .terminal()
                .unwrap_or(TransactionStatus::Pending)
        } else {
            TransactionStatus::Pending
        };

        let new_tx = NewTransaction {
            sender,
            recipient: recipient.to_string(),
            token: token.to_string(),
            amount: amount.to_string(),
            status,
            tx_hash,
            receive_token: receive_token.to_string(),
            converted_amount: Some(quote.converted_amount),
            remittance_id,
        };

        let store = self.store.clone();
        let tx = execute_with_retry("transactions.insert", &self.retry, || {
            let store = store.clone();
            let new_tx = new_tx.clone();
            async move { store.insert(&new_tx).await }
        })
        .await?;
        info!(
            "Transaction {} created for user {}: {} {} -> {} ({})",
            tx.id, sender, tx.amount, tx.token, tx.recipient, tx.status
        );

        if self.poller.schedule(&tx) {
            debug!("Polling scheduled for transaction {}", tx.id);
        }
        self.hub.send(sender, ServerEvent::TransactionCreated(tx.clone()));
        Ok(tx)
    }

    /// One page of the sender's transactions, newest first.
    pub async fn list(&self, sender: i64, page: i64, limit: i64) -> Result<TransactionPage, ServiceError> {
        let page = u32::try_from(page)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| ServiceError::validation("Page must be a positive integer"))?;
        let limit = u32::try_from(limit)
            .ok()
            .filter(|l| (1..=MAX_PAGE_SIZE).contains(l))
            .ok_or_else(|| ServiceError::validation("Limit must be between 1 and 100"))?;
        let offset = u64::from(page - 1) * u64::from(limit);

        let store = self.store.clone();
        let transactions = execute_with_retry("transactions.page_by_sender", &self.retry, || {
            let store = store.clone();
            async move { store.page_by_sender(sender, limit, offset).await }
        })
        .await?;
        let total = execute_with_retry("transactions.count_by_sender", &self.retry, || {
            let store = store.clone();
            async move { store.count_by_sender(sender).await }
        })
        .await?;

        let transactions = join_all(transactions.into_iter().map(|tx| self.refresh(tx))).await;

        Ok(TransactionPage {
            transactions,
            total,
            page,
            pages: total.div_ceil(u64::from(limit)),
            limit,
        })
    }

    /// The sender's transaction with the gateway's view of it.
    pub async fn get(&self, sender: i64, id: i64) -> Result<TransactionDetail, ServiceError> {
        let tx = self.owned(sender, id).await?;
        let tx = self.refresh(tx).await;

        let blockchain_status = if tx.has_chain_reference() {
            let status = match self.gateway.remittance_status(tx.remittance_id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Remittance status for transaction {} unavailable: {}", tx.id, e);
                    RemittanceStatus {
                        status: "unknown".to_string(),
                        confirmations: 0,
                        remittance_id: tx.remittance_id,
                        source: "error",
                    }
                }
            };
            Some(status)
        } else {
            None
        };

        Ok(TransactionDetail {
            transaction: tx,
            blockchain_status,
        })
    }

    /// Set the status of one of the sender's transactions.
    pub async fn update_status(&self, sender: i64, id: i64, status: &str) -> Result<Transaction, ServiceError> {
        let status = TransactionStatus::from_str(status.trim())
            .ok_or_else(|| ServiceError::validation("Invalid status"))?;
        if self.owned(sender, id).await?.status.is_terminal() {
            return Err(ServiceError::validation(FINALIZED));
        }

        let store = self.store.clone();
        // A poller may settle the record between the read and the write.
        let updated = execute_with_retry("transactions.set_status", &self.retry, || {
            let store = store.clone();
            async move { store.set_status(id, status).await }
        })
        .await?
        .ok_or_else(|| ServiceError::validation(FINALIZED))?;
        info!("Transaction {} set to {}", id, status);

        self.hub
            .send(updated.sender, ServerEvent::TransactionUpdate(updated.clone()));
        Ok(updated)
    }

    async fn owned(&self, sender: i64, id: i64) -> Result<Transaction, ServiceError> {
        let store = self.store.clone();
        let tx = execute_with_retry("transactions.get", &self.retry, || {
            let store = store.clone();
            async move { store.get(id).await }
        })
        .await?;

        match tx {
            Some(tx) if tx.sender == sender => Ok(tx),
            _ => Err(not_found()),
        }
    }

    /// Check a pending transaction once if no poll job is watching it.
    async fn refresh(&self, tx: Transaction) -> Transaction {
        if !tx.awaits_confirmation() || self.poller.is_polling(tx.id) {
            return tx;
        }
        let Some(status) = self.source.check(&tx.tx_hash).await.terminal() else {
            return tx;
        };

        match self.settle(tx.id, status).await {
            Ok(Some(updated)) => {
                info!("Transaction {} settled as {} on read", updated.id, updated.status);
                self.hub
                    .send(updated.sender, ServerEvent::TransactionUpdate(updated.clone()));
                updated
            }
            Ok(None) => tx,
            Err(e) => {
                warn!("Failed to settle transaction {}: {}", tx.id, e);
                tx
            }
        }
    }

    async fn settle(&self, id: i64, status: TransactionStatus) -> Result<Option<Transaction>, StoreError> {
        let store = self.store.clone();
        execute_with_retry("transactions.settle", &self.retry, || {
            let store = store.clone();
            async move { store.settle(id, status).await }
        })
        .await
    }
}

fn not_found() -> ServiceError {
    ServiceError::NotFound("Transaction not found".to_string())
}

/// `0x` followed by 40 hex digits.
pub fn is_wallet_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
