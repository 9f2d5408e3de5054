//! Block explorer client.
//!
//! Resolves a transaction hash to a receipt status using the
//! Polygonscan (Etherscan-compatible) HTTP API.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{http_client, ChainError};
use crate::database::models::transaction::{is_chain_reference, TransactionStatus};

/// Receipt status reported by a status source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    Pending,
    Completed,
    Failed,
    /// The source could not be reached or answered garbage.
    Unknown,
}

impl ChainStatus {
    /// The transaction status this resolves to, if terminal.
    pub fn terminal(self) -> Option<TransactionStatus> {
        match self {
            Self::Completed => Some(TransactionStatus::Completed),
            Self::Failed => Some(TransactionStatus::Failed),
            Self::Pending | Self::Unknown => None,
        }
    }

    pub fn confirmations(self) -> u32 {
        u32::from(self == Self::Completed)
    }
}

/// Anything that can tell whether an on-chain transaction settled.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Never fails: unreachable sources report `Unknown`.
    async fn check(&self, tx_hash: &str) -> ChainStatus;
}

#[derive(Debug, Clone)]
pub struct ExplorerClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ExplorerClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ChainError> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.into(),
            api_key,
        })
    }

    async fn query(&self, module: &str, action: &str, tx_hash: &str) -> Result<Value, ChainError> {
        let mut params = vec![("module", module), ("action", action), ("txhash", tx_hash)];
        if let Some(key) = &self.api_key {
            params.push(("apikey", key.as_str()));
        }

        let body = self
            .http
            .get(&self.base_url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(body)
    }

    /// Receipt status: `gettxreceiptstatus` first, then the raw receipt.
    pub async fn receipt_status(&self, tx_hash: &str) -> Result<ChainStatus, ChainError> {
        let body = self.query("transaction", "gettxreceiptstatus", tx_hash).await?;
        match body.pointer("/result/status").and_then(Value::as_str) {
            Some("1") => return Ok(ChainStatus::Completed),
            Some("0") => return Ok(ChainStatus::Failed),
            _ => {}
        }

        let body = self.query("proxy", "eth_getTransactionReceipt", tx_hash).await?;
        match body.pointer("/result/status").and_then(Value::as_str) {
            Some("0x1") => Ok(ChainStatus::Completed),
            Some("0x0") => Ok(ChainStatus::Failed),
            _ => Ok(ChainStatus::Pending),
        }
    }
}

#[async_trait]
impl StatusSource for ExplorerClient {
    async fn check(&self, tx_hash: &str) -> ChainStatus {
        if !is_chain_reference(tx_hash) {
            return ChainStatus::Pending;
        }

        match self.receipt_status(tx_hash).await {
            Ok(status) => {
                debug!("Explorer status for {}: {:?}", tx_hash, status);
                status
            }
            Err(e) => {
                warn!("Explorer lookup for {} failed: {}", tx_hash, e);
                ChainStatus::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;

    const HASH: &str = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";

    fn action(name: &str) -> Matcher {
        Matcher::UrlEncoded("action".into(), name.into())
    }

    #[tokio::test]
    async fn test_receipt_status_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api")
            .match_query(action("gettxreceiptstatus"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"1","message":"OK","result":{"status":"1"}}"#)
            .create_async()
            .await;

        let client = ExplorerClient::new(format!("{}/api", server.url()), None).unwrap();
        assert_eq!(client.check(HASH).await, ChainStatus::Completed);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_falls_back_to_raw_receipt() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api")
            .match_query(action("gettxreceiptstatus"))
            .with_status(200)
            .with_body(r#"{"status":"0","message":"NOTOK","result":"Invalid API Key"}"#)
            .create_async()
            .await;
        let receipt = server
            .mock("GET", "/api")
            .match_query(action("eth_getTransactionReceipt"))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"status":"0x0"}}"#)
            .create_async()
            .await;

        let client = ExplorerClient::new(format!("{}/api", server.url()), Some("key".into())).unwrap();
        assert_eq!(client.check(HASH).await, ChainStatus::Failed);
        receipt.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_receipt_is_pending() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api")
            .match_query(action("gettxreceiptstatus"))
            .with_status(200)
            .with_body(r#"{"status":"1","message":"OK","result":{"status":""}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api")
            .match_query(action("eth_getTransactionReceipt"))
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .create_async()
            .await;

        let client = ExplorerClient::new(format!("{}/api", server.url()), None).unwrap();
        assert_eq!(client.check(HASH).await, ChainStatus::Pending);
    }

    #[tokio::test]
    async fn test_http_failure_is_unknown() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let client = ExplorerClient::new(format!("{}/api", server.url()), None).unwrap();
        assert_eq!(client.check(HASH).await, ChainStatus::Unknown);
    }

    #[tokio::test]
    async fn test_placeholder_hash_skips_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = ExplorerClient::new(format!("{}/api", server.url()), None).unwrap();
        assert_eq!(client.check("pending_1712345678").await, ChainStatus::Pending);
        mock.assert_async().await;
    }

    #[test]
    fn test_terminal_mapping() {
        assert_eq!(ChainStatus::Completed.terminal(), Some(TransactionStatus::Completed));
        assert_eq!(ChainStatus::Failed.terminal(), Some(TransactionStatus::Failed));
        assert_eq!(ChainStatus::Unknown.terminal(), None);
    }
}
