//! Minimal Ethereum JSON-RPC provider.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde_json::{json, Value};

use super::{http_client, ChainError};

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug)]
pub struct RpcProvider {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcProvider {
    pub fn new(url: impl Into<String>) -> Result<Self, ChainError> {
        Ok(Self {
            http: http_client()?,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| ChainError::Malformed(format!("{method}: missing result")))
    }

    async fn call_quantity(&self, method: &str) -> Result<u128, ChainError> {
        let value = self.call(method, json!([])).await?;
        let raw = value
            .as_str()
            .ok_or_else(|| ChainError::Malformed(format!("{method}: result is not a string")))?;
        parse_quantity(raw)
    }

    /// Current gas price in wei.
    pub async fn gas_price(&self) -> Result<u128, ChainError> {
        self.call_quantity("eth_gasPrice").await
    }

    pub async fn block_number(&self) -> Result<u64, ChainError> {
        let n = self.call_quantity("eth_blockNumber").await?;
        u64::try_from(n).map_err(|_| ChainError::Malformed(format!("block number {n} out of range")))
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let n = self.call_quantity("eth_chainId").await?;
        u64::try_from(n).map_err(|_| ChainError::Malformed(format!("chain id {n} out of range")))
    }
}

/// Parse a `0x`-prefixed hex quantity.
fn parse_quantity(raw: &str) -> Result<u128, ChainError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Malformed(format!("quantity without 0x prefix: {raw}")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16).map_err(|e| ChainError::Malformed(format!("{raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert!(parse_quantity("26").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[tokio::test]
    async fn test_gas_price() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_gasPrice" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x6fc23ac00"}"#)
            .create_async()
            .await;

        let provider = RpcProvider::new(server.url()).unwrap();
        assert_eq!(provider.gas_price().await.unwrap(), 30_000_000_000);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rpc_error_surfaces() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"method not found"}}"#)
            .create_async()
            .await;

        let provider = RpcProvider::new(server.url()).unwrap();
        let err = provider.chain_id().await.unwrap_err();
        assert!(matches!(err, ChainError::Rpc { code: -32601, .. }));
    }
}
