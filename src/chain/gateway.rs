//! Remittance gateway.
//!
//! The gateway sends remittances and prices conversions. The shipped
//! implementation simulates the contract: random hashes and ids, quotes from
//! the reference table with a little noise.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use super::{rates, ChainError};

/// Where a conversion quote came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Blockchain,
    Simulation,
    /// Reference prices; accuracy is degraded.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenQuote {
    pub source_amount: String,
    /// Six decimal places.
    pub converted_amount: String,
    pub source_token: String,
    pub target_token: String,
    pub source: QuoteSource,
}

impl TokenQuote {
    pub fn converted(&self) -> f64 {
        self.converted_amount.parse().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemittanceReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub remittance_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemittanceStatus {
    pub status: String,
    pub confirmations: u32,
    pub remittance_id: u64,
    pub source: &'static str,
}

#[async_trait]
pub trait RemittanceGateway: Send + Sync {
    /// `"blockchain"` or `"simulation"`.
    fn mode(&self) -> &'static str;

    async fn send_remittance(
        &self,
        recipient: &str,
        token: &str,
        amount: f64,
    ) -> Result<RemittanceReceipt, ChainError>;

    async fn remittance_status(&self, remittance_id: u64) -> Result<RemittanceStatus, ChainError>;

    async fn conversion_quote(
        &self,
        source_token: &str,
        amount: f64,
        target_token: &str,
    ) -> Result<TokenQuote, ChainError>;
}

/// Contract stand-in used when no contract is configured.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGateway {
    latency: Duration,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, approximating a round-trip to a node.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn random_hash() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    format!("0x{}", hex::encode(bytes))
}

fn check_amount(amount: f64) -> Result<(), ChainError> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(ChainError::InvalidAmount(amount.to_string()))
    }
}

#[async_trait]
impl RemittanceGateway for SimulatedGateway {
    fn mode(&self) -> &'static str {
        "simulation"
    }

    async fn send_remittance(
        &self,
        recipient: &str,
        token: &str,
        amount: f64,
    ) -> Result<RemittanceReceipt, ChainError> {
        check_amount(amount)?;
        self.pause().await;

        let mut rng = rand::thread_rng();
        let receipt = RemittanceReceipt {
            tx_hash: random_hash(),
            block_number: rng.gen_range(0..1_000_000),
            remittance_id: rng.gen_range(0..1_000),
        };
        debug!("Simulated remittance of {} {} to {}: {}", amount, token, recipient, receipt.tx_hash);
        Ok(receipt)
    }

    async fn remittance_status(&self, remittance_id: u64) -> Result<RemittanceStatus, ChainError> {
        self.pause().await;
        Ok(RemittanceStatus {
            status: "completed".to_string(),
            confirmations: 12,
            remittance_id,
            source: "simulation",
        })
    }

    async fn conversion_quote(
        &self,
        source_token: &str,
        amount: f64,
        target_token: &str,
    ) -> Result<TokenQuote, ChainError> {
        check_amount(amount)?;
        self.pause().await;

        let converted = if source_token.eq_ignore_ascii_case(target_token) {
            amount
        } else {
            // +/-2% noise around the reference conversion
            rates::convert(amount, source_token, target_token) * rand::thread_rng().gen_range(0.98..1.02)
        };

        Ok(TokenQuote {
            source_amount: amount.to_string(),
            converted_amount: format!("{converted:.6}"),
            source_token: source_token.to_string(),
            target_token: target_token.to_string(),
            source: QuoteSource::Simulation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_send() {
        let gateway = SimulatedGateway::new();
        let receipt = gateway
            .send_remittance("0x0000000000000000000000000000000000000001", "ETH", 1.5)
            .await
            .unwrap();
        assert!(receipt.tx_hash.starts_with("0x"));
        assert_eq!(receipt.tx_hash.len(), 66);
        assert!(receipt.remittance_id < 1_000);
    }

    #[tokio::test]
    async fn test_simulated_send_rejects_bad_amount() {
        let gateway = SimulatedGateway::new();
        let result = gateway.send_remittance("0x1", "ETH", 0.0).await;
        assert!(matches!(result, Err(ChainError::InvalidAmount(_))));
    }

    #[tokio::test]
    async fn test_simulated_quote_within_noise() {
        let gateway = SimulatedGateway::new();
        let quote = gateway.conversion_quote("ETH", 2.0, "USDC").await.unwrap();
        let expected = 2.0 * 2_025.53;
        let got = quote.converted();
        assert!(got >= expected * 0.98 - 1e-6 && got <= expected * 1.02 + 1e-6, "{got}");
        assert_eq!(quote.source, QuoteSource::Simulation);
    }

    #[tokio::test]
    async fn test_same_token_quote_is_identity() {
        let gateway = SimulatedGateway::new();
        let quote = gateway.conversion_quote("USDC", 12.5, "usdc").await.unwrap();
        assert_eq!(quote.converted_amount, "12.500000");
    }
}
