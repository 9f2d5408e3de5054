//! Conversion quotes with a reference-price fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::ServiceError;
use crate::cache::TtlCache;
use crate::chain::{rates, QuoteSource, RemittanceGateway, TokenQuote};
use crate::database::models::DEFAULT_RECEIVE_TOKEN;

const QUOTE_TTL: Duration = Duration::from_secs(30);
/// Degraded quotes are retried sooner.
const FALLBACK_QUOTE_TTL: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct QuoteService {
    gateway: Arc<dyn RemittanceGateway>,
    cache: TtlCache<TokenQuote>,
}

impl QuoteService {
    pub fn new(gateway: Arc<dyn RemittanceGateway>) -> Self {
        Self {
            gateway,
            cache: TtlCache::new("quotes"),
        }
    }

    /// Quote `amount` of `source` in `target`.
    ///
    /// `amount` is the decimal string as the client sent it; it is also part
    /// of the cache key.
    pub async fn quote(&self, source: &str, amount: &str, target: &str) -> Result<TokenQuote, ServiceError> {
        let source = source.trim();
        let amount = amount.trim();
        let target = match target.trim() {
            "" => DEFAULT_RECEIVE_TOKEN,
            target => target,
        };
        if source.is_empty() || amount.is_empty() {
            return Err(ServiceError::validation("Source token and amount are required"));
        }
        let value = parse_amount(amount)?;

        let key = format!("quote_{source}_{amount}_{target}");
        if let Some(quote) = self.cache.get(&key) {
            debug!("Quote cache hit for {}", key);
            return Ok(quote);
        }

        let quote = match self.gateway.conversion_quote(source, value, target).await {
            Ok(quote) if quote.converted() > 0.0 => quote,
            Ok(quote) => {
                warn!(
                    "Gateway quoted {} {} as {} {}, using reference prices",
                    amount, source, quote.converted_amount, target
                );
                fallback_quote(source, amount, value, target)
            }
            Err(e) => {
                warn!("Gateway quote for {} {} failed ({}), using reference prices", amount, source, e);
                fallback_quote(source, amount, value, target)
            }
        };

        let ttl = match quote.source {
            QuoteSource::Fallback => FALLBACK_QUOTE_TTL,
            _ => QUOTE_TTL,
        };
        self.cache.set(key, quote.clone(), ttl);
        Ok(quote)
    }

    /// Drop every cached quote. Returns the number removed.
    pub fn invalidate(&self) -> usize {
        self.cache.invalidate("quote")
    }
}

/// A strictly positive, finite decimal amount.
pub fn parse_amount(raw: &str) -> Result<f64, ServiceError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| ServiceError::validation("Amount must be a positive number"))
}

fn fallback_quote(source: &str, amount: &str, value: f64, target: &str) -> TokenQuote {
    TokenQuote {
        source_amount: amount.to_string(),
        converted_amount: format!("{:.6}", rates::convert(value, source, target)),
        source_token: source.to_string(),
        target_token: target.to_string(),
        source: QuoteSource::Fallback,
    }
}
