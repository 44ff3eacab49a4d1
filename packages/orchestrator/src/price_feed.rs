//! USD token prices for batch profitability.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const PRICE_TTL: Duration = Duration::from_secs(60);

/// Spot USD price of an ERC20 token.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn query_usd_price(&self, token: Address) -> Result<f64>;
}

/// CoinGecko `simple/token_price` client with a short per-token cache.
pub struct CoinGeckoPriceFeed {
    base_url: String,
    client: Client,
    cache: RwLock<HashMap<Address, (f64, Instant)>>,
    ttl: Duration,
}

impl CoinGeckoPriceFeed {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            cache: RwLock::new(HashMap::new()),
            ttl: PRICE_TTL,
        })
    }

    fn price_url(&self, token: &str) -> String {
        format!(
            "{}/simple/token_price/ethereum?contract_addresses={}&vs_currencies=usd",
            self.base_url, token
        )
    }

    async fn cached(&self, token: Address) -> Option<f64> {
        self.cache
            .read()
            .await
            .get(&token)
            .filter(|(_, fetched)| fetched.elapsed() < self.ttl)
            .map(|(price, _)| *price)
    }
}

#[async_trait]
impl PriceFeed for CoinGeckoPriceFeed {
    async fn query_usd_price(&self, token: Address) -> Result<f64> {
        if let Some(price) = self.cached(token).await {
            return Ok(price);
        }

        let token_key = format!("{:#x}", token);
        let response = self
            .client
            .get(self.price_url(&token_key))
            .send()
            .await
            .wrap_err("Failed to query CoinGecko")?;

        if !response.status().is_success() {
            return Err(eyre!(
                "CoinGecko query failed: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let body: Value = response.json().await?;
        let price = extract_usd_price(&body, &token_key)?;

        debug!(token = %token, price, "Fetched token price");
        self.cache
            .write()
            .await
            .insert(token, (price, Instant::now()));
        Ok(price)
    }
}

/// Read `body[token].usd`, rejecting missing and zero prices.
pub fn extract_usd_price(body: &Value, token: &str) -> Result<f64> {
    let price = body
        .get(token)
        .and_then(|entry| entry.get("usd"))
        .and_then(Value::as_f64)
        .ok_or_else(|| eyre!("No USD price for token {}", token))?;

    if price == 0.0 {
        return Err(eyre!("USD price for token {} is zero", token));
    }
    Ok(price)
}
