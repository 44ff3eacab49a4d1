use alloy::providers::{ProviderBuilder, RootProvider};
use alloy::transports::http::{Client, Http};
use eyre::{eyre, Result, WrapErr};
use tokio::sync::Mutex;
use tracing::warn;

pub type HttpProvider = RootProvider<Http<Client>>;

/// Parse a comma-separated RPC URL string into individual trimmed URLs.
pub fn parse_rpc_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Create an alloy HTTP provider for one RPC URL.
pub fn create_provider(url: &str) -> Result<HttpProvider> {
    let parsed = url
        .parse()
        .wrap_err_with(|| format!("Invalid RPC URL: {}", url))?;
    Ok(ProviderBuilder::new().on_http(parsed))
}

struct PoolState {
    cursor: usize,
    provider: HttpProvider,
}

/// Owned set of EVM endpoints with round-robin failover.
///
/// Callers take the current provider together with its cursor and, when a
/// call fails at the transport level, hand the cursor back to
/// [`EndpointPool::dial_next`]. Concurrent failures on the same endpoint
/// advance the pool only once.
pub struct EndpointPool {
    urls: Vec<String>,
    state: Mutex<PoolState>,
}

impl EndpointPool {
    pub fn new(urls: Vec<String>) -> Result<Self> {
        let first = urls
            .first()
            .ok_or_else(|| eyre!("At least one RPC URL is required"))?;
        // Reject bad URLs up front rather than on first failover
        for url in &urls {
            create_provider(url)?;
        }
        let provider = create_provider(first)?;

        Ok(Self {
            urls,
            state: Mutex::new(PoolState {
                cursor: 0,
                provider,
            }),
        })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// The provider in use and the cursor identifying it.
    pub async fn current(&self) -> (usize, HttpProvider) {
        let state = self.state.lock().await;
        (state.cursor, state.provider.clone())
    }

    pub async fn current_url(&self) -> &str {
        let cursor = self.state.lock().await.cursor;
        &self.urls[cursor % self.urls.len()]
    }

    /// Switch to the next endpoint if `failed_cursor` is still the active one.
    pub async fn dial_next(&self, failed_cursor: usize) -> Result<usize> {
        let mut state = self.state.lock().await;
        if state.cursor != failed_cursor || self.urls.len() == 1 {
            return Ok(state.cursor);
        }

        let next = failed_cursor.wrapping_add(1);
        let url = &self.urls[next % self.urls.len()];
        state.provider = create_provider(url)?;
        state.cursor = next;

        warn!(
            failed = %self.urls[failed_cursor % self.urls.len()],
            next = %url,
            "Switched EVM RPC endpoint"
        );
        Ok(next)
    }
}
