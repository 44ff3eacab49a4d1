//! Read-only queries against the Cosmos `peggy` module.
//!
//! Queries go through the REST gateway; the latest block height comes from
//! Tendermint RPC. A missing record is reported as [`QueryError::NotFound`]
//! so callers can treat "nothing to do" separately from a failing endpoint.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use gravity_rs::types::string_u64;
use gravity_rs::{BatchConfirm, OutgoingTxBatch, Valset, ValsetConfirm};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tendermint_rpc::{Client as _, HttpClient};
use thiserror::Error;
use tracing::debug;

const DEFAULT_BLOCK_TIME_MS: u64 = 5_000;
const DEFAULT_ETH_BLOCK_TIME_MS: u64 = 12_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("query timed out")]
    Timeout,
}

impl QueryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueryError::NotFound(_))
    }
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Map [`QueryError::NotFound`] to `None`.
pub fn optional<T>(result: QueryResult<T>) -> QueryResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(QueryError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Bridge module parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Params {
    pub peggy_id: String,
    pub bridge_ethereum_address: String,
    #[serde(with = "string_u64")]
    pub bridge_chain_id: u64,
    #[serde(default, with = "string_u64")]
    pub bridge_contract_start_height: u64,
    /// Milliseconds
    #[serde(default, with = "string_u64")]
    pub average_block_time: u64,
    /// Milliseconds
    #[serde(default, with = "string_u64")]
    pub average_ethereum_block_time: u64,
}

impl Params {
    pub fn cosmos_block_time(&self) -> Duration {
        Duration::from_millis(non_zero_or(self.average_block_time, DEFAULT_BLOCK_TIME_MS))
    }

    pub fn eth_block_time(&self) -> Duration {
        Duration::from_millis(non_zero_or(
            self.average_ethereum_block_time,
            DEFAULT_ETH_BLOCK_TIME_MS,
        ))
    }
}

fn non_zero_or(value: u64, default: u64) -> u64 {
    if value == 0 {
        default
    } else {
        value
    }
}

/// Fees accumulated for a token's unbatched outgoing transfers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchFees {
    pub token: String,
    pub total_fees: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Erc20ToDenom {
    pub denom: String,
    #[serde(default)]
    pub cosmos_originated: bool,
}

/// The last Ethereum event this orchestrator attested to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LastClaimEvent {
    #[serde(default, with = "string_u64")]
    pub ethereum_event_nonce: u64,
    #[serde(default, with = "string_u64")]
    pub ethereum_event_height: u64,
}

/// Read-only Cosmos bridge state.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CosmosQueryClient: Send + Sync {
    async fn params(&self) -> QueryResult<Params>;

    async fn current_valset(&self) -> QueryResult<Valset>;

    async fn valset_at(&self, nonce: u64) -> QueryResult<Valset>;

    /// Valsets the orchestrator has not confirmed yet, oldest first.
    async fn oldest_unsigned_valsets(&self, orchestrator: String) -> QueryResult<Vec<Valset>>;

    async fn oldest_unsigned_batch(&self, orchestrator: String) -> QueryResult<OutgoingTxBatch>;

    /// The most recent valsets, newest first.
    async fn latest_valsets(&self) -> QueryResult<Vec<Valset>>;

    async fn all_valset_confirms(&self, nonce: u64) -> QueryResult<Vec<ValsetConfirm>>;

    async fn latest_batches(&self) -> QueryResult<Vec<OutgoingTxBatch>>;

    async fn batch_confirms(
        &self,
        nonce: u64,
        token_contract: String,
    ) -> QueryResult<Vec<BatchConfirm>>;

    async fn unbatched_tokens_with_fees(&self) -> QueryResult<Vec<BatchFees>>;

    async fn erc20_to_denom(&self, token: String) -> QueryResult<Erc20ToDenom>;

    async fn last_event_by_addr(&self, orchestrator: String) -> QueryResult<LastClaimEvent>;

    async fn latest_block_height(&self) -> QueryResult<u64>;
}

#[derive(Deserialize)]
struct ParamsResponse {
    params: Params,
}

#[derive(Deserialize)]
struct ValsetResponse {
    valset: Option<Valset>,
}

#[derive(Deserialize)]
struct ValsetsResponse {
    #[serde(default)]
    valsets: Vec<Valset>,
}

#[derive(Deserialize)]
struct BatchResponse {
    batch: Option<OutgoingTxBatch>,
}

#[derive(Deserialize)]
struct BatchesResponse {
    #[serde(default)]
    batches: Vec<OutgoingTxBatch>,
}

#[derive(Deserialize)]
struct ConfirmsResponse<T> {
    #[serde(default = "Vec::new")]
    confirms: Vec<T>,
}

#[derive(Deserialize)]
struct BatchFeesResponse {
    #[serde(default)]
    batch_fees: Vec<BatchFees>,
}

#[derive(Deserialize)]
struct LastEventResponse {
    last_claim_event: Option<LastClaimEvent>,
}

/// [`CosmosQueryClient`] over the REST gateway and Tendermint RPC.
pub struct LcdQueryClient {
    lcd_url: String,
    client: Client,
    tendermint: HttpClient,
    timeout: Duration,
}

impl LcdQueryClient {
    pub fn new(lcd_url: &str, tendermint_rpc: &str, timeout: Duration) -> eyre::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| eyre::eyre!("Failed to create HTTP client: {}", e))?;
        let tendermint = HttpClient::new(tendermint_rpc)
            .map_err(|e| eyre::eyre!("Invalid Tendermint RPC URL {}: {}", tendermint_rpc, e))?;

        Ok(Self {
            lcd_url: lcd_url.trim_end_matches('/').to_string(),
            client,
            tendermint,
            timeout,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> QueryResult<T> {
        let url = format!("{}{}", self.lcd_url, path);
        debug!(url = %url, "Cosmos query");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                QueryError::Timeout
            } else {
                QueryError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(QueryError::NotFound(path.to_string()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_failure(status, path, &body));
        }

        serde_json::from_str(&body).map_err(|e| QueryError::Decode(format!("{}: {}", path, e)))
    }
}

/// gRPC-gateway reports missing store entries as errors with a body rather
/// than always as a 404.
fn classify_failure(status: StatusCode, path: &str, body: &str) -> QueryError {
    if body.to_lowercase().contains("not found") {
        QueryError::NotFound(path.to_string())
    } else {
        QueryError::Transport(format!("{} returned {}: {}", path, status, body))
    }
}

fn required<T>(value: Option<T>, path: &str) -> QueryResult<T> {
    value.ok_or_else(|| QueryError::NotFound(path.to_string()))
}

#[async_trait]
impl CosmosQueryClient for LcdQueryClient {
    async fn params(&self) -> QueryResult<Params> {
        let resp: ParamsResponse = self.get_json("/peggy/v1/params").await?;
        Ok(resp.params)
    }

    async fn current_valset(&self) -> QueryResult<Valset> {
        let path = "/peggy/v1/valset/current";
        let resp: ValsetResponse = self.get_json(path).await?;
        required(resp.valset, path)
    }

    async fn valset_at(&self, nonce: u64) -> QueryResult<Valset> {
        let path = format!("/peggy/v1/valset?nonce={}", nonce);
        let resp: ValsetResponse = self.get_json(&path).await?;
        required(resp.valset, &path)
    }

    async fn oldest_unsigned_valsets(&self, orchestrator: String) -> QueryResult<Vec<Valset>> {
        let path = format!("/peggy/v1/valset/last?address={}", orchestrator);
        let resp: ValsetsResponse = self.get_json(&path).await?;
        Ok(resp.valsets)
    }

    async fn oldest_unsigned_batch(&self, orchestrator: String) -> QueryResult<OutgoingTxBatch> {
        let path = format!("/peggy/v1/batch/last?address={}", orchestrator);
        let resp: BatchResponse = self.get_json(&path).await?;
        required(resp.batch, &path)
    }

    async fn latest_valsets(&self) -> QueryResult<Vec<Valset>> {
        let resp: ValsetsResponse = self.get_json("/peggy/v1/valset/requests").await?;
        Ok(resp.valsets)
    }

    async fn all_valset_confirms(&self, nonce: u64) -> QueryResult<Vec<ValsetConfirm>> {
        let path = format!("/peggy/v1/confirms/{}", nonce);
        let resp: ConfirmsResponse<ValsetConfirm> = self.get_json(&path).await?;
        Ok(resp.confirms)
    }

    async fn latest_batches(&self) -> QueryResult<Vec<OutgoingTxBatch>> {
        let resp: BatchesResponse = self.get_json("/peggy/v1/batch/outgoingtx").await?;
        Ok(resp.batches)
    }

    async fn batch_confirms(
        &self,
        nonce: u64,
        token_contract: String,
    ) -> QueryResult<Vec<BatchConfirm>> {
        let path = format!(
            "/peggy/v1/batch/confirms?nonce={}&contract_address={}",
            nonce, token_contract
        );
        let resp: ConfirmsResponse<BatchConfirm> = self.get_json(&path).await?;
        Ok(resp.confirms)
    }

    async fn unbatched_tokens_with_fees(&self) -> QueryResult<Vec<BatchFees>> {
        let resp: BatchFeesResponse = self.get_json("/peggy/v1/batchfees").await?;
        Ok(resp.batch_fees)
    }

    async fn erc20_to_denom(&self, token: String) -> QueryResult<Erc20ToDenom> {
        let path = format!("/peggy/v1/cosmos_originated/erc20_to_denom?erc20={}", token);
        self.get_json(&path).await
    }

    async fn last_event_by_addr(&self, orchestrator: String) -> QueryResult<LastClaimEvent> {
        let path = format!("/peggy/v1/oracle/event/{}", orchestrator);
        let resp: LastEventResponse = self.get_json(&path).await?;
        Ok(resp.last_claim_event.unwrap_or_default())
    }

    async fn latest_block_height(&self) -> QueryResult<u64> {
        let status = tokio::time::timeout(self.timeout, self.tendermint.status())
            .await
            .map_err(|_| QueryError::Timeout)?
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        Ok(status.sync_info.latest_block_height.value())
    }
}
