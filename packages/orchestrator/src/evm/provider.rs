//! EVM provider seam and its alloy implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::endpoint_pool::{EndpointPool, HttpProvider};

/// A log query over one contract and one event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub event_signature: B256,
    /// First indexed argument, when filtering on it
    pub topic1: Option<B256>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogQuery {
    pub fn to_filter(&self) -> Filter {
        let filter = Filter::new()
            .address(self.address)
            .event_signature(self.event_signature)
            .from_block(self.from_block)
            .to_block(self.to_block);
        match self.topic1 {
            Some(topic) => filter.topic1(topic),
            None => filter,
        }
    }
}

/// Read and submit access to the EVM chain.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EvmProvider: Send + Sync {
    /// Number of the latest block header.
    async fn latest_block_number(&self) -> Result<u64>;

    async fn chain_id(&self) -> Result<u64>;

    async fn filter_logs(&self, query: LogQuery) -> Result<Vec<Log>>;

    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    async fn pending_nonce(&self, address: Address) -> Result<u64>;

    async fn estimate_gas(&self, tx: TransactionRequest) -> Result<u64>;

    async fn suggest_gas_price(&self) -> Result<u128>;

    /// Broadcast a signed, EIP-2718 encoded transaction.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256>;
}

/// [`EvmProvider`] over an [`EndpointPool`] of HTTP endpoints.
///
/// Every call is bounded by a timeout. Timeouts and transport failures move
/// the pool to its next endpoint before the error is returned.
pub struct AlloyEvmProvider {
    pool: Arc<EndpointPool>,
    timeout: Duration,
}

impl AlloyEvmProvider {
    pub fn new(pool: Arc<EndpointPool>, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn with_provider<T, F, Fut>(&self, method: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(HttpProvider) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let (cursor, provider) = self.pool.current().await;

        match tokio::time::timeout(self.timeout, f(provider)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if matches!(err, RpcError::Transport(_)) {
                    self.pool.dial_next(cursor).await?;
                }
                Err(err).wrap_err_with(|| format!("{} failed", method))
            }
            Err(_) => {
                debug!(method, timeout = ?self.timeout, "EVM RPC call timed out");
                self.pool.dial_next(cursor).await?;
                Err(eyre!("{} timed out after {:?}", method, self.timeout))
            }
        }
    }
}

#[async_trait]
impl EvmProvider for AlloyEvmProvider {
    async fn latest_block_number(&self) -> Result<u64> {
        self.with_provider("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await
    }

    async fn chain_id(&self) -> Result<u64> {
        self.with_provider("eth_chainId", |p| async move { p.get_chain_id().await })
            .await
    }

    async fn filter_logs(&self, query: LogQuery) -> Result<Vec<Log>> {
        let filter = query.to_filter();
        self.with_provider("eth_getLogs", |p| async move { p.get_logs(&filter).await })
            .await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx = TransactionRequest::default().to(to).input(data.into());
        self.with_provider("eth_call", |p| async move { p.call(&tx).await })
            .await
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        self.with_provider("eth_getTransactionCount", |p| async move {
            p.get_transaction_count(address)
                .block_id(BlockNumberOrTag::Pending.into())
                .await
        })
        .await
    }

    async fn estimate_gas(&self, tx: TransactionRequest) -> Result<u64> {
        self.with_provider("eth_estimateGas", |p| async move { p.estimate_gas(&tx).await })
            .await
    }

    async fn suggest_gas_price(&self) -> Result<u128> {
        self.with_provider("eth_gasPrice", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        self.with_provider("eth_sendRawTransaction", |p| async move {
            let pending = p.send_raw_transaction(&raw).await?;
            Ok(*pending.tx_hash())
        })
        .await
    }
}
