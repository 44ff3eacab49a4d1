//! Mempool de-duplication for relayed Gravity calls.
//!
//! A websocket subscription records the calldata of pending `updateValset`
//! and `submitBatch` transactions sent to the contract by anyone. The relayer
//! checks this list before submitting so that it does not pay gas to race an
//! identical transaction already in flight.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, Bytes};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::sol_types::SolCall;
use eyre::{eyre, Result};
use futures::StreamExt;
use gravity_rs::contracts::Gravity;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Entries kept before the oldest is evicted.
pub const MAX_PENDING_INPUTS: usize = 100;

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

pub type SharedPendingInputs = Arc<RwLock<PendingTxInputList>>;

#[derive(Debug, Clone)]
struct PendingTxInput {
    input: Bytes,
    received: Instant,
}

/// Bounded FIFO of pending Gravity calldata.
#[derive(Debug)]
pub struct PendingTxInputList {
    entries: VecDeque<PendingTxInput>,
    capacity: usize,
}

impl Default for PendingTxInputList {
    fn default() -> Self {
        Self::with_capacity(MAX_PENDING_INPUTS)
    }
}

impl PendingTxInputList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record `input` if it calls `updateValset` or `submitBatch`.
    pub fn add_if_relevant(&mut self, input: Bytes, received: Instant) -> bool {
        if !is_relayed_call(&input) {
            return false;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(PendingTxInput { input, received });
        true
    }

    /// True if any entry matching `data` is younger than `wait`.
    ///
    /// Stale entries are not removed here; they age out through eviction.
    pub fn is_pending(&self, data: &[u8], wait: Duration) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.input.as_ref() == data && entry.received.elapsed() < wait)
    }
}

fn is_relayed_call(input: &[u8]) -> bool {
    input.len() >= 4
        && (input[..4] == Gravity::updateValsetCall::SELECTOR
            || input[..4] == Gravity::submitBatchCall::SELECTOR)
}

/// Follow pending transactions to `gravity` until cancelled, reconnecting on
/// stream failure.
pub async fn run_pending_tx_subscription(
    ws_url: String,
    gravity: Address,
    inputs: SharedPendingInputs,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            outcome = subscribe_once(&ws_url, gravity, &inputs, &cancel) => outcome,
        };

        match outcome {
            Ok(()) if cancel.is_cancelled() => return Ok(()),
            Ok(()) => warn!("Pending transaction stream ended, resubscribing"),
            Err(e) => warn!(error = %e, "Pending transaction subscription failed"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
        }
    }
}

async fn subscribe_once(
    ws_url: &str,
    gravity: Address,
    inputs: &SharedPendingInputs,
    cancel: &CancellationToken,
) -> Result<()> {
    let provider = ProviderBuilder::new()
        .on_ws(WsConnect::new(ws_url))
        .await
        .map_err(|e| eyre!("Failed to connect pending tx websocket: {}", e))?;

    let subscription = provider
        .subscribe::<_, Value>((
            "alchemy_filteredNewFullPendingTransactions",
            json!({ "address": gravity.to_checksum(None) }),
        ))
        .await
        .map_err(|e| eyre!("Failed to subscribe to pending transactions: {}", e))?;

    info!(gravity = %gravity, "Subscribed to pending Gravity transactions");
    let mut stream = subscription.into_stream();

    loop {
        let tx = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            tx = stream.next() => tx,
        };
        let Some(tx) = tx else {
            return Ok(());
        };

        let Some(input) = tx_input(&tx) else {
            continue;
        };
        if inputs.write().await.add_if_relevant(input, Instant::now()) {
            debug!(
                tx_hash = tx.get("hash").and_then(serde_json::Value::as_str).unwrap_or_default(),
                "Recorded pending Gravity transaction"
            );
        }
    }
}

fn tx_input(tx: &Value) -> Option<Bytes> {
    let raw = tx.get("input").and_then(Value::as_str)?;
    hex::decode(raw.strip_prefix("0x").unwrap_or(raw))
        .ok()
        .map(Bytes::from)
}
