//! Cosmos transaction signing and broadcasting.
//!
//! [`CosmosTxSink`] signs with SIGN_MODE_DIRECT and broadcasts through the
//! REST gateway. Synchronous broadcasts wait for the transaction to be
//! committed; queued messages are packed into transactions by a
//! [`QueueFlusher`] task.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bip39::Mnemonic;
use cosmrs::{
    bip32::DerivationPath,
    crypto::secp256k1::SigningKey,
    tendermint::chain,
    tx::{self, Fee, SignDoc, SignerInfo},
    AccountId, Any, Coin, Denom,
};
use eyre::{eyre, Result, WrapErr};
#[cfg(test)]
use mockall::automock;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CosmosConfig;

/// Cosmos SDK derivation path
const COSMOS_DERIVATION_PATH: &str = "m/44'/118'/0'/0/0";

const QUEUE_CAPACITY: usize = 1024;
const COMMIT_TIMEOUT: Duration = Duration::from_secs(60);
const COMMIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResponse {
    pub tx_hash: String,
    pub height: u64,
}

/// Destination for Cosmos messages.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BroadcastSink: Send + Sync {
    /// Bech32 address of the signing account.
    fn account_address(&self) -> String;

    /// Broadcast `msgs` in one transaction and wait until it is committed.
    async fn sync_broadcast_msgs(&self, msgs: Vec<Any>) -> Result<TxResponse>;

    /// Hand `msg` to the batching queue without waiting for inclusion.
    async fn queue_broadcast_msg(&self, msg: Any) -> Result<()>;
}

/// A gas price such as `0.05uumee`.
#[derive(Debug, Clone, PartialEq)]
pub struct GasPrice {
    pub amount: f64,
    pub denom: String,
}

impl FromStr for GasPrice {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_alphabetic())
            .ok_or_else(|| eyre!("Gas price {:?} has no denom", s))?;
        let (amount, denom) = s.split_at(split);
        let amount: f64 = amount
            .parse()
            .map_err(|_| eyre!("Gas price {:?} has an invalid amount", s))?;
        if amount.is_nan() || amount < 0.0 {
            return Err(eyre!("Gas price {:?} must not be negative", s));
        }
        Ok(Self {
            amount,
            denom: denom.to_string(),
        })
    }
}

impl GasPrice {
    pub fn fee_for(&self, gas_limit: u64) -> u128 {
        (gas_limit as f64 * self.amount).ceil() as u128
    }
}

/// Account number and next sequence for the signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AccountInfo {
    account_number: u64,
    sequence: u64,
}

/// Derive the orchestrator's Cosmos key from a mnemonic.
pub fn signing_key_from_mnemonic(mnemonic: &str) -> Result<SigningKey> {
    let mnemonic = Mnemonic::parse(mnemonic).map_err(|e| eyre!("Invalid mnemonic: {}", e))?;
    let seed = mnemonic.to_seed("");
    let path: DerivationPath = COSMOS_DERIVATION_PATH
        .parse()
        .map_err(|e| eyre!("Invalid derivation path: {:?}", e))?;

    SigningKey::derive_from_path(seed, &path)
        .map_err(|e| eyre!("Failed to derive signing key: {}", e))
}

/// Load the orchestrator's Cosmos key from hex.
pub fn signing_key_from_hex(key: &str) -> Result<SigningKey> {
    let bytes = hex::decode(key.strip_prefix("0x").unwrap_or(key))
        .wrap_err("Cosmos private key is not valid hex")?;
    SigningKey::from_slice(&bytes).map_err(|e| eyre!("Invalid Cosmos private key: {}", e))
}

/// Signs and broadcasts Cosmos transactions for one account.
pub struct CosmosTxSink {
    lcd_url: String,
    chain_id: chain::Id,
    signing_key: SigningKey,
    address: AccountId,
    client: Client,
    gas_price: GasPrice,
    gas_per_msg: u64,
    /// Cached account state. Held for the whole sign-and-broadcast so
    /// sequences are handed out one at a time.
    account: Mutex<Option<AccountInfo>>,
    queue: mpsc::Sender<Any>,
}

impl CosmosTxSink {
    /// Build the sink and the receiving end of its message queue.
    pub fn new(config: &CosmosConfig) -> Result<(Self, mpsc::Receiver<Any>)> {
        let signing_key = match (&config.mnemonic, &config.private_key) {
            (Some(mnemonic), _) => signing_key_from_mnemonic(mnemonic)?,
            (None, Some(key)) => signing_key_from_hex(key)?,
            (None, None) => {
                return Err(eyre!(
                    "COSMOS_MNEMONIC or COSMOS_PRIVATE_KEY environment variable is required"
                ))
            }
        };

        let address = signing_key
            .public_key()
            .account_id(&config.account_prefix)
            .map_err(|e| eyre!("Failed to get account ID: {}", e))?;

        let chain_id = config
            .chain_id
            .parse()
            .map_err(|_| eyre!("Invalid chain ID: {}", config.chain_id))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to create HTTP client")?;

        let (queue, rx) = mpsc::channel(QUEUE_CAPACITY);

        info!(
            orchestrator_address = %address,
            chain_id = %config.chain_id,
            "Cosmos broadcaster initialized"
        );

        Ok((
            Self {
                lcd_url: config.lcd_url.trim_end_matches('/').to_string(),
                chain_id,
                signing_key,
                address,
                client,
                gas_price: config.gas_prices.parse()?,
                gas_per_msg: config.gas_per_msg,
                account: Mutex::new(None),
                queue,
            },
            rx,
        ))
    }

    pub fn address(&self) -> &AccountId {
        &self.address
    }

    async fn get_account_info(&self) -> Result<AccountInfo> {
        let url = format!(
            "{}/cosmos/auth/v1beta1/accounts/{}",
            self.lcd_url, self.address
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err("Failed to query account info")?;

        if !response.status().is_success() {
            return Err(eyre!(
                "Account query failed: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let data: Value = response.json().await?;
        let account = data
            .get("account")
            .ok_or_else(|| eyre!("Missing 'account' field in response"))?;

        Ok(AccountInfo {
            account_number: account_field(account, "account_number"),
            sequence: account_field(account, "sequence"),
        })
    }

    fn sign_tx(&self, msgs: Vec<Any>, account: AccountInfo) -> Result<Vec<u8>> {
        let gas_limit = self.gas_per_msg.saturating_mul(msgs.len() as u64);
        let denom: Denom = self
            .gas_price
            .denom
            .parse()
            .map_err(|e| eyre!("Invalid fee denom {}: {}", self.gas_price.denom, e))?;
        let fee = Fee::from_amount_and_gas(
            Coin {
                denom,
                amount: self.gas_price.fee_for(gas_limit),
            },
            gas_limit,
        );

        let body = tx::Body::new(msgs, "", 0u32);
        let auth_info =
            SignerInfo::single_direct(Some(self.signing_key.public_key()), account.sequence)
                .auth_info(fee);

        let sign_doc = SignDoc::new(&body, &auth_info, &self.chain_id, account.account_number)
            .map_err(|e| eyre!("Failed to create sign doc: {}", e))?;

        sign_doc
            .sign(&self.signing_key)
            .map_err(|e| eyre!("Failed to sign transaction: {}", e))?
            .to_bytes()
            .map_err(|e| eyre!("Failed to serialize transaction: {}", e))
    }

    /// Sign and broadcast in SYNC mode, returning the tx hash.
    pub async fn sign_and_broadcast(&self, msgs: Vec<Any>) -> Result<String> {
        if msgs.is_empty() {
            return Err(eyre!("Refusing to broadcast an empty transaction"));
        }

        let mut cached = self.account.lock().await;
        let account = match *cached {
            Some(account) => account,
            None => self.get_account_info().await?,
        };

        let tx_bytes = self.sign_tx(msgs, account)?;
        match self.broadcast_tx(&tx_bytes).await {
            Ok(tx_hash) => {
                *cached = Some(AccountInfo {
                    sequence: account.sequence + 1,
                    ..account
                });
                Ok(tx_hash)
            }
            Err(e) => {
                // Re-read the sequence from the chain on the next attempt
                *cached = None;
                Err(e)
            }
        }
    }

    async fn broadcast_tx(&self, tx_bytes: &[u8]) -> Result<String> {
        let tx_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, tx_bytes);
        let broadcast_request = serde_json::json!({
            "tx_bytes": tx_b64,
            "mode": "BROADCAST_MODE_SYNC"
        });

        let broadcast_url = format!("{}/cosmos/tx/v1beta1/txs", self.lcd_url);
        debug!(url = %broadcast_url, "Broadcasting transaction");

        let response = self
            .client
            .post(&broadcast_url)
            .json(&broadcast_request)
            .send()
            .await
            .map_err(|e| eyre!("Failed to broadcast: {}", e))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .unwrap_or_else(|_| serde_json::json!({"error": "Failed to parse response"}));

        if status.is_success() {
            if let Some(tx_response) = body.get("tx_response") {
                return parse_tx_response(tx_response).map(|r| r.tx_hash);
            }
        }

        Err(eyre!("Broadcast failed: {}", body))
    }

    /// Poll until `tx_hash` is committed.
    async fn wait_for_commit(&self, tx_hash: &str) -> Result<TxResponse> {
        let url = format!("{}/cosmos/tx/v1beta1/txs/{}", self.lcd_url, tx_hash);
        let deadline = Instant::now() + COMMIT_TIMEOUT;

        loop {
            let response = self.client.get(&url).send().await;
            match response {
                Ok(response) if response.status().is_success() => {
                    let body: Value = response.json().await?;
                    let tx_response = body
                        .get("tx_response")
                        .ok_or_else(|| eyre!("Missing 'tx_response' for {}", tx_hash))?;
                    return parse_tx_response(tx_response);
                }
                Ok(response) if response.status() == StatusCode::NOT_FOUND => {}
                Ok(response) => {
                    debug!(tx_hash, status = %response.status(), "Transaction not yet queryable");
                }
                Err(e) => debug!(tx_hash, error = %e, "Transaction lookup failed"),
            }

            if Instant::now() >= deadline {
                return Err(eyre!(
                    "Transaction {} not committed within {:?}",
                    tx_hash,
                    COMMIT_TIMEOUT
                ));
            }
            tokio::time::sleep(COMMIT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BroadcastSink for CosmosTxSink {
    fn account_address(&self) -> String {
        self.address.to_string()
    }

    async fn sync_broadcast_msgs(&self, msgs: Vec<Any>) -> Result<TxResponse> {
        let tx_hash = self.sign_and_broadcast(msgs).await?;
        let response = self.wait_for_commit(&tx_hash).await?;
        debug!(tx_hash = %response.tx_hash, height = response.height, "Transaction committed");
        Ok(response)
    }

    async fn queue_broadcast_msg(&self, msg: Any) -> Result<()> {
        self.queue
            .send(msg)
            .await
            .map_err(|_| eyre!("Broadcast queue is closed"))
    }
}

fn account_field(account: &Value, name: &str) -> u64 {
    account
        .get(name)
        .or_else(|| account.get("base_account").and_then(|b| b.get(name)))
        .and_then(|v| v.as_str())
        .unwrap_or("0")
        .parse()
        .unwrap_or(0)
}

fn parse_tx_response(tx_response: &Value) -> Result<TxResponse> {
    let code = tx_response
        .get("code")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let tx_hash = tx_response
        .get("txhash")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    if code != 0 {
        let raw_log = tx_response
            .get("raw_log")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown error");
        return Err(eyre!("Transaction {} failed (code {}): {}", tx_hash, code, raw_log));
    }

    let height = tx_response
        .get("height")
        .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_u64()))
        .unwrap_or(0);

    Ok(TxResponse { tx_hash, height })
}

/// Packs queued messages into transactions.
pub struct QueueFlusher {
    sink: Arc<CosmosTxSink>,
    rx: mpsc::Receiver<Any>,
    msgs_per_tx: usize,
    interval: Duration,
}

impl QueueFlusher {
    pub fn new(
        sink: Arc<CosmosTxSink>,
        rx: mpsc::Receiver<Any>,
        msgs_per_tx: usize,
        interval: Duration,
    ) -> Self {
        Self {
            sink,
            rx,
            msgs_per_tx: msgs_per_tx.max(1),
            interval,
        }
    }

    /// Flush on a timer, or as soon as a full transaction is waiting.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pending: Vec<Any> = Vec::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if !pending.is_empty() {
                        warn!(dropped = pending.len(), "Shutting down with unsent queued messages");
                    }
                    return Ok(());
                }
                msg = self.rx.recv() => match msg {
                    Some(msg) => {
                        pending.push(msg);
                        if pending.len() >= self.msgs_per_tx {
                            self.flush(&mut pending).await;
                        }
                    }
                    None => return Ok(()),
                },
                _ = ticker.tick() => {
                    while !pending.is_empty() {
                        self.flush(&mut pending).await;
                    }
                }
            }
        }
    }

    /// Broadcast everything currently queued, for one-shot commands.
    pub async fn drain(mut self) -> Result<Vec<String>> {
        let mut pending = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            pending.push(msg);
        }

        let mut hashes = Vec::new();
        while !pending.is_empty() {
            let n = pending.len().min(self.msgs_per_tx);
            let batch: Vec<Any> = pending.drain(..n).collect();
            hashes.push(self.sink.sign_and_broadcast(batch).await?);
        }
        Ok(hashes)
    }

    async fn flush(&self, pending: &mut Vec<Any>) {
        let n = pending.len().min(self.msgs_per_tx);
        let batch: Vec<Any> = pending.drain(..n).collect();

        match self.sink.sign_and_broadcast(batch).await {
            Ok(tx_hash) => info!(tx_hash = %tx_hash, msgs = n, "Broadcast queued messages"),
            // Confirmations are re-derived from chain state on the next signer tick
            Err(e) => error!(error = %e, msgs = n, "Failed to broadcast queued messages"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn test_config() -> CosmosConfig {
        CosmosConfig {
            lcd_url: "http://localhost:1317/".to_string(),
            tendermint_rpc: "http://localhost:26657".to_string(),
            chain_id: "umee-local".to_string(),
            mnemonic: Some(TEST_MNEMONIC.to_string()),
            private_key: None,
            account_prefix: "umee".to_string(),
            gas_prices: "0.05uumee".to_string(),
            gas_per_msg: 200_000,
            msgs_per_tx: 10,
            queue_flush_ms: 2000,
        }
    }

    #[test]
    fn test_parse_gas_price() {
        let price: GasPrice = "0.05uumee".parse().unwrap();
        assert_eq!(price.denom, "uumee");
        assert!((price.amount - 0.05).abs() < f64::EPSILON);
        assert_eq!(price.fee_for(200_000), 10_000);

        let price: GasPrice = "1stake".parse().unwrap();
        assert_eq!(price.denom, "stake");
        assert_eq!(price.fee_for(3), 3);
    }

    #[test]
    fn test_parse_gas_price_rejects_malformed() {
        assert!("0.05".parse::<GasPrice>().is_err());
        assert!("uumee".parse::<GasPrice>().is_err());
        assert!("-1uumee".parse::<GasPrice>().is_err());
    }

    #[test]
    fn test_mnemonic_derives_prefixed_address() {
        let (sink, _rx) = CosmosTxSink::new(&test_config()).unwrap();
        assert!(sink.account_address().starts_with("umee1"));
        assert_eq!(sink.lcd_url, "http://localhost:1317");
    }

    #[test]
    fn test_hex_key_loads() {
        let hex_key = "0x".to_string() + &"11".repeat(32);
        let with_prefix = signing_key_from_hex(&hex_key).unwrap();
        let without_prefix = signing_key_from_hex(&"11".repeat(32)).unwrap();
        assert_eq!(
            with_prefix.public_key().to_bytes(),
            without_prefix.public_key().to_bytes()
        );
        assert!(signing_key_from_hex("zz").is_err());
    }

    #[test]
    fn test_missing_key_is_error() {
        let mut config = test_config();
        config.mnemonic = None;
        assert!(CosmosTxSink::new(&config).is_err());
    }

    #[test]
    fn test_sign_tx_produces_bytes() {
        let (sink, _rx) = CosmosTxSink::new(&test_config()).unwrap();
        let msg = Any {
            type_url: "/peggy.v1.MsgRequestBatch".to_string(),
            value: vec![10, 3, 102, 111, 111],
        };
        let bytes = sink
            .sign_tx(
                vec![msg],
                AccountInfo {
                    account_number: 7,
                    sequence: 2,
                },
            )
            .unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_parse_tx_response() {
        let ok = json!({"txhash": "ABC", "code": 0, "height": "42"});
        assert_eq!(
            parse_tx_response(&ok).unwrap(),
            TxResponse {
                tx_hash: "ABC".to_string(),
                height: 42
            }
        );

        let failed = json!({"txhash": "DEF", "code": 5, "raw_log": "non contiguous event nonce"});
        let err = parse_tx_response(&failed).unwrap_err();
        assert!(err.to_string().contains("non contiguous event nonce"));
    }

    #[test]
    fn test_account_field_reads_base_account() {
        let vesting = json!({
            "base_account": {"account_number": "12", "sequence": "3"}
        });
        assert_eq!(account_field(&vesting, "account_number"), 12);
        assert_eq!(account_field(&vesting, "sequence"), 3);
        assert_eq!(account_field(&json!({}), "sequence"), 0);
    }

    #[tokio::test]
    async fn test_queue_hands_messages_to_receiver() {
        let (sink, mut rx) = CosmosTxSink::new(&test_config()).unwrap();
        let msg = Any {
            type_url: "/peggy.v1.MsgRequestBatch".to_string(),
            value: vec![],
        };
        sink.queue_broadcast_msg(msg.clone()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), msg);
    }
}
