use eyre::{eyre, Result, WrapErr};
use gravity_rs::redact::Redacted;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::endpoint_pool::parse_rpc_urls;
use crate::retry::RetryPolicy;

/// Main configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct Config {
    pub eth: EthConfig,
    pub cosmos: CosmosConfig,
    pub relayer: RelayerConfig,
    pub retry: RetrySettings,
    pub log_format: LogFormat,
}

/// EVM side configuration
#[derive(Clone)]
pub struct EthConfig {
    /// RPC endpoints, tried round-robin when the current one fails
    pub rpc_urls: Vec<String>,
    pub private_key: String,
    pub gravity_address: String,
    /// Websocket endpoint for the pending-transaction subscription
    pub alchemy_ws: Option<String>,
    pub gas_price_adjustment: f64,
    pub gas_limit_adjustment: f64,
    pub blocks_per_loop: u64,
    pub pending_tx_wait_secs: u64,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for EthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthConfig")
            .field("rpc_urls", &self.rpc_urls)
            .field("private_key", &Redacted(&self.private_key))
            .field("gravity_address", &self.gravity_address)
            .field("alchemy_ws", &self.alchemy_ws)
            .field("gas_price_adjustment", &self.gas_price_adjustment)
            .field("gas_limit_adjustment", &self.gas_limit_adjustment)
            .field("blocks_per_loop", &self.blocks_per_loop)
            .field("pending_tx_wait_secs", &self.pending_tx_wait_secs)
            .finish()
    }
}

impl EthConfig {
    pub fn pending_tx_wait(&self) -> Duration {
        Duration::from_secs(self.pending_tx_wait_secs)
    }
}

/// Cosmos side configuration
#[derive(Clone)]
pub struct CosmosConfig {
    pub lcd_url: String,
    pub tendermint_rpc: String,
    pub chain_id: String,
    pub mnemonic: Option<String>,
    /// Hex secp256k1 key, used when no mnemonic is given
    pub private_key: Option<String>,
    pub account_prefix: String,
    pub gas_prices: String,
    pub gas_per_msg: u64,
    pub msgs_per_tx: usize,
    pub queue_flush_ms: u64,
}

/// Custom Debug that redacts key material.
impl fmt::Debug for CosmosConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosmosConfig")
            .field("lcd_url", &self.lcd_url)
            .field("tendermint_rpc", &self.tendermint_rpc)
            .field("chain_id", &self.chain_id)
            .field("mnemonic", &self.mnemonic.as_ref().map(Redacted))
            .field("private_key", &self.private_key.as_ref().map(Redacted))
            .field("account_prefix", &self.account_prefix)
            .field("gas_prices", &self.gas_prices)
            .field("gas_per_msg", &self.gas_per_msg)
            .field("msgs_per_tx", &self.msgs_per_tx)
            .field("queue_flush_ms", &self.queue_flush_ms)
            .finish()
    }
}

/// Relaying and batch-requesting policy
#[derive(Debug, Clone)]
pub struct RelayerConfig {
    pub relay_valsets: bool,
    pub relay_batches: bool,
    /// Minimum batch fee in USD; 0 relays everything
    pub min_batch_fee_usd: f64,
    pub coingecko_api: String,
    pub relayer_loop_multiplier: u32,
    pub requester_loop_multiplier: u32,
    /// Age after which an unprofitable batch is relayed anyway
    pub relay_timeout_secs: Option<u64>,
    pub bridge_start_height: Option<u64>,
    pub claim_send_delay_ms: Option<u64>,
}

/// Retry configuration for chain queries
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            ..RetryPolicy::default()
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Default functions
fn default_tendermint_rpc() -> String {
    "http://localhost:26657".to_string()
}

fn default_account_prefix() -> String {
    "umee".to_string()
}

fn default_gas_prices() -> String {
    "0.05uumee".to_string()
}

fn default_gas_per_msg() -> u64 {
    200_000
}

fn default_msgs_per_tx() -> usize {
    10
}

fn default_queue_flush_ms() -> u64 {
    2000
}

fn default_gas_price_adjustment() -> f64 {
    1.3
}

fn default_gas_limit_adjustment() -> f64 {
    1.2
}

fn default_blocks_per_loop() -> u64 {
    2000
}

fn default_pending_tx_wait_secs() -> u64 {
    60
}

fn default_coingecko_api() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_relayer_loop_multiplier() -> u32 {
    3
}

fn default_requester_loop_multiplier() -> u32 {
    60
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_initial_backoff_ms() -> u64 {
    500
}

fn default_retry_max_backoff_ms() -> u64 {
    30_000
}

fn optional<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| eyre!("{} environment variable is required", name))
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        let rpc_urls = parse_rpc_urls(&required("ETH_RPC_URL")?);
        if rpc_urls.is_empty() {
            return Err(eyre!("ETH_RPC_URL cannot be empty"));
        }

        let eth = EthConfig {
            rpc_urls,
            private_key: required("ETH_PRIVATE_KEY")?,
            gravity_address: required("GRAVITY_CONTRACT_ADDRESS")?,
            alchemy_ws: env::var("ETH_ALCHEMY_WS").ok().filter(|v| !v.trim().is_empty()),
            gas_price_adjustment: optional("ETH_GAS_PRICE_ADJUSTMENT")
                .unwrap_or(default_gas_price_adjustment()),
            gas_limit_adjustment: optional("ETH_GAS_LIMIT_ADJUSTMENT")
                .unwrap_or(default_gas_limit_adjustment()),
            blocks_per_loop: optional("ETH_BLOCKS_PER_LOOP").unwrap_or(default_blocks_per_loop()),
            pending_tx_wait_secs: optional("ETH_PENDING_TX_WAIT_SECS")
                .unwrap_or(default_pending_tx_wait_secs()),
        };

        let cosmos = CosmosConfig {
            lcd_url: required("COSMOS_LCD_URL")?,
            tendermint_rpc: env::var("COSMOS_TENDERMINT_RPC")
                .unwrap_or_else(|_| default_tendermint_rpc()),
            chain_id: required("COSMOS_CHAIN_ID")?,
            mnemonic: env::var("COSMOS_MNEMONIC").ok().filter(|v| !v.trim().is_empty()),
            private_key: env::var("COSMOS_PRIVATE_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            account_prefix: env::var("COSMOS_ACCOUNT_PREFIX")
                .unwrap_or_else(|_| default_account_prefix()),
            gas_prices: env::var("COSMOS_GAS_PRICES").unwrap_or_else(|_| default_gas_prices()),
            gas_per_msg: optional("COSMOS_GAS_PER_MSG").unwrap_or(default_gas_per_msg()),
            msgs_per_tx: optional("COSMOS_MSGS_PER_TX").unwrap_or(default_msgs_per_tx()),
            queue_flush_ms: optional("COSMOS_QUEUE_FLUSH_MS").unwrap_or(default_queue_flush_ms()),
        };

        let relayer = RelayerConfig {
            relay_valsets: optional("RELAY_VALSETS").unwrap_or(true),
            relay_batches: optional("RELAY_BATCHES").unwrap_or(true),
            min_batch_fee_usd: optional("MIN_BATCH_FEE_USD").unwrap_or(0.0),
            coingecko_api: env::var("COINGECKO_API").unwrap_or_else(|_| default_coingecko_api()),
            relayer_loop_multiplier: optional("RELAYER_LOOP_MULTIPLIER")
                .unwrap_or(default_relayer_loop_multiplier()),
            requester_loop_multiplier: optional("REQUESTER_LOOP_MULTIPLIER")
                .unwrap_or(default_requester_loop_multiplier()),
            relay_timeout_secs: optional("RELAY_TIMEOUT_SECS"),
            bridge_start_height: optional("BRIDGE_START_HEIGHT"),
            claim_send_delay_ms: optional("CLAIM_SEND_DELAY_MS"),
        };

        let retry = RetrySettings {
            attempts: optional("RETRY_ATTEMPTS").unwrap_or(default_retry_attempts()),
            initial_backoff_ms: optional("RETRY_INITIAL_BACKOFF_MS")
                .unwrap_or(default_retry_initial_backoff_ms()),
            max_backoff_ms: optional("RETRY_MAX_BACKOFF_MS")
                .unwrap_or(default_retry_max_backoff_ms()),
        };

        let config = Config {
            eth,
            cosmos,
            relayer,
            retry,
            log_format: LogFormat::parse(&env::var("LOG_FORMAT").unwrap_or_default()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.eth.rpc_urls.is_empty() {
            return Err(eyre!("eth.rpc_urls cannot be empty"));
        }

        if !is_hex_with_prefix(&self.eth.gravity_address, 40) {
            return Err(eyre!(
                "eth.gravity_address must be a valid hex address (42 chars with 0x prefix)"
            ));
        }

        if !is_hex_with_prefix(&self.eth.private_key, 64) {
            return Err(eyre!("eth.private_key must be 66 chars (0x + 64 hex chars)"));
        }

        if self.eth.gas_price_adjustment < 1.0 || self.eth.gas_limit_adjustment < 1.0 {
            return Err(eyre!("eth gas adjustments must be >= 1.0"));
        }

        if self.eth.blocks_per_loop == 0 {
            return Err(eyre!("eth.blocks_per_loop must be positive"));
        }

        if self.cosmos.lcd_url.is_empty() {
            return Err(eyre!("cosmos.lcd_url cannot be empty"));
        }

        if self.cosmos.chain_id.is_empty() {
            return Err(eyre!("cosmos.chain_id cannot be empty"));
        }

        match (&self.cosmos.mnemonic, &self.cosmos.private_key) {
            (Some(mnemonic), _) => {
                if mnemonic.split_whitespace().count() < 12 {
                    return Err(eyre!("cosmos.mnemonic must have at least 12 words"));
                }
            }
            (None, Some(key)) => {
                let raw = key.strip_prefix("0x").unwrap_or(key);
                if raw.len() != 64 || hex::decode(raw).is_err() {
                    return Err(eyre!("cosmos.private_key must be 64 hex chars"));
                }
            }
            (None, None) => {
                return Err(eyre!(
                    "COSMOS_MNEMONIC or COSMOS_PRIVATE_KEY environment variable is required"
                ));
            }
        }

        if self.cosmos.msgs_per_tx == 0 {
            return Err(eyre!("cosmos.msgs_per_tx must be positive"));
        }

        let min_fee = self.relayer.min_batch_fee_usd;
        if min_fee.is_nan() || min_fee < 0.0 {
            return Err(eyre!("relayer.min_batch_fee_usd cannot be negative"));
        }

        if self.relayer.relayer_loop_multiplier == 0 || self.relayer.requester_loop_multiplier == 0
        {
            return Err(eyre!("loop multipliers must be positive"));
        }

        Ok(())
    }

    /// Log a warning for every plain-http endpoint that is not on this host.
    pub fn warn_insecure_endpoints(&self) {
        let endpoints = self
            .eth
            .rpc_urls
            .iter()
            .chain(std::iter::once(&self.cosmos.lcd_url))
            .chain(std::iter::once(&self.cosmos.tendermint_rpc))
            .chain(self.eth.alchemy_ws.iter());

        for endpoint in endpoints {
            if is_insecure_remote(endpoint) {
                warn!(endpoint = %endpoint, "Unencrypted endpoint on a remote host");
            }
        }
    }
}

fn is_hex_with_prefix(value: &str, hex_len: usize) -> bool {
    match value.strip_prefix("0x") {
        Some(raw) => raw.len() == hex_len && raw.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// `http://` or `ws://` to anything other than a loopback host.
pub fn is_insecure_remote(endpoint: &str) -> bool {
    let Ok(parsed) = url::Url::parse(endpoint) else {
        return false;
    };
    if parsed.scheme() != "http" && parsed.scheme() != "ws" {
        return false;
    }
    !matches!(
        parsed.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]") | Some("0.0.0.0")
    )
}
