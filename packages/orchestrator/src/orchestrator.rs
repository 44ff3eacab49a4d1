//! The four orchestrator loops and their shared state.
//!
//! - **eth_oracle** - claims Ethereum bridge events on Cosmos
//! - **eth_signer** - confirms valsets and batches awaiting this validator
//! - **batch_requester** - asks Cosmos to batch tokens with enough fees
//! - **relayer** - submits signed valsets and batches to Ethereum
//!
//! All loops run in one [`TaskGroup`]: the first loop to fail stops the rest.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, B256};
use eyre::{eyre, Result, WrapErr};
use gravity_rs::{parse_address, parse_amount};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::cosmos::{optional, BatchFees, BroadcastClient, CosmosQueryClient, Params, QueryResult};
use crate::event_watcher::{eth_block_delay, EventWatcher};
use crate::evm::{run_pending_tx_subscription, EvmProvider, GravityContract};
use crate::group::{run_loop, TaskGroup};
use crate::price_feed::PriceFeed;
use crate::relayer::profitability::is_fee_profitable;
use crate::relayer::{Relayer, RelayerSettings};
use crate::retry::{with_retry, RetryPolicy};

/// Interval between full resyncs of the oracle's starting block.
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(48 * 60 * 60);

const ORACLE_BLOCK_MULTIPLIER: u32 = 5;
const SIGNER_BLOCK_MULTIPLIER: u32 = 3;

/// Loop timing and policy, derived from chain params and configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub oracle_interval: Duration,
    pub signer_interval: Duration,
    pub requester_interval: Duration,
    pub resync_interval: Duration,
    pub bridge_start_height: u64,
    pub blocks_per_loop: u64,
    pub claim_delay: Duration,
    pub min_batch_fee_usd: f64,
    /// Websocket endpoint feeding the pending transaction cache
    pub pending_tx_ws: Option<String>,
    pub relayer: RelayerSettings,
}

impl OrchestratorSettings {
    pub fn new(params: &Params, config: &Config) -> Self {
        let eth_block_time = params.eth_block_time();
        let cosmos_block_time = params.cosmos_block_time();
        let relayer_interval =
            eth_block_time.saturating_mul(config.relayer.relayer_loop_multiplier.max(1));
        let bridge_start_height = config
            .relayer
            .bridge_start_height
            .unwrap_or(params.bridge_contract_start_height);

        Self {
            oracle_interval: eth_block_time.saturating_mul(ORACLE_BLOCK_MULTIPLIER),
            signer_interval: cosmos_block_time.saturating_mul(SIGNER_BLOCK_MULTIPLIER),
            requester_interval: cosmos_block_time
                .saturating_mul(config.relayer.requester_loop_multiplier.max(1)),
            resync_interval: RESYNC_INTERVAL,
            bridge_start_height,
            blocks_per_loop: config.eth.blocks_per_loop,
            claim_delay: config
                .relayer
                .claim_send_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(cosmos_block_time),
            min_batch_fee_usd: config.relayer.min_batch_fee_usd,
            pending_tx_ws: config.eth.alchemy_ws.clone(),
            relayer: RelayerSettings {
                relay_valsets: config.relayer.relay_valsets,
                relay_batches: config.relayer.relay_batches,
                min_batch_fee_usd: config.relayer.min_batch_fee_usd,
                loop_duration: relayer_interval,
                relay_timeout: config
                    .relayer
                    .relay_timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(relayer_interval.saturating_mul(2)),
                bridge_start_height,
                cosmos_block_time,
            },
        }
    }
}

/// External capabilities the loops are built on.
pub struct Collaborators {
    pub cosmos: Arc<dyn CosmosQueryClient>,
    pub broadcast: Arc<BroadcastClient>,
    pub gravity: Arc<GravityContract>,
    pub price_feed: Option<Arc<dyn PriceFeed>>,
}

/// Resumable scan position of the oracle loop.
struct OracleState {
    last_checked_block: u64,
    last_resync: Instant,
}

pub struct Orchestrator {
    cosmos: Arc<dyn CosmosQueryClient>,
    broadcast: Arc<BroadcastClient>,
    gravity: Arc<GravityContract>,
    price_feed: Option<Arc<dyn PriceFeed>>,
    watcher: EventWatcher,
    relayer: Relayer,
    settings: OrchestratorSettings,
    retry: RetryPolicy,
    /// ERC20 address -> Cosmos denom. Entries are never invalidated.
    erc20_denoms: Mutex<HashMap<Address, String>>,
}

/// Query bridge params, retrying transient failures. Missing params are fatal.
pub async fn fetch_params(
    cosmos: &dyn CosmosQueryClient,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Params> {
    retry_query(retry, cancel, "params", || cosmos.params())
        .await?
        .ok_or_else(|| eyre!("Bridge params not found on Cosmos"))
}

/// Retry a Cosmos query, mapping `NotFound` to `None`.
async fn retry_query<T, F, Fut>(
    retry: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut query: F,
) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = QueryResult<T>>,
{
    with_retry(retry, cancel, label, || {
        let fut = query();
        async move { Ok(optional(fut.await)?) }
    })
    .await
}

impl Orchestrator {
    pub fn new(deps: Collaborators, settings: OrchestratorSettings, retry: RetryPolicy) -> Self {
        let watcher = EventWatcher::new(
            deps.gravity.provider().clone(),
            deps.cosmos.clone(),
            deps.broadcast.clone(),
            deps.gravity.address(),
            settings.blocks_per_loop,
            settings.claim_delay,
        );
        let relayer = Relayer::new(
            deps.cosmos.clone(),
            deps.gravity.clone(),
            deps.price_feed.clone(),
            settings.relayer.clone(),
            retry.clone(),
        );

        Self {
            cosmos: deps.cosmos,
            broadcast: deps.broadcast,
            gravity: deps.gravity,
            price_feed: deps.price_feed,
            watcher,
            relayer,
            settings,
            retry,
            erc20_denoms: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Spawn every loop into `group`.
    pub fn spawn(self: &Arc<Self>, group: &mut TaskGroup) {
        let token = group.token();

        let this = self.clone();
        let cancel = token.clone();
        group.spawn(
            "eth_oracle",
            async move { this.run_eth_oracle(&cancel).await }
                .instrument(info_span!("task", "loop" = "eth_oracle")),
        );

        let this = self.clone();
        let cancel = token.clone();
        group.spawn(
            "eth_signer",
            async move { this.run_eth_signer(&cancel).await }
                .instrument(info_span!("task", "loop" = "eth_signer")),
        );

        let this = self.clone();
        let cancel = token.clone();
        group.spawn(
            "batch_requester",
            async move { this.run_batch_requester(&cancel).await }
                .instrument(info_span!("task", "loop" = "batch_requester")),
        );

        let this = self.clone();
        let cancel = token.clone();
        group.spawn(
            "relayer",
            async move { this.relayer.start(&cancel).await }
                .instrument(info_span!("task", "loop" = "relayer")),
        );

        if let Some(ws_url) = self.settings.pending_tx_ws.clone() {
            group.spawn(
                "pending_tx_subscription",
                run_pending_tx_subscription(
                    ws_url,
                    self.gravity.address(),
                    self.gravity.pending_inputs(),
                    token,
                ),
            );
        } else {
            debug!("No websocket endpoint configured, pending transaction cache disabled");
        }
    }

    // ========================================================================
    // Ethereum Oracle
    // ========================================================================

    pub async fn run_eth_oracle(&self, cancel: &CancellationToken) -> Result<()> {
        let evm: &dyn EvmProvider = self.gravity.provider().as_ref();
        let chain_id = with_retry(&self.retry, cancel, "eth_chain_id", || evm.chain_id()).await?;
        let reorg_delay = eth_block_delay(chain_id);

        let state = Mutex::new(OracleState {
            last_checked_block: self.last_checked_block(cancel).await?,
            last_resync: Instant::now(),
        });
        info!(chain_id, reorg_delay, "Ethereum oracle starting");

        run_loop(cancel, "eth_oracle", self.settings.oracle_interval, || {
            self.oracle_tick(&state, reorg_delay, cancel)
        })
        .await
    }

    async fn oracle_tick(
        &self,
        state: &Mutex<OracleState>,
        reorg_delay: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut state = state.lock().await;

        if state.last_resync.elapsed() >= self.settings.resync_interval {
            let resynced = self.last_checked_block(cancel).await?;
            info!(
                from = state.last_checked_block,
                to = resynced,
                "Resynced last checked block"
            );
            state.last_checked_block = resynced;
            state.last_resync = Instant::now();
        }

        let from = state.last_checked_block;
        let next = with_retry(&self.retry, cancel, "check_for_events", || {
            self.watcher.check_for_events(from, reorg_delay)
        })
        .await?;
        if next != from {
            debug!(from, next, "Advanced oracle checkpoint");
        }
        state.last_checked_block = next;
        Ok(())
    }

    /// Block to resume scanning from: the height of the last event this
    /// orchestrator claimed, else the bridge start height.
    pub async fn last_checked_block(&self, cancel: &CancellationToken) -> Result<u64> {
        let orchestrator = self.broadcast.orchestrator_address();
        let last = retry_query(&self.retry, cancel, "last_event_by_addr", || {
            self.cosmos.last_event_by_addr(orchestrator.clone())
        })
        .await?
        .unwrap_or_default();

        if last.ethereum_event_height == 0 {
            Ok(self.settings.bridge_start_height)
        } else {
            Ok(last.ethereum_event_height)
        }
    }

    // ========================================================================
    // Ethereum Signer
    // ========================================================================

    pub async fn run_eth_signer(&self, cancel: &CancellationToken) -> Result<()> {
        let gravity = &self.gravity;
        let gravity_id = with_retry(&self.retry, cancel, "gravity_id", || gravity.gravity_id())
            .await
            .wrap_err("Failed to read gravity id from contract")?;

        run_loop(cancel, "eth_signer", self.settings.signer_interval, || {
            self.signer_tick(gravity_id, cancel)
        })
        .await
    }

    /// Confirm every valset and the oldest batch this validator has not signed.
    pub async fn signer_tick(&self, gravity_id: B256, cancel: &CancellationToken) -> Result<()> {
        let orchestrator = self.broadcast.orchestrator_address();

        let valsets = retry_query(&self.retry, cancel, "oldest_unsigned_valsets", || {
            self.cosmos.oldest_unsigned_valsets(orchestrator.clone())
        })
        .await?
        .unwrap_or_default();
        if valsets.is_empty() {
            debug!("No valset waiting to be signed");
        }
        for valset in &valsets {
            self.broadcast.send_valset_confirm(gravity_id, valset).await?;
        }

        let batch = retry_query(&self.retry, cancel, "oldest_unsigned_batch", || {
            self.cosmos.oldest_unsigned_batch(orchestrator.clone())
        })
        .await?;
        match batch {
            Some(batch) => self.broadcast.send_batch_confirm(gravity_id, &batch).await?,
            None => debug!("No batch waiting to be signed"),
        }
        Ok(())
    }

    // ========================================================================
    // Batch Requester
    // ========================================================================

    pub async fn run_batch_requester(&self, cancel: &CancellationToken) -> Result<()> {
        run_loop(
            cancel,
            "batch_requester",
            self.settings.requester_interval,
            || self.request_batches(cancel),
        )
        .await
    }

    /// Request a batch for every token whose unbatched fees are worth it.
    /// Per-token failures are logged and skipped.
    pub async fn request_batches(&self, cancel: &CancellationToken) -> Result<()> {
        let fees = retry_query(&self.retry, cancel, "unbatched_tokens_with_fees", || {
            self.cosmos.unbatched_tokens_with_fees()
        })
        .await?
        .unwrap_or_default();

        if fees.is_empty() {
            debug!("No unbatched tokens");
            return Ok(());
        }

        for fee in &fees {
            if let Err(e) = self.request_batch(fee).await {
                warn!(
                    token_contract = %fee.token,
                    error = %format!("{:#}", e),
                    "Failed to request batch"
                );
            }
        }
        Ok(())
    }

    async fn request_batch(&self, fee: &BatchFees) -> Result<()> {
        let token = parse_address(&fee.token)?;
        let total_fee = parse_amount(&fee.total_fees)?;

        let profitable = is_fee_profitable(
            &self.gravity,
            self.price_feed.as_deref(),
            token,
            total_fee,
            self.settings.min_batch_fee_usd,
        )
        .await;
        if !profitable {
            debug!(token_contract = %token, total_fee = %total_fee, "Unbatched fees below minimum");
            return Ok(());
        }

        let denom = self.erc20_denom(token).await?;
        self.broadcast.send_request_batch(&denom).await
    }

    /// Memoized ERC20 -> denom lookup. The lock is held across the query so
    /// concurrent misses for one token query once.
    async fn erc20_denom(&self, token: Address) -> Result<String> {
        let mut denoms = self.erc20_denoms.lock().await;
        if let Some(denom) = denoms.get(&token) {
            return Ok(denom.clone());
        }

        let mapping = self
            .cosmos
            .erc20_to_denom(token.to_checksum(None))
            .await
            .wrap_err_with(|| format!("No denom for token {}", token))?;
        debug!(token_contract = %token, denom = %mapping.denom, "Cached token denom");
        denoms.insert(token, mapping.denom.clone());
        Ok(mapping.denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::query::{MockCosmosQueryClient, QueryError};
    use crate::cosmos::sink::MockBroadcastSink;
    use crate::cosmos::{Erc20ToDenom, LastClaimEvent};
    use crate::evm::provider::MockEvmProvider;
    use crate::signer::MockEthSigner;
    use gravity_rs::{BridgeValidator, OutgoingTxBatch, Valset};

    const TOKEN_A: &str = "0x1111111111111111111111111111111111111111";
    const TOKEN_B: &str = "0x2222222222222222222222222222222222222222";

    fn params() -> Params {
        Params {
            peggy_id: "umee-peggy".to_string(),
            bridge_ethereum_address: Address::repeat_byte(0x42).to_checksum(None),
            bridge_chain_id: 5,
            bridge_contract_start_height: 1_000,
            average_block_time: 5_000,
            average_ethereum_block_time: 12_000,
        }
    }

    fn settings() -> OrchestratorSettings {
        OrchestratorSettings {
            oracle_interval: Duration::from_secs(60),
            signer_interval: Duration::from_secs(15),
            requester_interval: Duration::from_secs(300),
            resync_interval: RESYNC_INTERVAL,
            bridge_start_height: 1_000,
            blocks_per_loop: 2_000,
            claim_delay: Duration::ZERO,
            min_batch_fee_usd: 0.0,
            pending_tx_ws: None,
            relayer: RelayerSettings {
                relay_valsets: true,
                relay_batches: true,
                min_batch_fee_usd: 0.0,
                loop_duration: Duration::from_secs(36),
                relay_timeout: Duration::from_secs(72),
                bridge_start_height: 1_000,
                cosmos_block_time: Duration::from_secs(5),
            },
        }
    }

    fn signer() -> MockEthSigner {
        let mut signer = MockEthSigner::new();
        signer
            .expect_address()
            .return_const(Address::repeat_byte(0xee));
        signer
            .expect_personal_sign()
            .returning(|_, _| Ok(vec![1u8; 65]));
        signer
    }

    fn orchestrator(cosmos: MockCosmosQueryClient, mut sink: MockBroadcastSink) -> Orchestrator {
        sink.expect_account_address()
            .return_const("umee1orchestrator".to_string());
        let broadcast = Arc::new(BroadcastClient::new(
            Arc::new(sink),
            Arc::new(signer()),
            "umee",
        ));
        let gravity = Arc::new(GravityContract::new(
            Arc::new(MockEvmProvider::new()),
            Address::repeat_byte(0x42),
        ));

        Orchestrator::new(
            Collaborators {
                cosmos: Arc::new(cosmos),
                broadcast,
                gravity,
                price_feed: None,
            },
            settings(),
            RetryPolicy::default(),
        )
    }

    fn valset(nonce: u64) -> Valset {
        Valset {
            nonce,
            members: vec![BridgeValidator {
                power: 100,
                ethereum_address: Address::repeat_byte(0xee).to_checksum(None),
            }],
            height: 0,
            reward_amount: String::new(),
            reward_token: String::new(),
        }
    }

    #[test]
    fn test_settings_from_params() {
        let mut config = crate::config::tests::valid_config();
        config.relayer.relayer_loop_multiplier = 3;
        config.relayer.requester_loop_multiplier = 60;
        config.relayer.relay_timeout_secs = None;
        config.relayer.bridge_start_height = None;
        config.relayer.claim_send_delay_ms = None;

        let settings = OrchestratorSettings::new(&params(), &config);
        assert_eq!(settings.oracle_interval, Duration::from_secs(60));
        assert_eq!(settings.signer_interval, Duration::from_secs(15));
        assert_eq!(settings.requester_interval, Duration::from_secs(300));
        assert_eq!(settings.relayer.loop_duration, Duration::from_secs(36));
        assert_eq!(settings.relayer.relay_timeout, Duration::from_secs(72));
        assert_eq!(settings.bridge_start_height, 1_000);
        assert_eq!(settings.relayer.bridge_start_height, 1_000);
        assert_eq!(settings.claim_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_settings_overrides() {
        let mut config = crate::config::tests::valid_config();
        config.relayer.relay_timeout_secs = Some(600);
        config.relayer.bridge_start_height = Some(42);
        config.relayer.claim_send_delay_ms = Some(250);

        let settings = OrchestratorSettings::new(&params(), &config);
        assert_eq!(settings.relayer.relay_timeout, Duration::from_secs(600));
        assert_eq!(settings.bridge_start_height, 42);
        assert_eq!(settings.relayer.bridge_start_height, 42);
        assert_eq!(settings.claim_delay, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_fetch_params_missing_is_fatal() {
        let mut cosmos = MockCosmosQueryClient::new();
        cosmos
            .expect_params()
            .returning(|| Err(QueryError::NotFound("params".to_string())));

        let err = fetch_params(&cosmos, &RetryPolicy::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("params not found"));
    }

    #[tokio::test]
    async fn test_last_checked_block_from_last_claim() {
        let mut cosmos = MockCosmosQueryClient::new();
        cosmos.expect_last_event_by_addr().returning(|addr| {
            assert_eq!(addr, "umee1orchestrator");
            Ok(LastClaimEvent {
                ethereum_event_nonce: 7,
                ethereum_event_height: 4_321,
            })
        });
        let orch = orchestrator(cosmos, MockBroadcastSink::new());

        let block = orch.last_checked_block(&CancellationToken::new()).await.unwrap();
        assert_eq!(block, 4_321);
    }

    #[tokio::test]
    async fn test_last_checked_block_falls_back_to_start_height() {
        let mut cosmos = MockCosmosQueryClient::new();
        cosmos
            .expect_last_event_by_addr()
            .returning(|_| Err(QueryError::NotFound("no claims".to_string())));
        let orch = orchestrator(cosmos, MockBroadcastSink::new());

        let block = orch.last_checked_block(&CancellationToken::new()).await.unwrap();
        assert_eq!(block, 1_000);
    }

    #[tokio::test]
    async fn test_signer_confirms_valsets_and_batch() {
        let mut cosmos = MockCosmosQueryClient::new();
        cosmos
            .expect_oldest_unsigned_valsets()
            .returning(|_| Ok(vec![valset(3), valset(4)]));
        cosmos.expect_oldest_unsigned_batch().returning(|_| {
            Ok(OutgoingTxBatch {
                batch_nonce: 9,
                batch_timeout: 1_000,
                transactions: vec![],
                token_contract: TOKEN_A.to_string(),
                block: 0,
            })
        });

        let mut sink = MockBroadcastSink::new();
        sink.expect_queue_broadcast_msg()
            .times(3)
            .returning(|_| Ok(()));
        let orch = orchestrator(cosmos, sink);

        orch.signer_tick(B256::ZERO, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_signer_nothing_to_sign() {
        let mut cosmos = MockCosmosQueryClient::new();
        cosmos
            .expect_oldest_unsigned_valsets()
            .returning(|_| Err(QueryError::NotFound("valsets".to_string())));
        cosmos
            .expect_oldest_unsigned_batch()
            .returning(|_| Err(QueryError::NotFound("batch".to_string())));

        let mut sink = MockBroadcastSink::new();
        sink.expect_queue_broadcast_msg().never();
        let orch = orchestrator(cosmos, sink);

        orch.signer_tick(B256::ZERO, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_batch_requester_skips_failing_token() {
        let mut cosmos = MockCosmosQueryClient::new();
        cosmos.expect_unbatched_tokens_with_fees().returning(|| {
            Ok(vec![
                BatchFees {
                    token: TOKEN_A.to_string(),
                    total_fees: "100".to_string(),
                },
                BatchFees {
                    token: TOKEN_B.to_string(),
                    total_fees: "200".to_string(),
                },
            ])
        });
        cosmos.expect_erc20_to_denom().returning(|token| {
            if token.eq_ignore_ascii_case(TOKEN_A) {
                Err(QueryError::NotFound(token))
            } else {
                Ok(Erc20ToDenom {
                    denom: "peggy0x2222".to_string(),
                    cosmos_originated: false,
                })
            }
        });

        let mut sink = MockBroadcastSink::new();
        sink.expect_queue_broadcast_msg()
            .times(1)
            .returning(|_| Ok(()));
        let orch = orchestrator(cosmos, sink);

        orch.request_batches(&CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_denom_lookup_is_memoized() {
        let mut cosmos = MockCosmosQueryClient::new();
        cosmos.expect_unbatched_tokens_with_fees().returning(|| {
            Ok(vec![BatchFees {
                token: TOKEN_B.to_string(),
                total_fees: "200".to_string(),
            }])
        });
        cosmos.expect_erc20_to_denom().times(1).returning(|_| {
            Ok(Erc20ToDenom {
                denom: "peggy0x2222".to_string(),
                cosmos_originated: false,
            })
        });

        let mut sink = MockBroadcastSink::new();
        sink.expect_queue_broadcast_msg()
            .times(2)
            .returning(|_| Ok(()));
        let orch = orchestrator(cosmos, sink);

        let cancel = CancellationToken::new();
        orch.request_batches(&cancel).await.unwrap();
        orch.request_batches(&cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_unbatched_tokens() {
        let mut cosmos = MockCosmosQueryClient::new();
        cosmos
            .expect_unbatched_tokens_with_fees()
            .returning(|| Ok(vec![]));
        cosmos.expect_erc20_to_denom().never();
        let orch = orchestrator(cosmos, MockBroadcastSink::new());

        orch.request_batches(&CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_requester_stops_on_cancel() {
        let orch = orchestrator(MockCosmosQueryClient::new(), MockBroadcastSink::new());

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(orch.run_batch_requester(&cancel).await.is_ok());
    }
}
