//! Relays signed validator set updates and transaction batches to the
//! Gravity contract.
//!
//! Every tick rebuilds the contract's current validator set, then relays
//! valsets and batches concurrently against it. Each submission re-reads the
//! on-chain nonce first, skips nonces this relayer already sent and consults
//! the mempool cache, so racing relayers cost at most a failed gas estimate.

mod batches;
mod find_valset;
pub mod profitability;
mod valsets;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, B256};
use eyre::Result;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::cosmos::CosmosQueryClient;
use crate::evm::GravityContract;
use crate::group::run_loop;
use crate::price_feed::PriceFeed;
use crate::retry::{with_retry, RetryPolicy};

pub use find_valset::VALSET_SEARCH_WINDOW;

#[derive(Debug, Clone)]
pub struct RelayerSettings {
    pub relay_valsets: bool,
    pub relay_batches: bool,
    /// 0 disables the profitability check
    pub min_batch_fee_usd: f64,
    pub loop_duration: Duration,
    /// Age after which an unprofitable batch is relayed anyway
    pub relay_timeout: Duration,
    /// Lowest block searched for valset update events
    pub bridge_start_height: u64,
    pub cosmos_block_time: Duration,
}

pub struct Relayer {
    cosmos: Arc<dyn CosmosQueryClient>,
    gravity: Arc<GravityContract>,
    price_feed: Option<Arc<dyn PriceFeed>>,
    settings: RelayerSettings,
    retry: RetryPolicy,
    gravity_id: OnceCell<B256>,
    /// 0 until the first valset update is sent
    last_sent_valset_nonce: AtomicU64,
    last_sent_batch_nonce: Mutex<HashMap<Address, u64>>,
}

impl Relayer {
    pub fn new(
        cosmos: Arc<dyn CosmosQueryClient>,
        gravity: Arc<GravityContract>,
        price_feed: Option<Arc<dyn PriceFeed>>,
        settings: RelayerSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cosmos,
            gravity,
            price_feed,
            settings,
            retry,
            gravity_id: OnceCell::new(),
            last_sent_valset_nonce: AtomicU64::new(0),
            last_sent_batch_nonce: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &RelayerSettings {
        &self.settings
    }

    /// Run the relay loop until cancelled or a tick fails after retries.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<()> {
        run_loop(cancel, "relayer", self.settings.loop_duration, || {
            self.tick(cancel)
        })
        .await
    }

    async fn tick(&self, cancel: &CancellationToken) -> Result<()> {
        with_retry(&self.retry, cancel, "relay", || self.relay_once()).await
    }

    /// One relay pass: valsets and batches against the live valset.
    pub async fn relay_once(&self) -> Result<()> {
        let current = self.find_latest_valset().await?;

        let valsets = async {
            if self.settings.relay_valsets {
                self.relay_valsets(&current).await
            } else {
                Ok(())
            }
        };
        let batches = async {
            if self.settings.relay_batches {
                self.relay_batches(&current).await
            } else {
                Ok(())
            }
        };
        tokio::try_join!(valsets, batches)?;
        Ok(())
    }

    async fn gravity_id(&self) -> Result<B256> {
        self.gravity_id
            .get_or_try_init(|| self.gravity.gravity_id())
            .await
            .copied()
    }

    fn last_sent_valset_nonce(&self) -> u64 {
        self.last_sent_valset_nonce.load(Ordering::SeqCst)
    }

    fn record_sent_valset(&self, nonce: u64) {
        self.last_sent_valset_nonce.fetch_max(nonce, Ordering::SeqCst);
    }

    fn last_sent_batch_nonce(&self, token: Address) -> Option<u64> {
        self.last_sent_batch_nonce
            .lock()
            .ok()
            .and_then(|sent| sent.get(&token).copied())
    }

    fn record_sent_batch(&self, token: Address, nonce: u64) {
        if let Ok(mut sent) = self.last_sent_batch_nonce.lock() {
            let entry = sent.entry(token).or_insert(nonce);
            *entry = (*entry).max(nonce);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::query::{MockCosmosQueryClient, QueryError};
    use crate::evm::provider::MockEvmProvider;
    use crate::evm::SharedPendingInputs;
    use crate::price_feed::MockPriceFeed;
    use alloy::network::EthereumWallet;
    use alloy::primitives::{Bytes, Log as PrimitiveLog, U256};
    use alloy::rpc::types::Log;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;
    use alloy::sol_types::{SolCall, SolEvent};
    use eyre::eyre;
    use gravity_rs::contracts::{Gravity, ERC20};
    use gravity_rs::{
        encode_batch_checkpoint, encode_valset_checkpoint, BatchConfirm, BridgeValidator,
        Erc20Token, OutgoingTransferTx, OutgoingTxBatch, Valset, ValsetConfirm,
    };
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;

    const TOKEN: Address = Address::repeat_byte(0x70);

    struct Validators {
        keys: Vec<PrivateKeySigner>,
    }

    impl Validators {
        fn new(n: usize) -> Self {
            Self {
                keys: (1..=n)
                    .map(|i| format!("0x{:064x}", i).parse().unwrap())
                    .collect(),
            }
        }

        fn valset(&self, nonce: u64) -> Valset {
            Valset {
                nonce,
                members: self
                    .keys
                    .iter()
                    .map(|k| BridgeValidator {
                        power: 1000,
                        ethereum_address: k.address().to_checksum(None),
                    })
                    .collect(),
                height: 0,
                reward_amount: String::new(),
                reward_token: String::new(),
            }
        }

        fn sign(&self, signers: usize, checkpoint: B256) -> Vec<(String, String)> {
            self.keys[..signers]
                .iter()
                .map(|k| {
                    let sig = k.sign_message_sync(checkpoint.as_slice()).unwrap();
                    (k.address().to_checksum(None), hex::encode(sig.as_bytes()))
                })
                .collect()
        }

        fn valset_confirms(&self, signers: usize, valset: &Valset) -> Vec<ValsetConfirm> {
            let checkpoint = encode_valset_checkpoint(B256::ZERO, valset).unwrap();
            self.sign(signers, checkpoint)
                .into_iter()
                .map(|(eth_address, signature)| ValsetConfirm {
                    nonce: valset.nonce,
                    orchestrator: "umee1orch".to_string(),
                    eth_address,
                    signature,
                })
                .collect()
        }

        fn batch_confirms(&self, signers: usize, batch: &OutgoingTxBatch) -> Vec<BatchConfirm> {
            let checkpoint = encode_batch_checkpoint(B256::ZERO, batch).unwrap();
            self.sign(signers, checkpoint)
                .into_iter()
                .map(|(eth_signer, signature)| BatchConfirm {
                    nonce: batch.batch_nonce,
                    token_contract: batch.token_contract.clone(),
                    eth_signer,
                    orchestrator: "umee1orch".to_string(),
                    signature,
                })
                .collect()
        }
    }

    fn batch(nonce: u64, timeout: u64, block: u64) -> OutgoingTxBatch {
        let token = TOKEN.to_checksum(None);
        OutgoingTxBatch {
            batch_nonce: nonce,
            batch_timeout: timeout,
            transactions: vec![OutgoingTransferTx {
                id: nonce,
                sender: "umee1sender".to_string(),
                dest_address: Address::repeat_byte(0x0d).to_checksum(None),
                erc20_token: Erc20Token {
                    contract: token.clone(),
                    amount: "1000".to_string(),
                },
                erc20_fee: Erc20Token {
                    contract: token.clone(),
                    amount: "10".to_string(),
                },
            }],
            token_contract: token,
            block,
        }
    }

    fn word(value: u64) -> Bytes {
        Bytes::from(U256::from(value).to_be_bytes::<32>().to_vec())
    }

    #[derive(Clone, Copy)]
    enum Sends {
        Accept,
        Reject,
        /// Reject, but another relayer's transaction has advanced the nonces
        LoseRace,
    }

    /// EVM mock answering contract views from shared state and counting
    /// submitted transactions.
    struct Chain {
        valset_nonce: Arc<AtomicU64>,
        batch_nonce: Arc<AtomicU64>,
        sent: Arc<AtomicU64>,
        sends: Sends,
    }

    impl Chain {
        fn new(valset_nonce: u64, batch_nonce: u64) -> Self {
            Self {
                valset_nonce: Arc::new(AtomicU64::new(valset_nonce)),
                batch_nonce: Arc::new(AtomicU64::new(batch_nonce)),
                sent: Arc::new(AtomicU64::new(0)),
                sends: Sends::Accept,
            }
        }

        fn with_sends(mut self, sends: Sends) -> Self {
            self.sends = sends;
            self
        }

        fn provider(&self, live: Valset, eth_height: u64) -> MockEvmProvider {
            let mut evm = MockEvmProvider::new();
            let valset_nonce = self.valset_nonce.clone();
            let batch_nonce = self.batch_nonce.clone();
            let checkpoint = encode_valset_checkpoint(B256::ZERO, &live).unwrap();

            evm.expect_call().returning(move |_, data| {
                let selector: [u8; 4] = data[..4].try_into().unwrap();
                Ok(match selector {
                    Gravity::state_lastValsetNonceCall::SELECTOR => {
                        word(valset_nonce.load(Ordering::SeqCst))
                    }
                    Gravity::state_lastBatchNoncesCall::SELECTOR => {
                        word(batch_nonce.load(Ordering::SeqCst))
                    }
                    Gravity::state_lastValsetCheckpointCall::SELECTOR => {
                        Bytes::from(checkpoint.to_vec())
                    }
                    Gravity::state_peggyIdCall::SELECTOR => Bytes::from(B256::ZERO.to_vec()),
                    ERC20::decimalsCall::SELECTOR => word(18),
                    other => panic!("unexpected call {:?}", other),
                })
            });
            evm.expect_latest_block_number()
                .returning(move || Ok(eth_height));
            evm.expect_filter_logs().returning(move |query| {
                let event = Gravity::ValsetUpdatedEvent {
                    _newValsetNonce: U256::from(live.nonce),
                    _eventNonce: U256::from(1),
                    _rewardAmount: U256::ZERO,
                    _rewardToken: Address::ZERO,
                    _validators: live
                        .members
                        .iter()
                        .map(|m| m.ethereum_address.parse().unwrap())
                        .collect(),
                    _powers: live.members.iter().map(|m| U256::from(m.power)).collect(),
                };
                let block = 10;
                if query.from_block > block || query.to_block < block {
                    return Ok(vec![]);
                }
                Ok(vec![Log {
                    inner: PrimitiveLog {
                        address: query.address,
                        data: event.encode_log_data(),
                    },
                    block_number: Some(block),
                    ..Default::default()
                }])
            });
            evm.expect_estimate_gas().returning(|_| Ok(300_000));
            evm.expect_suggest_gas_price().returning(|| Ok(1_000_000_000));
            evm.expect_pending_nonce().returning(|_| Ok(0));
            evm.expect_chain_id().returning(|| Ok(1));

            let sent = self.sent.clone();
            let sends = self.sends;
            let (valset_nonce, batch_nonce) = (self.valset_nonce.clone(), self.batch_nonce.clone());
            evm.expect_send_raw_transaction().returning(move |_| {
                sent.fetch_add(1, Ordering::SeqCst);
                match sends {
                    Sends::Accept => Ok(B256::repeat_byte(0xaa)),
                    Sends::Reject => Err(eyre!("connection refused")),
                    Sends::LoseRace => {
                        valset_nonce.store(100, Ordering::SeqCst);
                        batch_nonce.store(100, Ordering::SeqCst);
                        Err(eyre!("nonce too low"))
                    }
                }
            });
            evm
        }

        fn sent(&self) -> u64 {
            self.sent.load(Ordering::SeqCst)
        }
    }

    fn settings() -> RelayerSettings {
        RelayerSettings {
            relay_valsets: true,
            relay_batches: true,
            min_batch_fee_usd: 0.0,
            loop_duration: Duration::from_secs(36),
            relay_timeout: Duration::from_secs(72),
            bridge_start_height: 0,
            cosmos_block_time: Duration::from_secs(5),
        }
    }

    fn relayer(
        evm: MockEvmProvider,
        cosmos: MockCosmosQueryClient,
        price_feed: Option<MockPriceFeed>,
        settings: RelayerSettings,
        pending: SharedPendingInputs,
    ) -> Relayer {
        let key: PrivateKeySigner = format!("0x{:064x}", 0xabcu32).parse().unwrap();
        let gravity = GravityContract::new(Arc::new(evm), Address::repeat_byte(0x42))
            .with_wallet(key.address(), EthereumWallet::from(key))
            .with_pending_inputs(pending, Duration::from_secs(60));
        Relayer::new(
            Arc::new(cosmos),
            Arc::new(gravity),
            price_feed.map(|f| Arc::new(f) as Arc<dyn PriceFeed>),
            settings,
            RetryPolicy::default(),
        )
    }

    fn cosmos_without_batches() -> MockCosmosQueryClient {
        let mut cosmos = MockCosmosQueryClient::new();
        cosmos
            .expect_latest_batches()
            .returning(|| Err(QueryError::NotFound("batches".to_string())));
        cosmos
            .expect_valset_at()
            .returning(|_| Err(QueryError::NotFound("valset".to_string())));
        cosmos
    }

    #[tokio::test]
    async fn test_find_latest_valset_walks_back_windows() {
        let validators = Validators::new(3);
        let live = validators.valset(4);
        let chain = Chain::new(4, 0);
        let relayer = relayer(
            chain.provider(live.clone(), 5_000),
            cosmos_without_batches(),
            None,
            settings(),
            SharedPendingInputs::default(),
        );

        let found = relayer.find_latest_valset().await.unwrap();
        assert_eq!(found.nonce, 4);
        assert_eq!(found.members, live.members);
    }

    #[tokio::test]
    async fn test_find_latest_valset_respects_start_height() {
        let validators = Validators::new(1);
        let chain = Chain::new(1, 0);
        let mut settings = settings();
        settings.bridge_start_height = 100;
        let relayer = relayer(
            chain.provider(validators.valset(1), 5_000),
            cosmos_without_batches(),
            None,
            settings,
            SharedPendingInputs::default(),
        );

        assert!(relayer.find_latest_valset().await.is_err());
    }

    #[tokio::test]
    async fn test_relays_newest_signed_valset() {
        let validators = Validators::new(3);
        let live = validators.valset(1);
        let signed = validators.valset(2);
        let unsigned = validators.valset(3);
        let confirms = validators.valset_confirms(3, &signed);

        let mut cosmos = cosmos_without_batches();
        let (s2, s3) = (signed.clone(), unsigned.clone());
        cosmos
            .expect_latest_valsets()
            .returning(move || Ok(vec![s3.clone(), s2.clone()]));
        cosmos.expect_all_valset_confirms().returning(move |nonce| {
            if nonce == 2 {
                Ok(confirms.clone())
            } else {
                Ok(vec![])
            }
        });

        let chain = Chain::new(1, 0);
        let relayer = relayer(
            chain.provider(live, 100),
            cosmos,
            None,
            settings(),
            SharedPendingInputs::default(),
        );
        relayer.relay_once().await.unwrap();
        assert_eq!(chain.sent(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_valset_signatures_not_relayed() {
        let validators = Validators::new(3);
        let live = validators.valset(1);
        let next = validators.valset(2);
        let confirms = validators.valset_confirms(1, &next);

        let mut cosmos = cosmos_without_batches();
        cosmos
            .expect_latest_valsets()
            .returning(move || Ok(vec![next.clone()]));
        cosmos
            .expect_all_valset_confirms()
            .returning(move |_| Ok(confirms.clone()));

        let chain = Chain::new(1, 0);
        let relayer = relayer(
            chain.provider(live, 100),
            cosmos,
            None,
            settings(),
            SharedPendingInputs::default(),
        );
        relayer.relay_once().await.unwrap();
        assert_eq!(chain.sent(), 0);
    }

    #[tokio::test]
    async fn test_pending_valset_update_not_resent() {
        let validators = Validators::new(3);
        let live = validators.valset(1);
        let next = validators.valset(2);
        let confirms = validators.valset_confirms(3, &next);

        let data = GravityContract::new(Arc::new(MockEvmProvider::new()), Address::ZERO)
            .encode_valset_update(&next, &live, &confirms)
            .unwrap();
        let pending = SharedPendingInputs::default();
        pending.write().await.add_if_relevant(data, Instant::now());

        let mut cosmos = cosmos_without_batches();
        cosmos
            .expect_latest_valsets()
            .returning(move || Ok(vec![next.clone()]));
        cosmos
            .expect_all_valset_confirms()
            .returning(move |_| Ok(confirms.clone()));

        let chain = Chain::new(1, 0);
        let relayer = relayer(chain.provider(live, 100), cosmos, None, settings(), pending);
        relayer.relay_once().await.unwrap();
        assert_eq!(chain.sent(), 0);
    }

    fn next_valset_relayer(chain: &Chain) -> Relayer {
        let validators = Validators::new(3);
        let live = validators.valset(1);
        let next = validators.valset(2);
        let confirms = validators.valset_confirms(3, &next);

        let mut cosmos = cosmos_without_batches();
        cosmos
            .expect_latest_valsets()
            .returning(move || Ok(vec![next.clone()]));
        cosmos
            .expect_all_valset_confirms()
            .returning(move |_| Ok(confirms.clone()));

        relayer(
            chain.provider(live, 100),
            cosmos,
            None,
            settings(),
            SharedPendingInputs::default(),
        )
    }

    #[tokio::test]
    async fn test_valset_sent_once_while_on_chain_nonce_lags() {
        let chain = Chain::new(1, 0);
        let relayer = next_valset_relayer(&chain);

        for _ in 0..3 {
            relayer.relay_once().await.unwrap();
        }
        assert_eq!(chain.sent(), 1);
        assert_eq!(relayer.last_sent_valset_nonce(), 2);
    }

    #[tokio::test]
    async fn test_failed_valset_send_is_error() {
        let chain = Chain::new(1, 0).with_sends(Sends::Reject);
        let relayer = next_valset_relayer(&chain);

        let err = relayer.relay_once().await.unwrap_err();
        assert!(format!("{:#}", err).contains("connection refused"));
        assert_eq!(relayer.last_sent_valset_nonce(), 0);

        // Not recorded as sent, so the next pass tries again
        assert!(relayer.relay_once().await.is_err());
        assert_eq!(chain.sent(), 2);
    }

    #[tokio::test]
    async fn test_lost_valset_race_is_not_error() {
        let chain = Chain::new(1, 0).with_sends(Sends::LoseRace);
        let relayer = next_valset_relayer(&chain);

        relayer.relay_once().await.unwrap();
        assert_eq!(chain.sent(), 1);
    }

    fn batch_relayer(
        chain: &Chain,
        validators: &Validators,
        batches: Vec<OutgoingTxBatch>,
        cosmos_height: u64,
        price_feed: Option<MockPriceFeed>,
        settings: RelayerSettings,
    ) -> Relayer {
        let live = validators.valset(1);
        let confirms: HashMap<u64, Vec<BatchConfirm>> = batches
            .iter()
            .map(|b| (b.batch_nonce, validators.batch_confirms(3, b)))
            .collect();

        let mut cosmos = MockCosmosQueryClient::new();
        cosmos
            .expect_valset_at()
            .returning(|_| Err(QueryError::NotFound("valset".to_string())));
        cosmos.expect_latest_valsets().returning(|| Ok(vec![]));
        cosmos
            .expect_latest_batches()
            .returning(move || Ok(batches.clone()));
        cosmos
            .expect_batch_confirms()
            .returning(move |nonce, _| Ok(confirms.get(&nonce).cloned().unwrap_or_default()));
        cosmos
            .expect_latest_block_height()
            .returning(move || Ok(cosmos_height));

        relayer(
            chain.provider(live, 100),
            cosmos,
            price_feed,
            settings,
            SharedPendingInputs::default(),
        )
    }

    #[tokio::test]
    async fn test_timed_out_batch_skipped() {
        let validators = Validators::new(3);
        let chain = Chain::new(1, 0);
        let relayer = batch_relayer(
            &chain,
            &validators,
            vec![batch(1, 50, 0)],
            10,
            None,
            settings(),
        );

        relayer.relay_once().await.unwrap();
        assert_eq!(chain.sent(), 0);
    }

    #[tokio::test]
    async fn test_relays_oldest_live_batch_once() {
        let validators = Validators::new(3);
        let chain = Chain::new(1, 0);
        let relayer = batch_relayer(
            &chain,
            &validators,
            vec![batch(3, 500, 0), batch(1, 50, 0), batch(2, 500, 0)],
            10,
            None,
            settings(),
        );

        relayer.relay_once().await.unwrap();
        assert_eq!(chain.sent(), 1);
        assert_eq!(relayer.last_sent_batch_nonce(TOKEN), Some(2));

        // On-chain nonce has not caught up; the next pass moves on to nonce 3
        relayer.relay_once().await.unwrap();
        assert_eq!(chain.sent(), 2);
        assert_eq!(relayer.last_sent_batch_nonce(TOKEN), Some(3));

        relayer.relay_once().await.unwrap();
        assert_eq!(chain.sent(), 2);
    }

    #[tokio::test]
    async fn test_superseded_batch_skipped() {
        let validators = Validators::new(3);
        let chain = Chain::new(1, 5);
        let relayer = batch_relayer(
            &chain,
            &validators,
            vec![batch(5, 500, 0)],
            10,
            None,
            settings(),
        );

        relayer.relay_once().await.unwrap();
        assert_eq!(chain.sent(), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_send_is_error() {
        let validators = Validators::new(3);
        let chain = Chain::new(1, 0).with_sends(Sends::Reject);
        let relayer = batch_relayer(
            &chain,
            &validators,
            vec![batch(1, 500, 0)],
            10,
            None,
            settings(),
        );

        let err = relayer.relay_once().await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to relay batch 1"));
        assert_eq!(relayer.last_sent_batch_nonce(TOKEN), None);
    }

    #[tokio::test]
    async fn test_lost_batch_race_is_not_error() {
        let validators = Validators::new(3);
        let chain = Chain::new(1, 0).with_sends(Sends::LoseRace);
        let relayer = batch_relayer(
            &chain,
            &validators,
            vec![batch(1, 500, 0)],
            10,
            None,
            settings(),
        );

        relayer.relay_once().await.unwrap();
        assert_eq!(chain.sent(), 1);
    }

    fn failing_price_feed() -> MockPriceFeed {
        let mut feed = MockPriceFeed::new();
        feed.expect_query_usd_price()
            .returning(|_| Err(eyre!("price unavailable")));
        feed
    }

    #[tokio::test]
    async fn test_unprofitable_batch_waits_for_timeout() {
        let validators = Validators::new(3);
        let chain = Chain::new(1, 0);
        let mut settings = settings();
        settings.min_batch_fee_usd = 10.0;

        // 2 blocks * 5s is well inside the 72s relay timeout
        let relayer = batch_relayer(
            &chain,
            &validators,
            vec![batch(1, 500, 8)],
            10,
            Some(failing_price_feed()),
            settings,
        );

        relayer.relay_once().await.unwrap();
        assert_eq!(chain.sent(), 0);
    }

    #[tokio::test]
    async fn test_unprofitable_batch_relayed_after_timeout() {
        let validators = Validators::new(3);
        let chain = Chain::new(1, 0);
        let mut settings = settings();
        settings.min_batch_fee_usd = 10.0;

        // 100 blocks * 5s exceeds the 72s relay timeout
        let relayer = batch_relayer(
            &chain,
            &validators,
            vec![batch(1, 500, 0)],
            100,
            Some(failing_price_feed()),
            settings,
        );

        relayer.relay_once().await.unwrap();
        assert_eq!(chain.sent(), 1);
    }

    #[tokio::test]
    async fn test_disabled_relaying_sends_nothing() {
        let validators = Validators::new(3);
        let chain = Chain::new(1, 0);
        let mut settings = settings();
        settings.relay_batches = false;
        settings.relay_valsets = false;

        let relayer = batch_relayer(
            &chain,
            &validators,
            vec![batch(1, 500, 0)],
            10,
            None,
            settings,
        );

        relayer.relay_once().await.unwrap();
        assert_eq!(chain.sent(), 0);
    }
}
