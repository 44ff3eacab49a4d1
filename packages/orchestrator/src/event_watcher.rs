//! Turns EVM block ranges into Cosmos claims.
//!
//! Each pass scans `[from, safe]` for the four Gravity event kinds, drops
//! everything the Cosmos chain has already attested to, and hands the rest to
//! the broadcast client in event nonce order. Progress is only reported after
//! the whole pass succeeds, so a failed pass is simply rescanned.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use eyre::Result;
use gravity_rs::contracts::Gravity;
use gravity_rs::{
    filter_by_nonce, merge_sorted, BridgeEvent, DepositEvent, Erc20DeployedEvent, GravityError,
    ValsetUpdatedEvent, WithdrawEvent,
};
use tracing::{debug, info, warn};

use crate::cosmos::{optional, BroadcastClient, CosmosQueryClient};
use crate::evm::{EvmProvider, LogQuery};
use crate::retry::is_unknown_block_err;

/// Range narrowing attempts after an unknown-block error.
const MAX_RANGE_NARROWINGS: u32 = 3;

/// Blocks to stay behind the head before trusting logs, by EVM chain id.
pub fn eth_block_delay(chain_id: u64) -> u64 {
    match chain_id {
        // Mainnet and proof-of-work testnets
        1 | 3 | 6 | 7 => 6,
        // Instant finality dev chains
        2018 | 15 | 31337 => 0,
        // Rinkeby and Goerli
        4 | 5 => 10,
        _ => 6,
    }
}

type LogParser = fn(&Log) -> Result<BridgeEvent, GravityError>;

pub struct EventWatcher {
    evm: Arc<dyn EvmProvider>,
    cosmos: Arc<dyn CosmosQueryClient>,
    broadcast: Arc<BroadcastClient>,
    gravity_address: Address,
    blocks_per_loop: u64,
    claim_delay: Duration,
}

impl EventWatcher {
    pub fn new(
        evm: Arc<dyn EvmProvider>,
        cosmos: Arc<dyn CosmosQueryClient>,
        broadcast: Arc<BroadcastClient>,
        gravity_address: Address,
        blocks_per_loop: u64,
        claim_delay: Duration,
    ) -> Self {
        Self {
            evm,
            cosmos,
            broadcast,
            gravity_address,
            blocks_per_loop: blocks_per_loop.max(1),
            claim_delay,
        }
    }

    /// Claim every new event from `from_block` up to the safe head and
    /// return the block to resume from.
    pub async fn check_for_events(&self, from_block: u64, reorg_delay: u64) -> Result<u64> {
        let latest = self.evm.latest_block_number().await?;
        let safe = latest.saturating_sub(reorg_delay);
        if latest < reorg_delay || safe < from_block {
            debug!(from_block, latest, reorg_delay, "No safe blocks to scan");
            return Ok(from_block);
        }

        let mut to_block = safe.min(from_block.saturating_add(self.blocks_per_loop));
        let mut narrowings = 0;
        let events = loop {
            match self.fetch_events(from_block, to_block).await {
                Ok(events) => break events,
                Err(err)
                    if narrowings < MAX_RANGE_NARROWINGS
                        && is_unknown_block_err(&format!("{:#}", err)) =>
                {
                    narrowings += 1;
                    let head = self
                        .evm
                        .latest_block_number()
                        .await?
                        .saturating_sub(reorg_delay);
                    if head < from_block {
                        return Ok(from_block);
                    }
                    let end = to_block.min(head);
                    to_block = from_block + (end - from_block) / 2;
                    warn!(
                        from_block,
                        to_block,
                        attempt = narrowings,
                        error = %err,
                        "Unknown block in log range, narrowing"
                    );
                }
                Err(err) => return Err(err),
            }
        };

        let last_claim = optional(
            self.cosmos
                .last_event_by_addr(self.broadcast.orchestrator_address())
                .await,
        )?
        .unwrap_or_default();
        let last_nonce = last_claim.ethereum_event_nonce;
        let events = filter_by_nonce(events, last_nonce);

        if !events.is_empty() {
            info!(
                count = events.len(),
                from_block,
                to_block,
                last_event_nonce = last_nonce,
                "Found new bridge events"
            );
            self.broadcast
                .send_ethereum_claims(events, last_nonce, self.claim_delay)
                .await?;
        }

        Ok(to_block + 1)
    }

    /// All four event kinds in `[from_block, to_block]`, merged by nonce.
    async fn fetch_events(&self, from_block: u64, to_block: u64) -> Result<Vec<BridgeEvent>> {
        let (deposits, withdraws, valsets, deployed) = tokio::try_join!(
            self.fetch_kind::<Gravity::SendToCosmosEvent>(from_block, to_block, |log| {
                DepositEvent::from_log(log).map(BridgeEvent::Deposit)
            }),
            self.fetch_kind::<Gravity::TransactionBatchExecutedEvent>(from_block, to_block, |log| {
                WithdrawEvent::from_log(log).map(BridgeEvent::Withdraw)
            }),
            self.fetch_kind::<Gravity::ValsetUpdatedEvent>(from_block, to_block, |log| {
                ValsetUpdatedEvent::from_log(log).map(BridgeEvent::ValsetUpdated)
            }),
            self.fetch_kind::<Gravity::ERC20DeployedEvent>(from_block, to_block, |log| {
                Erc20DeployedEvent::from_log(log).map(BridgeEvent::Erc20Deployed)
            }),
        )?;

        Ok(merge_sorted(vec![deposits, withdraws, valsets, deployed]))
    }

    async fn fetch_kind<E: SolEvent>(
        &self,
        from_block: u64,
        to_block: u64,
        parse: LogParser,
    ) -> Result<Vec<BridgeEvent>> {
        let logs = self
            .evm
            .filter_logs(LogQuery {
                address: self.gravity_address,
                event_signature: E::SIGNATURE_HASH,
                topic1: None,
                from_block,
                to_block,
            })
            .await?;

        logs.iter()
            .map(|log| parse(log).map_err(eyre::Report::from))
            .collect()
    }
}
