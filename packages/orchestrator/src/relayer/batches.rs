use std::collections::BTreeMap;
use std::time::Duration;

use alloy::primitives::Address;
use eyre::{Result, WrapErr};
use futures::future::try_join_all;
use gravity_rs::{check_and_repack, parse_address, OutgoingTxBatch, Valset};
use tracing::{debug, info};

use super::profitability::is_fee_profitable;
use super::Relayer;
use crate::cosmos::optional;

impl Relayer {
    /// Relay at most one batch per token. Tokens proceed concurrently; the
    /// batches of one token are walked oldest first.
    pub async fn relay_batches(&self, current: &Valset) -> Result<()> {
        let batches = optional(self.cosmos.latest_batches().await)?.unwrap_or_default();
        if batches.is_empty() {
            debug!("No outgoing batches");
            return Ok(());
        }

        let mut by_token: BTreeMap<Address, Vec<OutgoingTxBatch>> = BTreeMap::new();
        for batch in batches {
            let token = parse_address(&batch.token_contract)?;
            by_token.entry(token).or_default().push(batch);
        }

        let eth_height = self.gravity.provider().latest_block_number().await?;
        try_join_all(
            by_token
                .into_iter()
                .map(|(token, batches)| self.relay_token_batches(token, batches, current, eth_height)),
        )
        .await?;
        Ok(())
    }

    async fn relay_token_batches(
        &self,
        token: Address,
        mut batches: Vec<OutgoingTxBatch>,
        current: &Valset,
        eth_height: u64,
    ) -> Result<()> {
        batches.sort_by_key(|b| b.batch_nonce);
        let on_chain = self.gravity.last_batch_nonce(token).await?;
        let last_sent = self.last_sent_batch_nonce(token);

        for batch in batches {
            let nonce = batch.batch_nonce;
            if batch.batch_timeout <= eth_height {
                debug!(nonce, token_contract = %token, timeout = batch.batch_timeout, eth_height, "Batch timed out");
                continue;
            }
            if nonce <= on_chain {
                continue;
            }
            if last_sent.is_some_and(|sent| nonce <= sent) {
                debug!(nonce, token_contract = %token, "Batch already submitted by this relayer");
                continue;
            }

            let confirms = optional(
                self.cosmos
                    .batch_confirms(nonce, batch.token_contract.clone())
                    .await,
            )?
            .unwrap_or_default();
            if confirms.is_empty() {
                continue;
            }
            match check_and_repack(current, &confirms) {
                Ok(_) => {}
                Err(e) if e.is_expected() => {
                    debug!(nonce, token_contract = %token, reason = %e, "Skipping batch");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            if !self.batch_worth_relaying(token, &batch).await? {
                continue;
            }

            if self.gravity.last_batch_nonce(token).await? >= nonce {
                info!(nonce, token_contract = %token, "Batch already relayed");
                return Ok(());
            }

            let data = self
                .gravity
                .encode_transaction_batch(current, &batch, &confirms)?;
            if self.gravity.is_pending_tx_input(&data).await {
                info!(nonce, token_contract = %token, "Batch already pending in mempool");
                return Ok(());
            }

            match self.gravity.send_tx(data).await {
                Ok(tx_hash) => {
                    self.record_sent_batch(token, nonce);
                    info!(nonce, token_contract = %token, tx_hash = %tx_hash, "Relayed batch");
                }
                Err(e) => {
                    if self.gravity.last_batch_nonce(token).await? < nonce {
                        return Err(e).wrap_err_with(|| {
                            format!("Failed to relay batch {} for {}", nonce, token)
                        });
                    }
                    info!(nonce, token_contract = %token, error = %e, "Batch relayed by another orchestrator");
                }
            }
            return Ok(());
        }

        Ok(())
    }

    /// Profitable, or unprofitable but older than the relay timeout.
    async fn batch_worth_relaying(&self, token: Address, batch: &OutgoingTxBatch) -> Result<bool> {
        let total_fee = batch.total_fee()?;
        let profitable = is_fee_profitable(
            &self.gravity,
            self.price_feed.as_deref(),
            token,
            total_fee,
            self.settings.min_batch_fee_usd,
        )
        .await;
        if profitable {
            return Ok(true);
        }

        let age = self.batch_age(batch).await?;
        if age > self.settings.relay_timeout {
            info!(
                nonce = batch.batch_nonce,
                token_contract = %token,
                ?age,
                "Relay timeout elapsed, relaying unprofitable batch"
            );
            return Ok(true);
        }

        info!(
            nonce = batch.batch_nonce,
            token_contract = %token,
            total_fee = %total_fee,
            "Batch not profitable yet"
        );
        Ok(false)
    }

    async fn batch_age(&self, batch: &OutgoingTxBatch) -> Result<Duration> {
        let height = self.cosmos.latest_block_height().await?;
        let blocks = height.saturating_sub(batch.block);
        Ok(self
            .settings
            .cosmos_block_time
            .saturating_mul(u32::try_from(blocks).unwrap_or(u32::MAX)))
    }
}
