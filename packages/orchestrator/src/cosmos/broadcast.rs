//! Domain-level Cosmos broadcasting: confirmations, claims and user
//! messages for the `peggy` module.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use cosmrs::Any;
use eyre::{eyre, Result, WrapErr};
use gravity_rs::hash::cosmos_receiver_from_bytes32;
use gravity_rs::msgs::{
    self, GravityMsg, MsgConfirmBatch, MsgDepositClaim, MsgERC20DeployedClaim, MsgRequestBatch,
    MsgSendToEth, MsgSetOrchestratorAddresses, MsgValsetConfirm, MsgValsetUpdatedClaim,
    MsgWithdrawClaim,
};
use gravity_rs::{
    encode_batch_checkpoint, encode_valset_checkpoint, filter_by_nonce, merge_sorted,
    BridgeEvent, OutgoingTxBatch, Valset,
};
use tracing::{debug, info};

use super::sink::{BroadcastSink, TxResponse};
use crate::signer::EthSigner;

/// Translates bridge work into `peggy` messages for one orchestrator.
pub struct BroadcastClient {
    sink: Arc<dyn BroadcastSink>,
    signer: Arc<dyn EthSigner>,
    account_prefix: String,
}

impl BroadcastClient {
    pub fn new(
        sink: Arc<dyn BroadcastSink>,
        signer: Arc<dyn EthSigner>,
        account_prefix: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            signer,
            account_prefix: account_prefix.into(),
        }
    }

    /// Bech32 address of the orchestrator account.
    pub fn orchestrator_address(&self) -> String {
        self.sink.account_address()
    }

    pub fn eth_address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_checkpoint(&self, checkpoint: B256) -> Result<String> {
        let signature = self
            .signer
            .personal_sign(self.signer.address(), checkpoint)
            .await?;
        Ok(hex::encode(signature))
    }

    /// Sign `valset`'s checkpoint and queue the confirmation.
    pub async fn send_valset_confirm(&self, gravity_id: B256, valset: &Valset) -> Result<()> {
        let checkpoint = encode_valset_checkpoint(gravity_id, valset)?;
        let msg = MsgValsetConfirm {
            nonce: valset.nonce,
            orchestrator: self.orchestrator_address(),
            eth_address: self.eth_address().to_checksum(None),
            signature: self.sign_checkpoint(checkpoint).await?,
        };

        self.sink.queue_broadcast_msg(msg.to_any()).await?;
        info!(nonce = valset.nonce, "Queued valset confirmation");
        Ok(())
    }

    /// Sign `batch`'s checkpoint and queue the confirmation.
    pub async fn send_batch_confirm(
        &self,
        gravity_id: B256,
        batch: &OutgoingTxBatch,
    ) -> Result<()> {
        let checkpoint = encode_batch_checkpoint(gravity_id, batch)?;
        let msg = MsgConfirmBatch {
            nonce: batch.batch_nonce,
            token_contract: batch.token_contract.clone(),
            eth_signer: self.eth_address().to_checksum(None),
            orchestrator: self.orchestrator_address(),
            signature: self.sign_checkpoint(checkpoint).await?,
        };

        self.sink.queue_broadcast_msg(msg.to_any()).await?;
        info!(
            nonce = batch.batch_nonce,
            token_contract = %batch.token_contract,
            "Queued batch confirmation"
        );
        Ok(())
    }

    /// Attest to `events` newer than `last_claim_nonce`, one transaction per
    /// claim, in ascending event nonce order.
    ///
    /// Each claim is committed before the next is sent. The first failure
    /// stops the run; claims already committed stay committed.
    pub async fn send_ethereum_claims(
        &self,
        events: Vec<BridgeEvent>,
        last_claim_nonce: u64,
        delay: Duration,
    ) -> Result<usize> {
        let events = merge_sorted(vec![filter_by_nonce(events, last_claim_nonce)]);

        for (i, event) in events.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let msg = self.claim_msg(event)?;
            let response = self
                .sink
                .sync_broadcast_msgs(vec![msg])
                .await
                .wrap_err_with(|| {
                    format!(
                        "Failed to send {} claim for event nonce {}",
                        event.kind(),
                        event.event_nonce()
                    )
                })?;

            info!(
                event_nonce = event.event_nonce(),
                kind = event.kind(),
                tx_hash = %response.tx_hash,
                "Sent Ethereum claim"
            );
        }

        Ok(events.len())
    }

    fn claim_msg(&self, event: &BridgeEvent) -> Result<Any> {
        let orchestrator = self.orchestrator_address();
        let any = match event {
            BridgeEvent::Deposit(e) => MsgDepositClaim {
                event_nonce: e.event_nonce,
                block_height: e.block_height,
                token_contract: e.token_contract.to_checksum(None),
                amount: e.amount.to_string(),
                ethereum_sender: e.sender.to_checksum(None),
                cosmos_receiver: cosmos_receiver_from_bytes32(&e.destination.0, &self.account_prefix)?,
                orchestrator,
            }
            .to_any(),
            BridgeEvent::Withdraw(e) => MsgWithdrawClaim {
                event_nonce: e.event_nonce,
                block_height: e.block_height,
                batch_nonce: e.batch_nonce,
                token_contract: e.token_contract.to_checksum(None),
                orchestrator,
            }
            .to_any(),
            BridgeEvent::ValsetUpdated(e) => MsgValsetUpdatedClaim {
                event_nonce: e.event_nonce,
                valset_nonce: e.valset_nonce,
                block_height: e.block_height,
                members: e
                    .validators
                    .iter()
                    .zip(&e.powers)
                    .map(|(addr, power)| msgs::BridgeValidator {
                        power: *power,
                        ethereum_address: addr.to_checksum(None),
                    })
                    .collect(),
                reward_amount: e.reward_amount.to_string(),
                reward_token: e.reward_token.to_checksum(None),
                orchestrator,
            }
            .to_any(),
            BridgeEvent::Erc20Deployed(e) => MsgERC20DeployedClaim {
                event_nonce: e.event_nonce,
                block_height: e.block_height,
                cosmos_denom: e.cosmos_denom.clone(),
                token_contract: e.token_contract.to_checksum(None),
                name: e.name.clone(),
                symbol: e.symbol.clone(),
                decimals: e.decimals as u64,
                orchestrator,
            }
            .to_any(),
        };
        Ok(any)
    }

    /// Queue a transfer of `amount` to `destination` on the EVM chain.
    pub async fn send_to_eth(
        &self,
        destination: Address,
        amount: msgs::Coin,
        fee: msgs::Coin,
    ) -> Result<()> {
        debug!(destination = %destination, amount = %amount.amount, denom = %amount.denom, "Queueing send to Ethereum");
        let msg = MsgSendToEth {
            sender: self.orchestrator_address(),
            eth_dest: destination.to_checksum(None),
            amount: Some(amount),
            bridge_fee: Some(fee),
        };
        self.sink.queue_broadcast_msg(msg.to_any()).await
    }

    /// Queue a request that the chain build a batch for `denom`.
    pub async fn send_request_batch(&self, denom: &str) -> Result<()> {
        let msg = MsgRequestBatch {
            orchestrator: self.orchestrator_address(),
            denom: denom.to_string(),
        };
        self.sink.queue_broadcast_msg(msg.to_any()).await?;
        info!(denom, "Requested batch");
        Ok(())
    }

    /// Bind this orchestrator account and Ethereum key to `validator`.
    pub async fn update_orchestrator_addresses(&self, validator: &str) -> Result<TxResponse> {
        let msg = MsgSetOrchestratorAddresses {
            sender: validator.to_string(),
            orchestrator: self.orchestrator_address(),
            eth_address: self.eth_address().to_checksum(None),
        };
        let response = self.sink.sync_broadcast_msgs(vec![msg.to_any()]).await?;
        info!(
            tx_hash = %response.tx_hash,
            eth_address = %self.eth_address(),
            "Registered orchestrator addresses"
        );
        Ok(response)
    }
}

/// Parse a coin such as `1000uumee`.
pub fn parse_coin(s: &str) -> Result<msgs::Coin> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| eyre!("Coin {:?} has no denom", s))?;
    let (amount, denom) = s.split_at(split);
    if amount.is_empty() {
        return Err(eyre!("Coin {:?} has no amount", s));
    }
    Ok(msgs::Coin {
        denom: denom.to_string(),
        amount: amount.to_string(),
    })
}
