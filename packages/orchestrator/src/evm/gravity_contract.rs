//! Gravity contract client: state views, call encoding and transaction
//! submission.

use std::sync::Arc;
use std::time::Duration;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use eyre::{eyre, Result, WrapErr};
use gravity_rs::checkpoint::{batch_transfers, valset_members};
use gravity_rs::contracts::{Gravity, ValsetArgs, ERC20};
use gravity_rs::hash::{parse_address, parse_amount, parse_optional_address};
use gravity_rs::{check_and_repack, BatchConfirm, OutgoingTxBatch, Valset, ValsetConfirm};
use tracing::{debug, info};

use super::pending::SharedPendingInputs;
use super::provider::EvmProvider;

/// Gas settings applied on top of the node's estimates.
#[derive(Debug, Clone, Copy)]
pub struct GasAdjustments {
    pub price: f64,
    pub limit: f64,
}

impl Default for GasAdjustments {
    fn default() -> Self {
        Self {
            price: 1.3,
            limit: 1.2,
        }
    }
}

/// Client for one deployed Gravity contract.
pub struct GravityContract {
    provider: Arc<dyn EvmProvider>,
    address: Address,
    wallet: Option<(Address, EthereumWallet)>,
    gas: GasAdjustments,
    pending: SharedPendingInputs,
    pending_wait: Duration,
}

impl GravityContract {
    /// Read-only client; `send_tx` fails until a wallet is attached.
    pub fn new(provider: Arc<dyn EvmProvider>, address: Address) -> Self {
        Self {
            provider,
            address,
            wallet: None,
            gas: GasAdjustments::default(),
            pending: SharedPendingInputs::default(),
            pending_wait: Duration::from_secs(60),
        }
    }

    pub fn with_wallet(mut self, from: Address, wallet: EthereumWallet) -> Self {
        self.wallet = Some((from, wallet));
        self
    }

    pub fn with_gas_adjustments(mut self, gas: GasAdjustments) -> Self {
        self.gas = gas;
        self
    }

    pub fn with_pending_inputs(mut self, pending: SharedPendingInputs, wait: Duration) -> Self {
        self.pending = pending;
        self.pending_wait = wait;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn provider(&self) -> &Arc<dyn EvmProvider> {
        &self.provider
    }

    pub fn pending_inputs(&self) -> SharedPendingInputs {
        self.pending.clone()
    }

    async fn view<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return> {
        let output = self.provider.call(to, call.abi_encode().into()).await?;
        C::abi_decode_returns(&output, true)
            .map_err(|e| eyre!("Failed to decode {} result: {}", C::SIGNATURE, e))
    }

    // ========================================================================
    // State Views
    // ========================================================================

    pub async fn last_valset_nonce(&self) -> Result<u64> {
        let nonce = self
            .view(self.address, Gravity::state_lastValsetNonceCall {})
            .await?
            ._0;
        u256_to_u64(nonce, "valset nonce")
    }

    pub async fn last_valset_checkpoint(&self) -> Result<B256> {
        Ok(self
            .view(self.address, Gravity::state_lastValsetCheckpointCall {})
            .await?
            ._0)
    }

    pub async fn last_batch_nonce(&self, token: Address) -> Result<u64> {
        let nonce = self
            .view(
                self.address,
                Gravity::state_lastBatchNoncesCall {
                    erc20Address: token,
                },
            )
            .await?
            ._0;
        u256_to_u64(nonce, "batch nonce")
    }

    pub async fn last_event_nonce(&self) -> Result<u64> {
        let nonce = self
            .view(self.address, Gravity::state_lastEventNonceCall {})
            .await?
            ._0;
        u256_to_u64(nonce, "event nonce")
    }

    /// The contract's domain separator (`state_peggyId`).
    pub async fn gravity_id(&self) -> Result<B256> {
        Ok(self
            .view(self.address, Gravity::state_peggyIdCall {})
            .await?
            ._0)
    }

    pub async fn erc20_decimals(&self, token: Address) -> Result<u8> {
        Ok(self.view(token, ERC20::decimalsCall {}).await?._0)
    }

    // ========================================================================
    // Call Encoding
    // ========================================================================

    /// Calldata for `updateValset(new, current, v, r, s)`.
    pub fn encode_valset_update(
        &self,
        new_valset: &Valset,
        current: &Valset,
        confirms: &[ValsetConfirm],
    ) -> Result<Bytes> {
        let sigs = check_and_repack(current, confirms)?;
        let call = Gravity::updateValsetCall {
            _newValset: valset_args(new_valset)?,
            _currentValset: valset_args(current)?,
            _v: sigs.v,
            _r: sigs.r,
            _s: sigs.s,
        };
        Ok(call.abi_encode().into())
    }

    /// Calldata for `submitBatch`, signed by `current`.
    pub fn encode_transaction_batch(
        &self,
        current: &Valset,
        batch: &OutgoingTxBatch,
        confirms: &[BatchConfirm],
    ) -> Result<Bytes> {
        let sigs = check_and_repack(current, confirms)?;
        let (amounts, destinations, fees) = batch_transfers(batch)?;
        let call = Gravity::submitBatchCall {
            _currentValset: valset_args(current)?,
            _v: sigs.v,
            _r: sigs.r,
            _s: sigs.s,
            _amounts: amounts,
            _destinations: destinations,
            _fees: fees,
            _batchNonce: U256::from(batch.batch_nonce),
            _tokenContract: parse_address(&batch.token_contract)?,
            _batchTimeout: U256::from(batch.batch_timeout),
        };
        Ok(call.abi_encode().into())
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Whether an identical call is already sitting in the mempool.
    pub async fn is_pending_tx_input(&self, data: &[u8]) -> bool {
        self.pending.read().await.is_pending(data, self.pending_wait)
    }

    /// Sign and broadcast a legacy transaction calling the contract.
    pub async fn send_tx(&self, data: Bytes) -> Result<B256> {
        let (from, wallet) = self
            .wallet
            .as_ref()
            .ok_or_else(|| eyre!("No Ethereum signer configured"))?;

        let request = TransactionRequest::default()
            .from(*from)
            .to(self.address)
            .input(data.into());

        let estimated = self
            .provider
            .estimate_gas(request.clone())
            .await
            .wrap_err("Gas estimation failed")?;
        let gas_limit = (estimated as f64 * self.gas.limit).ceil() as u64;
        let gas_price = (self.provider.suggest_gas_price().await? as f64 * self.gas.price) as u128;
        let nonce = self.provider.pending_nonce(*from).await?;
        let chain_id = self.provider.chain_id().await?;

        debug!(
            from = %from,
            nonce,
            gas_limit,
            gas_price,
            "Signing Gravity transaction"
        );

        let envelope = request
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(chain_id)
            .build(wallet)
            .await
            .map_err(|e| eyre!("Failed to sign transaction: {}", e))?;

        let tx_hash = self
            .provider
            .send_raw_transaction(envelope.encoded_2718().into())
            .await?;

        info!(tx_hash = %tx_hash, nonce, "Sent Gravity transaction");
        Ok(tx_hash)
    }
}

fn valset_args(valset: &Valset) -> Result<ValsetArgs> {
    let (validators, powers) = valset_members(valset)?;
    Ok(ValsetArgs {
        validators,
        powers,
        valsetNonce: U256::from(valset.nonce),
        rewardAmount: parse_amount(&valset.reward_amount)?,
        rewardToken: parse_optional_address(&valset.reward_token)?,
    })
}

fn u256_to_u64(value: U256, what: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| eyre!("{} {} does not fit in u64", what, value))
}
