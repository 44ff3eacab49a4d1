use alloy::primitives::{B256, U256};
use alloy::sol_types::SolEvent;
use eyre::{eyre, Result};
use gravity_rs::checkpoint::valset_members;
use gravity_rs::contracts::Gravity;
use gravity_rs::{encode_valset_checkpoint, Valset, ValsetUpdatedEvent};
use tracing::{debug, warn};

use super::Relayer;
use crate::cosmos::optional;
use crate::evm::LogQuery;

/// Blocks scanned per log query while walking back from the head.
pub const VALSET_SEARCH_WINDOW: u64 = 2000;

impl Relayer {
    /// Rebuild the validator set the contract currently trusts.
    ///
    /// The contract stores only the set's checkpoint, so the members come
    /// from the `ValsetUpdatedEvent` that installed the live nonce.
    pub async fn find_latest_valset(&self) -> Result<Valset> {
        let nonce = self.gravity.last_valset_nonce().await?;
        let evm = self.gravity.provider();
        let floor = self.settings.bridge_start_height;
        let mut end = evm.latest_block_number().await?;

        while end >= floor {
            let start = end.saturating_sub(VALSET_SEARCH_WINDOW - 1).max(floor);
            let logs = evm
                .filter_logs(LogQuery {
                    address: self.gravity.address(),
                    event_signature: Gravity::ValsetUpdatedEvent::SIGNATURE_HASH,
                    topic1: Some(B256::from(U256::from(nonce))),
                    from_block: start,
                    to_block: end,
                })
                .await?;

            if let Some(log) = logs.last() {
                let valset = ValsetUpdatedEvent::from_log(log)?.to_valset();
                self.cross_check_valset(&valset).await;
                return Ok(valset);
            }

            if start == 0 || start == floor {
                break;
            }
            end = start - 1;
        }

        Err(eyre!(
            "Valset update event for nonce {} not found since block {}",
            nonce,
            floor
        ))
    }

    /// Compare the rebuilt set with the Cosmos copy and the contract
    /// checkpoint. Mismatches are logged only.
    async fn cross_check_valset(&self, valset: &Valset) {
        match optional(self.cosmos.valset_at(valset.nonce).await) {
            Ok(Some(cosmos_valset)) => {
                let same_members = match (valset_members(valset), valset_members(&cosmos_valset)) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                };
                if !same_members {
                    warn!(
                        nonce = valset.nonce,
                        "Valset from Ethereum event differs from Cosmos valset"
                    );
                }
            }
            Ok(None) => debug!(nonce = valset.nonce, "Cosmos has no valset at this nonce"),
            Err(e) => debug!(nonce = valset.nonce, error = %e, "Could not fetch Cosmos valset"),
        }

        let checkpoint = async {
            let gravity_id = self.gravity_id().await?;
            let computed = encode_valset_checkpoint(gravity_id, valset)?;
            let on_chain = self.gravity.last_valset_checkpoint().await?;
            Ok::<_, eyre::Report>((computed, on_chain))
        };
        match checkpoint.await {
            Ok((computed, on_chain)) if computed != on_chain => warn!(
                nonce = valset.nonce,
                computed = %computed,
                on_chain = %on_chain,
                "Valset checkpoint does not match contract state"
            ),
            Ok(_) => {}
            Err(e) => debug!(nonce = valset.nonce, error = %e, "Could not verify valset checkpoint"),
        }
    }
}
