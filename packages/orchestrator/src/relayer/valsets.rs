use eyre::{Result, WrapErr};
use gravity_rs::{check_and_repack, Valset, ValsetConfirm};
use tracing::{debug, info};

use super::Relayer;
use crate::cosmos::optional;

impl Relayer {
    /// Submit the newest Cosmos valset whose confirmations pass the
    /// threshold against `current`, the set live on the contract.
    pub async fn relay_valsets(&self, current: &Valset) -> Result<()> {
        let mut latest = optional(self.cosmos.latest_valsets().await)?.unwrap_or_default();
        latest.sort_by(|a, b| b.nonce.cmp(&a.nonce));

        let mut chosen: Option<(Valset, Vec<ValsetConfirm>)> = None;
        for valset in latest {
            if valset.nonce <= current.nonce {
                break;
            }
            let confirms =
                optional(self.cosmos.all_valset_confirms(valset.nonce).await)?.unwrap_or_default();
            if confirms.is_empty() {
                debug!(nonce = valset.nonce, "No confirmations for valset yet");
                continue;
            }

            match check_and_repack(current, &confirms) {
                Ok(sigs) => {
                    debug!(
                        nonce = valset.nonce,
                        percent_signed = sigs.percent_signed(),
                        "Valset has enough signatures"
                    );
                    chosen = Some((valset, confirms));
                    break;
                }
                Err(e) if e.is_expected() => {
                    debug!(nonce = valset.nonce, reason = %e, "Skipping valset");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let Some((valset, confirms)) = chosen else {
            debug!(current_nonce = current.nonce, "No valset ready to relay");
            return Ok(());
        };

        let on_chain = self.gravity.last_valset_nonce().await?;
        if valset.nonce <= on_chain {
            info!(nonce = valset.nonce, on_chain, "Valset already relayed");
            return Ok(());
        }
        if valset.nonce <= self.last_sent_valset_nonce() {
            debug!(nonce = valset.nonce, on_chain, "Valset update already submitted by this relayer");
            return Ok(());
        }

        let data = self
            .gravity
            .encode_valset_update(&valset, current, &confirms)?;
        if self.gravity.is_pending_tx_input(&data).await {
            info!(nonce = valset.nonce, "Valset update already pending in mempool");
            return Ok(());
        }

        match self.gravity.send_tx(data).await {
            Ok(tx_hash) => {
                self.record_sent_valset(valset.nonce);
                info!(nonce = valset.nonce, tx_hash = %tx_hash, "Relayed valset update");
                Ok(())
            }
            Err(e) => {
                if self.gravity.last_valset_nonce().await? >= valset.nonce {
                    info!(nonce = valset.nonce, error = %e, "Valset relayed by another orchestrator");
                    return Ok(());
                }
                Err(e).wrap_err_with(|| format!("Failed to relay valset update {}", valset.nonce))
            }
        }
    }
}
