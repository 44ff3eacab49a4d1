//! Batch fee profitability.
//!
//! A fee total is worth relaying when its USD value exceeds the configured
//! minimum. Any failure to price the fee counts as unprofitable.

use std::str::FromStr;

use alloy::primitives::{Address, U256};
use bigdecimal::BigDecimal;
use tracing::{debug, warn};

use crate::evm::GravityContract;
use crate::price_feed::PriceFeed;

/// USD value of `total_fee` base units of a token with `decimals` decimals.
pub fn fee_in_usd(total_fee: U256, decimals: u8, usd_price: f64) -> Option<BigDecimal> {
    if !usd_price.is_finite() {
        return None;
    }
    let amount = BigDecimal::from_str(&format!("{}e-{}", total_fee, decimals)).ok()?;
    let price = BigDecimal::from_str(&usd_price.to_string()).ok()?;
    Some(amount * price)
}

/// Whether `total_fee` of `token` clears `min_fee_usd`.
///
/// Always true when no minimum or no price feed is configured.
pub async fn is_fee_profitable(
    gravity: &GravityContract,
    price_feed: Option<&dyn PriceFeed>,
    token: Address,
    total_fee: U256,
    min_fee_usd: f64,
) -> bool {
    if min_fee_usd <= 0.0 {
        return true;
    }
    let Some(price_feed) = price_feed else {
        return true;
    };

    let decimals = match gravity.erc20_decimals(token).await {
        Ok(decimals) => decimals,
        Err(e) => {
            warn!(token_contract = %token, error = %e, "Failed to read token decimals");
            return false;
        }
    };
    let price = match price_feed.query_usd_price(token).await {
        Ok(price) => price,
        Err(e) => {
            warn!(token_contract = %token, error = %e, "Failed to price token");
            return false;
        }
    };

    let Some(value) = fee_in_usd(total_fee, decimals, price) else {
        return false;
    };
    let Ok(min) = BigDecimal::from_str(&min_fee_usd.to_string()) else {
        return false;
    };

    debug!(
        token_contract = %token,
        fee_usd = %value,
        min_fee_usd,
        "Checked fee profitability"
    );
    value > min
}
