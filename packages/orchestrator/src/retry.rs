//! Retry with backoff for chain queries and submissions
//!
//! Every loop wraps its external calls in [`with_retry`]. Errors are
//! classified from their text the same way for EVM and Cosmos endpoints;
//! permanent errors and exhausted retries are returned to the caller, which
//! decides whether they are loop-fatal.

use std::future::Future;
use std::time::Duration;

use eyre::{Report, Result};
use gravity_rs::GravityError;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Backoff schedule for retried calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
    /// Random spread applied to each backoff, as a fraction (0.2 = +/-20%)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff duration for a given attempt (0-indexed), without jitter
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Backoff for `attempt` with jitter applied
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff_for_attempt(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        Duration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Classifies errors for retry decisions
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorClass {
    /// Temporary failure - should retry (RPC timeout, network issues, not found)
    Transient,
    /// The queried block range is not (yet or anymore) available on the node
    UnknownBlock,
    /// Permanent failure - do not retry (bad data, bad keys, reverted call)
    Permanent,
    /// Unknown error - may retry with backoff
    Unknown,
}

/// Marker error returned when a retried call is abandoned on cancellation.
#[derive(Debug, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

pub fn is_cancelled(err: &Report) -> bool {
    err.downcast_ref::<Cancelled>().is_some()
}

/// Provider-specific messages for a block range the node does not know.
pub fn is_unknown_block_err(error: &str) -> bool {
    let error_lower = error.to_lowercase();
    error_lower.contains("unknown block")
        || error_lower.contains("one of the blocks specified in filter")
        || error_lower.contains("header not found")
        || error_lower.contains("block range extends beyond current head")
}

/// Classify an error for retry decisions
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    if is_unknown_block_err(&error_lower) {
        return ErrorClass::UnknownBlock;
    }

    // Transient errors
    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
        || error_lower.contains("not found")
    {
        return ErrorClass::Transient;
    }

    // Permanent errors
    if error_lower.contains("reverted")
        || error_lower.contains("execution reverted")
        || error_lower.contains("insufficient funds")
        || error_lower.contains("encoding error")
        || error_lower.contains("invalid private key")
        || error_lower.contains("invalid mnemonic")
        || error_lower.contains("invalid parameters")
    {
        return ErrorClass::Permanent;
    }

    ErrorClass::Unknown
}

/// Classify a report, preferring its typed cause over its text.
pub fn classify_report(err: &Report) -> ErrorClass {
    if let Some(GravityError::Encoding(_)) = err.downcast_ref::<GravityError>() {
        return ErrorClass::Permanent;
    }
    classify_error(&format!("{:#}", err))
}

/// Run `operation` until it succeeds, a permanent error occurs, retries run
/// out, or `cancel` fires.
///
/// Cancellation abandons both an in-flight call and a pending backoff and
/// yields a [`Cancelled`] error.
pub async fn with_retry<F, T, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Report::new(Cancelled)),
            outcome = operation() => outcome,
        };

        let err = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!(call = label, attempt, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let class = classify_report(&err);
        if class == ErrorClass::Permanent {
            warn!(call = label, error = %format!("{:#}", err), "Permanent error, not retrying");
            return Err(err);
        }
        if !policy.should_retry(attempt) {
            return Err(err.wrap_err(format!("{} failed after {} attempts", label, attempt + 1)));
        }

        let backoff = policy.jittered_backoff(attempt);
        attempt += 1;
        warn!(
            call = label,
            attempt,
            max = policy.max_retries,
            ?backoff,
            class = ?class,
            error = %format!("{:#}", err),
            "Retrying after backoff"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Report::new(Cancelled)),
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}
