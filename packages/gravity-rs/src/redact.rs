//! Secret redaction for keys and mnemonics.
//!
//! [`Redacted`] formats and serializes as `"<redacted>"` no matter what it
//! wraps, so orchestrator keys can sit inside config structs that get logged.

use std::fmt::{self, Debug, Display};

/// Wrapper that hides its inner value from `Debug`, `Display` and `Serialize`.
///
/// ```ignore
/// use gravity_rs::redact::Redacted;
///
/// tracing::info!(key = %Redacted(&config.eth_private_key), "Loaded signer");
/// // Logs: key = <redacted>
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Redacted<T>(pub T);

impl<T> Redacted<T> {
    /// Access the secret. Callers must not log the result.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> serde::Serialize for Redacted<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        "<redacted>".serialize(serializer)
    }
}
