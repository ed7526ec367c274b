//! Long-lived OAuth 1.0a credentials.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

const REDACTED: &str = "[REDACTED]";

/// Consumer and access-token key pairs for one user context.
///
/// Immutable once built. Share it behind an `Arc`; the secret material is
/// wiped when the last owner drops it and never shows up in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    consumer_key: String,
    consumer_secret: String,
    access_token: String,
    access_token_secret: String,
}

impl Credentials {
    /// Create credentials from the four OAuth 1.0a values.
    #[must_use]
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            access_token: access_token.into(),
            access_token_secret: access_token_secret.into(),
        }
    }

    /// Consumer key (API key).
    #[must_use]
    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// Consumer secret (API secret).
    #[must_use]
    pub fn consumer_secret(&self) -> &str {
        &self.consumer_secret
    }

    /// Access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Access token secret.
    #[must_use]
    pub fn access_token_secret(&self) -> &str {
        &self.access_token_secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &REDACTED)
            .field("consumer_secret", &REDACTED)
            .field("access_token", &REDACTED)
            .field("access_token_secret", &REDACTED)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_every_field() {
        let creds = Credentials::new("ck-value", "cs-value", "at-value", "ats-value");
        let rendered = format!("{creds:?}");

        for secret in ["ck-value", "cs-value", "at-value", "ats-value"] {
            assert!(!rendered.contains(secret), "{secret} leaked into {rendered}");
        }
        assert!(rendered.contains(REDACTED));
    }
}
