//! Twitter connector configuration.

use std::sync::Arc;
use std::time::Duration;

use birdwire_oauth::{Credentials, SignatureEncoding, SignatureEngine};
use birdwire_transport::ReqwestTransport;
use serde::{Deserialize, Serialize};

use crate::error::{TwitterError, TwitterResult};

/// Path of the status update endpoint.
pub const UPDATE_PATH: &str = "/1.1/statuses/update.json";

/// Path of the filtered stream endpoint.
pub const FILTER_PATH: &str = "/1.1/statuses/filter.json";

/// Configuration for the Twitter connector.
#[derive(Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    /// OAuth 1.0a Consumer Key (API Key)
    pub consumer_key: String,

    /// OAuth 1.0a Consumer Secret (API Secret)
    pub consumer_secret: String,

    /// OAuth 1.0a Access Token
    pub access_token: String,

    /// OAuth 1.0a Access Token Secret
    pub access_token_secret: String,

    /// Base URL for REST calls (default: https://api.twitter.com)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Base URL for the filtered stream (default: https://stream.twitter.com)
    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    /// Timeout for single calls; streams never time out
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Rendering of `oauth_signature`
    #[serde(default)]
    pub signature_encoding: SignatureEncoding,
}

fn default_api_url() -> String {
    "https://api.twitter.com".into()
}

fn default_stream_url() -> String {
    "https://stream.twitter.com".into()
}

const fn default_timeout() -> Duration {
    birdwire_transport::DEFAULT_REQUEST_TIMEOUT
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            consumer_key: String::new(),
            consumer_secret: String::new(),
            access_token: String::new(),
            access_token_secret: String::new(),
            api_url: default_api_url(),
            stream_url: default_stream_url(),
            timeout: default_timeout(),
            signature_encoding: SignatureEncoding::default(),
        }
    }
}

impl std::fmt::Debug for TwitterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterConfig")
            .field("api_url", &self.api_url)
            .field("stream_url", &self.stream_url)
            .field("timeout", &self.timeout)
            .field("signature_encoding", &self.signature_encoding)
            .finish_non_exhaustive()
    }
}

impl TwitterConfig {
    /// Build a configuration from the four credentials and default endpoints.
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
            ..Self::default()
        }
    }

    /// Check that every credential is present and the endpoints look usable.
    ///
    /// # Errors
    /// Returns [`TwitterError::Config`] naming the first problem found.
    pub fn validate(&self) -> TwitterResult<()> {
        for (name, value) in [
            ("consumer_key", &self.consumer_key),
            ("consumer_secret", &self.consumer_secret),
            ("access_token", &self.access_token),
            ("access_token_secret", &self.access_token_secret),
        ] {
            if value.trim().is_empty() {
                return Err(TwitterError::Config(format!("{name} is required")));
            }
        }

        for (name, value) in [("api_url", &self.api_url), ("stream_url", &self.stream_url)] {
            if !(value.starts_with("https://") || value.starts_with("http://")) {
                return Err(TwitterError::Config(format!(
                    "{name} must be an http(s) URL, got {value:?}"
                )));
            }
        }

        if self.timeout.is_zero() {
            return Err(TwitterError::Config("timeout must be positive".into()));
        }
        Ok(())
    }

    /// The credentials as a shareable value.
    #[must_use]
    pub fn credentials(&self) -> Arc<Credentials> {
        Arc::new(Credentials::new(
            self.consumer_key.clone(),
            self.consumer_secret.clone(),
            self.access_token.clone(),
            self.access_token_secret.clone(),
        ))
    }

    /// A signature engine for these credentials.
    #[must_use]
    pub fn signature_engine(&self) -> SignatureEngine {
        SignatureEngine::new(self.credentials()).with_encoding(self.signature_encoding)
    }

    /// A reqwest transport honoring the configured timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP clients fail to build.
    pub fn transport(&self) -> TwitterResult<ReqwestTransport> {
        Ok(ReqwestTransport::new(self.timeout)?)
    }

    /// Full URL of the status update endpoint.
    #[must_use]
    pub fn update_url(&self) -> String {
        format!("{}{UPDATE_PATH}", self.api_url.trim_end_matches('/'))
    }

    /// Full URL of the filtered stream endpoint.
    #[must_use]
    pub fn filter_url(&self) -> String {
        format!("{}{FILTER_PATH}", self.stream_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> TwitterConfig {
        TwitterConfig::new("ck", "cs", "at", "ats")
    }

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: TwitterConfig = serde_json::from_value(serde_json::json!({
            "consumer_key": "ck",
            "consumer_secret": "cs",
            "access_token": "at",
            "access_token_secret": "ats"
        }))
        .unwrap();

        assert_eq!(config.api_url, "https://api.twitter.com");
        assert_eq!(config.stream_url, "https://stream.twitter.com");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.signature_encoding, SignatureEncoding::Hex);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_signature_encoding_and_timeout_from_json() {
        let config: TwitterConfig = serde_json::from_value(serde_json::json!({
            "consumer_key": "ck",
            "consumer_secret": "cs",
            "access_token": "at",
            "access_token_secret": "ats",
            "timeout": 5,
            "signature_encoding": "base64"
        }))
        .unwrap();

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.signature_encoding, SignatureEncoding::Base64);
        assert_eq!(config.signature_engine().encoding(), SignatureEncoding::Base64);
    }

    #[test]
    fn test_validate_rejects_missing_credentials() {
        let config = TwitterConfig {
            access_token_secret: "  ".into(),
            ..complete()
        };

        let err = config.validate().unwrap_err();
        assert!(matches!(err, TwitterError::Config(ref msg) if msg.contains("access_token_secret")));
    }

    #[test]
    fn test_validate_rejects_bad_urls_and_timeout() {
        let bad_url = TwitterConfig {
            stream_url: "stream.twitter.com".into(),
            ..complete()
        };
        assert!(matches!(bad_url.validate(), Err(TwitterError::Config(_))));

        let zero_timeout = TwitterConfig {
            timeout: Duration::ZERO,
            ..complete()
        };
        assert!(matches!(zero_timeout.validate(), Err(TwitterError::Config(_))));
    }

    #[test]
    fn test_endpoint_urls() {
        let config = TwitterConfig {
            api_url: "http://127.0.0.1:8080/".into(),
            ..complete()
        };

        assert_eq!(
            config.update_url(),
            "http://127.0.0.1:8080/1.1/statuses/update.json"
        );
        assert_eq!(
            config.filter_url(),
            "https://stream.twitter.com/1.1/statuses/filter.json"
        );
    }

    #[test]
    fn test_debug_omits_credentials() {
        let rendered = format!("{:?}", TwitterConfig::new("ck-1", "cs-2", "at-3", "ats-4"));
        for secret in ["ck-1", "cs-2", "at-3", "ats-4"] {
            assert!(!rendered.contains(secret));
        }
    }
}
