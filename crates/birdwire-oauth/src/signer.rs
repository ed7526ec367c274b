//! OAuth 1.0a signature generation.
//!
//! Builds the signature base string, signs it with HMAC-SHA1 and assembles
//! the `Authorization` header value.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use tracing::debug;
use url::Url;

use crate::{
    Credentials, OAUTH_VERSION, OAuthError, OAuthResult, ParameterSet, SIGNATURE_METHOD,
    form_urlencode, percent_encode,
};

/// Protocol parameter names added to every signed request.
pub const PROTOCOL_PARAMETERS: [&str; 6] = [
    "oauth_consumer_key",
    "oauth_nonce",
    "oauth_signature_method",
    "oauth_timestamp",
    "oauth_token",
    "oauth_version",
];

/// Name of the parameter carrying the computed signature.
pub const SIGNATURE_PARAMETER: &str = "oauth_signature";

/// How the raw HMAC digest is rendered into `oauth_signature`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureEncoding {
    /// Lowercase hex, 40 characters.
    #[default]
    Hex,
    /// Standard base64 as written in RFC 5849.
    Base64,
}

/// Per-request freshness material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    /// Single-use random token.
    pub nonce: String,
    /// Unix seconds.
    pub timestamp: u64,
}

impl SigningContext {
    /// Build a context from explicit values.
    #[must_use]
    pub fn new(nonce: impl Into<String>, timestamp: u64) -> Self {
        Self {
            nonce: nonce.into(),
            timestamp,
        }
    }

    /// A random nonce and the current wall-clock time.
    #[must_use]
    pub fn fresh() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self {
            nonce: generate_nonce(),
            timestamp,
        }
    }
}

/// A signed request, ready for exactly one transport call.
///
/// Not `Clone`: the nonce inside the header is single-use.
#[derive(Debug, PartialEq, Eq)]
pub struct SignedRequest {
    /// Upper-cased HTTP method.
    pub method: String,
    /// Target URL, without query string.
    pub url: String,
    /// Value for the `Authorization` header.
    pub authorization: String,
    /// Form-encoded body, present for methods that carry one.
    pub body: Option<String>,
}

/// Produces OAuth 1.0a `Authorization` headers for one set of credentials.
///
/// Holds no mutable state, so a single engine can sign from many tasks at once.
#[derive(Debug, Clone)]
pub struct SignatureEngine {
    credentials: Arc<Credentials>,
    encoding: SignatureEncoding,
}

impl SignatureEngine {
    /// Create a signature engine.
    #[must_use]
    pub fn new(credentials: Arc<Credentials>) -> Self {
        Self {
            credentials,
            encoding: SignatureEncoding::default(),
        }
    }

    /// Select how the signature digest is rendered.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: SignatureEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// The configured signature rendering.
    #[must_use]
    pub const fn encoding(&self) -> SignatureEncoding {
        self.encoding
    }

    /// Generate the `Authorization` header value with a fresh nonce and timestamp.
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, etc.)
    /// * `url` - Absolute URL without query string
    /// * `extra` - Call-specific parameters (query or form body)
    ///
    /// # Errors
    /// [`OAuthError::InvalidParameters`] when `extra` redefines a protocol
    /// parameter or the URL carries a query; [`OAuthError::EncodingFailure`]
    /// when the method or URL cannot be encoded.
    pub fn sign(&self, method: &str, url: &str, extra: &ParameterSet) -> OAuthResult<String> {
        self.sign_with_context(method, url, extra, &SigningContext::fresh())
    }

    /// Generate the `Authorization` header value for a given nonce and timestamp.
    ///
    /// # Errors
    /// Same as [`SignatureEngine::sign`].
    pub fn sign_with_context(
        &self,
        method: &str,
        url: &str,
        extra: &ParameterSet,
        context: &SigningContext,
    ) -> OAuthResult<String> {
        let method = normalize_method(method)?;
        validate_url(url)?;

        let mut oauth_params = self.protocol_parameters(context);
        let all_params = merge(&oauth_params, extra)?;

        let base = base_string(&method, url, &all_params);
        let signature = compute_signature(&self.signing_key(), &base, self.encoding)?;
        debug!(method = %method, url, params = extra.len(), "Signed OAuth request");

        oauth_params.insert(SIGNATURE_PARAMETER, signature);

        // Only protocol parameters travel in the header
        let header = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {header}"))
    }

    /// Sign a request and encode its body from the same parameter set.
    ///
    /// For `POST`/`PUT`/`PATCH` the parameters become the form body; for
    /// other methods the body is `None` and the caller is expected to send
    /// the parameters in the query string.
    ///
    /// # Errors
    /// Same as [`SignatureEngine::sign`].
    pub fn sign_request(
        &self,
        method: &str,
        url: &str,
        params: &ParameterSet,
    ) -> OAuthResult<SignedRequest> {
        let authorization = self.sign(method, url, params)?;
        let method = normalize_method(method)?;
        let body = matches!(method.as_str(), "POST" | "PUT" | "PATCH").then(|| form_urlencode(params));

        Ok(SignedRequest {
            method,
            url: url.to_string(),
            authorization,
            body,
        })
    }

    fn protocol_parameters(&self, context: &SigningContext) -> ParameterSet {
        let timestamp = context.timestamp.to_string();
        ParameterSet::from([
            ("oauth_consumer_key", self.credentials.consumer_key()),
            ("oauth_nonce", context.nonce.as_str()),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.credentials.access_token()),
            ("oauth_version", OAUTH_VERSION),
        ])
    }

    fn signing_key(&self) -> String {
        format!(
            "{}&{}",
            percent_encode(self.credentials.consumer_secret()),
            percent_encode(self.credentials.access_token_secret())
        )
    }
}

/// Build the OAuth 1.0a signature base string.
///
/// `UPPER(method) & pct(url) & pct(sorted pct(name)=pct(value) joined by &)`.
#[must_use]
pub fn base_string(method: &str, url: &str, params: &ParameterSet) -> String {
    let param_string = params.encoded_pairs().join("&");
    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    )
}

fn normalize_method(method: &str) -> OAuthResult<String> {
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(OAuthError::EncodingFailure(format!(
            "invalid HTTP method {method:?}"
        )));
    }
    Ok(method.to_ascii_uppercase())
}

fn validate_url(url: &str) -> OAuthResult<()> {
    let parsed =
        Url::parse(url).map_err(|e| OAuthError::EncodingFailure(format!("invalid URL {url:?}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(OAuthError::EncodingFailure(format!(
            "unsupported URL scheme {:?}",
            parsed.scheme()
        )));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(OAuthError::InvalidParameters(
            "URL must not carry a query string or fragment; pass query values as parameters".into(),
        ));
    }
    Ok(())
}

fn merge(protocol: &ParameterSet, extra: &ParameterSet) -> OAuthResult<ParameterSet> {
    let mut merged = protocol.clone();
    for (name, value) in extra.iter() {
        if protocol.contains(name) || name == SIGNATURE_PARAMETER {
            return Err(OAuthError::InvalidParameters(format!(
                "parameter {name:?} collides with an OAuth protocol parameter"
            )));
        }
        merged.insert(name, value);
    }
    Ok(merged)
}

/// Compute HMAC-SHA1 and render it with the requested encoding.
fn compute_signature(key: &str, data: &str, encoding: SignatureEncoding) -> OAuthResult<String> {
    type HmacSha1 = Hmac<Sha1>;

    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| OAuthError::EncodingFailure(e.to_string()))?;

    mac.update(data.as_bytes());
    let digest = mac.finalize().into_bytes();

    Ok(match encoding {
        SignatureEncoding::Hex => hex::encode(digest),
        SignatureEncoding::Base64 => BASE64.encode(digest),
    })
}

/// Generate a random nonce for OAuth.
fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
