//! OAuth signing error types.

/// Errors raised while building a signature.
///
/// Both variants describe caller bugs; neither is worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// Signing inputs are malformed or collide with protocol parameters.
    #[error("Invalid signing parameters: {0}")]
    InvalidParameters(String),

    /// Input could not be encoded (bad bytes, unparseable URL or method).
    #[error("Encoding failure: {0}")]
    EncodingFailure(String),
}

/// Result type for OAuth operations.
pub type OAuthResult<T> = Result<T, OAuthError>;
