//! Transport error types.

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP client error.
    #[error("HTTP client error: {0}")]
    Request(#[from] reqwest::Error),

    /// Connection failed or dropped.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
