//! Twitter-specific error types.

use birdwire_oauth::OAuthError;
use birdwire_transport::TransportError;
use thiserror::Error;

use crate::stream::SessionState;

/// A single signed call was rejected by the remote or the transport.
///
/// Never retried by the client; the caller decides.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Call failed (status {}): {}", status_label(.http_status), message_label(.transport_message))]
pub struct CallError {
    /// HTTP status, when a response arrived.
    pub http_status: Option<u16>,
    /// Response body or transport failure description.
    pub transport_message: Option<String>,
}

impl CallError {
    /// A non-2xx response.
    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            http_status: Some(status),
            transport_message: (!body.is_empty()).then_some(body),
        }
    }

    /// A failure before any response arrived.
    #[must_use]
    pub fn transport(error: &TransportError) -> Self {
        Self {
            http_status: None,
            transport_message: Some(error.to_string()),
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

fn message_label(message: &Option<String>) -> &str {
    message.as_deref().unwrap_or("no message")
}

/// A streaming connection failed after `start`.
///
/// Surfaced once; the session that produced it is terminal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The stream endpoint answered with a non-2xx status.
    #[error("Stream rejected with HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The transport failed while connecting or reading.
    #[error("Stream transport error: {0}")]
    Transport(String),

    /// The remote closed the connection.
    #[error("Stream closed by remote")]
    ConnectionClosed,
}

/// Twitter-specific errors.
#[derive(Error, Debug)]
pub enum TwitterError {
    /// OAuth signature generation failed
    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    /// A signed call was rejected
    #[error(transparent)]
    Call(#[from] CallError),

    /// Streaming connection failed
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Transport could not be set up
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session operation not allowed in the current state
    #[error("Cannot {operation} a stream session that is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TwitterError {
    /// Check if this error is worth retrying by a caller-side policy.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Call(CallError {
                http_status: Some(status),
                ..
            }) => *status >= 500 || *status == 429,
            Self::Call(CallError {
                http_status: None, ..
            })
            | Self::Stream(_) => true,
            _ => false,
        }
    }
}

/// Result type for Twitter operations.
pub type TwitterResult<T> = Result<T, TwitterError>;
