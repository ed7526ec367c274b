//! Birdwire Transport - pluggable HTTP transport
//!
//! Signing and session logic never open sockets themselves. They hand an
//! [`HttpRequest`] to a [`Transport`], which either buffers the whole
//! response or yields the body incrementally as a [`ByteStream`].
//!
//! [`ReqwestTransport`] is the production implementation.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod http;
mod reqwest_transport;

pub use error::*;
pub use http::*;
pub use reqwest_transport::*;

use std::time::Duration;

/// Default timeout for single request/response exchanges.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout applied to streaming requests, which otherwise never time out.
pub const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
