//! Birdwire Test Kit - transports and servers for exercising signing clients
//!
//! - [`ScriptedTransport`] - in-memory [`Transport`](birdwire_transport::Transport)
//!   that replays scripted responses and chunk streams and records requests
//! - [`MockApiServer`] - wiremock wrapper for end-to-end tests over real HTTP
//! - [`init_test_tracing`] - one-time tracing setup for test output
//!
//! # Example
//!
//! ```rust,ignore
//! use birdwire_testkit::{ScriptedStream, ScriptedTransport};
//!
//! let transport = ScriptedTransport::new();
//! transport.push_stream(ScriptedStream::ok().chunk("a").chunk("b").close());
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod mock_server;
mod scripted;
mod tracing_config;

pub use mock_server::*;
pub use scripted::*;
pub use tracing_config::*;
