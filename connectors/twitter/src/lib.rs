//! Birdwire Twitter connector
//!
//! OAuth 1.0a signed access to two Twitter v1.1 endpoints:
//! - [`RequestClient`] posts status updates, one signed call each
//! - [`StreamSession`] tracks keywords on the filtered stream and hands
//!   every body chunk to a callback until stopped
//!
//! Signing lives in `birdwire-oauth`; the HTTP seam is the
//! [`Transport`](birdwire_transport::Transport) trait, so both halves run
//! against a scripted transport in tests.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod client;
mod config;
mod error;
mod stream;

pub use client::RequestClient;
pub use config::{FILTER_PATH, TwitterConfig, UPDATE_PATH};
pub use error::{CallError, StreamError, TwitterError, TwitterResult};
pub use stream::{SessionState, StreamSession, TRACK_PARAMETER};
