//! Birdwire OAuth - OAuth 1.0a request signing
//!
//! This crate turns long-lived user credentials into per-request
//! `Authorization` headers:
//!
//! - **Credentials**: the four OAuth 1.0a secrets, redacted in `Debug` output
//! - **Parameter sets**: unique name/value maps with RFC 3986 encoding helpers
//! - **Signature engine**: base string, HMAC-SHA1 signature and header assembly
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use birdwire_oauth::{Credentials, ParameterSet, SignatureEngine};
//!
//! let credentials = Arc::new(Credentials::new("ck", "cs", "at", "ats"));
//! let engine = SignatureEngine::new(credentials);
//!
//! let params = ParameterSet::from([("status", "Hello")]);
//! let header = engine.sign("POST", "https://api.twitter.com/1.1/statuses/update.json", &params)?;
//! assert!(header.starts_with("OAuth "));
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod credentials;
mod error;
mod params;
mod signer;

pub use credentials::*;
pub use error::*;
pub use params::*;
pub use signer::*;

/// The only signature method this crate implements.
pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";

/// OAuth protocol version sent with every request.
pub const OAUTH_VERSION: &str = "1.0";
