//! Birdwire CLI entrypoint.
//!
//! - `birdwire post <STATUS>...` - post status updates in order
//! - `birdwire track <KEYWORD>...` - print the filtered stream to stdout

#![forbid(unsafe_code)]

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use birdwire_oauth::SignatureEncoding;
use birdwire_twitter::{RequestClient, StreamSession, TwitterConfig};
use clap::{Args, Parser, Subcommand};
use parking_lot::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Signed Twitter status posting and keyword streaming.
#[derive(Parser)]
#[command(name = "birdwire")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    account: AccountArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct AccountArgs {
    /// OAuth consumer key.
    #[arg(long, env = "BIRDWIRE_CONSUMER_KEY", hide_env_values = true)]
    consumer_key: String,

    /// OAuth consumer secret.
    #[arg(long, env = "BIRDWIRE_CONSUMER_SECRET", hide_env_values = true)]
    consumer_secret: String,

    /// OAuth access token.
    #[arg(long, env = "BIRDWIRE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    /// OAuth access token secret.
    #[arg(long, env = "BIRDWIRE_ACCESS_TOKEN_SECRET", hide_env_values = true)]
    access_token_secret: String,

    /// Base URL for REST calls.
    #[arg(long, env = "BIRDWIRE_API_URL", default_value = "https://api.twitter.com")]
    api_url: String,

    /// Base URL for the filtered stream.
    #[arg(long, env = "BIRDWIRE_STREAM_URL", default_value = "https://stream.twitter.com")]
    stream_url: String,

    /// Timeout for single calls, in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Render signatures as base64 instead of hex.
    #[arg(long)]
    base64_signature: bool,
}

impl AccountArgs {
    fn into_config(self) -> Result<TwitterConfig> {
        let config = TwitterConfig {
            api_url: self.api_url,
            stream_url: self.stream_url,
            timeout: Duration::from_secs(self.timeout),
            signature_encoding: if self.base64_signature {
                SignatureEncoding::Base64
            } else {
                SignatureEncoding::Hex
            },
            ..TwitterConfig::new(
                self.consumer_key,
                self.consumer_secret,
                self.access_token,
                self.access_token_secret,
            )
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Post status updates, stopping at the first failure.
    Post {
        /// Status texts, posted in order.
        #[arg(required = true)]
        statuses: Vec<String>,
    },

    /// Track keywords on the filtered stream and print what arrives.
    ///
    /// Runs until the duration elapses, the stream goes idle, the remote
    /// ends the stream, or Ctrl-C.
    Track {
        /// Keywords to track.
        #[arg(required = true)]
        keywords: Vec<String>,

        /// Seconds to stream before stopping.
        #[arg(long, default_value_t = 10)]
        duration: u64,

        /// Stop after this many seconds without data.
        #[arg(long)]
        idle_timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only stream data.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.account.into_config()?;
    let transport = Arc::new(config.transport()?);

    match cli.command {
        Commands::Post { statuses } => {
            let client = RequestClient::from_config(&config, transport);
            let posted = client
                .post_statuses(&statuses)
                .await
                .context("posting statuses")?;
            println!("posted {posted} status update(s)");
            Ok(())
        }
        Commands::Track {
            keywords,
            duration,
            idle_timeout,
        } => {
            let session = StreamSession::from_config(&config, transport);
            track(
                &session,
                &keywords,
                Duration::from_secs(duration),
                idle_timeout.map(Duration::from_secs),
            )
            .await
        }
    }
}

async fn track(
    session: &StreamSession,
    keywords: &[String],
    duration: Duration,
    idle_timeout: Option<Duration>,
) -> Result<()> {
    let last_chunk = Arc::new(Mutex::new(Instant::now()));
    let seen = Arc::clone(&last_chunk);

    let keywords: Vec<&str> = keywords.iter().map(String::as_str).collect();
    session.start(&keywords, move |chunk| {
        *seen.lock() = Instant::now();
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(&chunk).and_then(|()| out.flush()) {
            warn!(error = %e, "Failed to write chunk");
        }
    })?;

    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let mut idle_check = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            () = &mut deadline => {
                info!(?duration, "Duration elapsed");
                break;
            }
            result = session.finished() => {
                return result.context("stream ended");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = idle_check.tick(), if idle_timeout.is_some() => {
                if idle_timeout.is_some_and(|limit| last_chunk.lock().elapsed() >= limit) {
                    warn!(?idle_timeout, "Stream idle, stopping");
                    break;
                }
            }
        }
    }

    session.stop().await.context("stopping stream")?;
    Ok(())
}
