//! Tracing configuration for test output.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Initialize tracing for tests.
///
/// Safe to call from every test; only the first call installs the subscriber.
/// Uses `RUST_LOG` if set, otherwise debug output for the birdwire crates.
pub fn init_test_tracing() {
    init_test_tracing_with_filter(
        &std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "info,birdwire_oauth=debug,birdwire_twitter=debug".into()),
    );
}

/// Initialize tracing with a specific filter.
pub fn init_test_tracing_with_filter(filter: &str) {
    let filter = filter.to_string();
    INIT.call_once(move || {
        // Another harness may already own the global subscriber
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new(filter))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .compact(),
            )
            .try_init();
    });
}
