//! Diagnostic tracing for the solve loop.
//!
//! Everything goes to stderr so stdout stays reserved for command results.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Compact format on stderr.
///
/// # Example
/// ```bash
/// RUST_LOG=solveloop=info solveloop solve "What is 2 + 2?"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
