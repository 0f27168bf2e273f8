//! Tracing subscriber setup.
//!
//! Call once at startup, before serving. The level comes from `RUST_LOG`
//! (`info` when unset), e.g. `RUST_LOG=tabserv=debug` to see cursor-store
//! and routing decisions.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging with the `RUST_LOG` filter, defaulting to `info`.
///
/// # Panics
///
/// Panics if a global subscriber was already installed.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize logging with an explicit level, ignoring the environment on
/// purpose (useful for tools that embed the server).
pub fn init_logging_with_level(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
