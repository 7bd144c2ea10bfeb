//! # Structured Logging
//!
//! Environment-aware `tracing` setup for debugging batch runs. Filtering is
//! controlled through `RUST_LOG`; the default level is `info`.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process. Safe to call repeatedly;
/// if a global subscriber is already installed (e.g. by a test harness or an
/// embedding application) the existing one is kept.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .with_target(true)
                .with_level(true),
        );

        if subscriber.try_init().is_err() {
            tracing::debug!("global tracing subscriber already initialized");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_logging();
        init_logging();
    }
}
