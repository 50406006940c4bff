//! Structured logging with tracing
//!
//! Logs go to stderr so response bodies on stdout stay clean. `RUST_LOG`
//! overrides the level chosen from `-v`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::cli::LogFormat;

/// Default filter directive for a `-v` count
pub fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Calling it twice is harmless; the
/// second call keeps the first subscriber.
pub fn init_logging(verbose: u8, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for(verbose)));
    let registry = Registry::default().with(filter);

    let result = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    if result.is_ok() {
        tracing::debug!(level = level_for(verbose), ?format, "Logging initialized");
    }
}
