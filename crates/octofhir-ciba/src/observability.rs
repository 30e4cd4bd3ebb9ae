// Tracing initialization for processes embedding the CIBA engine.
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Installs a global subscriber with the `info` level.
pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Installs a global subscriber using the configured level.
pub fn init_tracing_from_config(config: &LoggingConfig) {
    init_tracing_with_level(&config.level);
}

/// Installs a global subscriber. `RUST_LOG` wins over `level` when set.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_tracing_with_level(level: &str) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing_with_level("debug");
        init_tracing_from_config(&LoggingConfig::default());
        tracing::info!("tracing initialized twice without panicking");
    }
}
