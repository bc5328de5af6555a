//! Tracing subscriber bootstrap.

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::service::config::LoggingConfig;

/// Installs a global `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `config.filter`.
///
/// Returns `false` when a global subscriber was already installed, in which
/// case the existing one stays in place.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.is_ok()
}
