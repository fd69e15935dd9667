//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing with structured JSON output, suitable for a log
/// aggregator.
#[cfg(feature = "observability")]
pub fn init_tracing(config: &Config) -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter(&config.service.log_level))
        .init();

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}

/// Initialize tracing with plain, human-readable output for local development.
#[cfg(not(feature = "observability"))]
pub fn init_tracing(config: &Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.service.log_level))
        .init();

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}

/// Shutdown tracing and flush any buffered events.
pub fn shutdown_tracing() {
    tracing::info!("Tracing shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing() {
        let config = Config::default();
        // This should not panic
        let _ = init_tracing(&config);
    }
}
