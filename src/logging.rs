use tracing_subscriber::EnvFilter;

use crate::error::{AgentError, Result};

/// Initializes the process-wide tracing subscriber with the specified
/// default log level
///
/// `RUST_LOG` takes precedence when set. Valid levels are: error, warn,
/// info, debug, trace. Fails if a subscriber is already installed.
pub fn init(log_level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter(log_level))
        .with_target(true)
        .try_init()
        .map_err(|e| AgentError::Config(format!("Failed to initialize logging: {e}")))
}

/// Builds the env filter, preferring `RUST_LOG` over the supplied default
pub fn default_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}
