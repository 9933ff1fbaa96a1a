//! Error types for the admission and governance pipeline
//!
//! Infrastructure failures (budget, rate limiting, provider configuration)
//! surface as [`GatewayError`]. Content-quality problems (validation, parsing)
//! never do: they are returned inside the result value.

use crate::providers::ProviderError;
use std::time::Duration;
use thiserror::Error;

/// Crate-level result alias
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Budget exceeded: {reason}")]
    BudgetExceeded { reason: String },

    #[error("Rate limited after {attempts} attempts: {source}")]
    RateLimited {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider health check failed: {0}")]
    ProviderHealthCheckFailed(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Admission queue is shut down")]
    QueueShutdown,

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

impl GatewayError {
    /// Whether the caller may retry the same request later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::BudgetExceeded { .. } | Self::RateLimited { .. } | Self::Timeout(_)
        )
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}
