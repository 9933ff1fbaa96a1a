//! Exponential backoff for throttled provider calls

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry (ms)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Upper bound on any computed delay (ms)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    3
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_retries: default_max_retries(),
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_delay_ms == 0 || self.max_delay_ms == 0 || self.max_retries == 0 {
            return Err("backoff delays and max_retries must be greater than 0".to_string());
        }
        if self.multiplier <= 1.0 {
            return Err(format!("backoff multiplier must be greater than 1, got {}", self.multiplier));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err("initial_delay_ms must not exceed max_delay_ms".to_string());
        }
        Ok(())
    }

    /// Delay before the next attempt
    ///
    /// `consecutive_errors` counts the current failure, so the first retry
    /// waits `initial_delay`. A provider retry-after hint wins when longer.
    pub fn delay_for(&self, consecutive_errors: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = consecutive_errors.saturating_sub(1).min(64) as i32;
        let computed_ms = (self.initial_delay_ms as f64 * self.multiplier.powi(exponent))
            .min(self.max_delay_ms as f64);
        let computed = Duration::from_millis(computed_ms as u64);

        match retry_after {
            Some(hint) => hint.max(computed),
            None => computed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let config = BackoffConfig::default();
        assert_eq!(config.delay_for(1, None), Duration::from_secs(1));
        assert_eq!(config.delay_for(2, None), Duration::from_secs(2));
        assert_eq!(config.delay_for(3, None), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped() {
        let config = BackoffConfig::default();
        assert_eq!(config.delay_for(30, None), Duration::from_secs(60));
        assert_eq!(config.delay_for(u32::MAX, None), Duration::from_secs(60));
    }

    #[test]
    fn test_retry_after_hint_wins_when_longer() {
        let config = BackoffConfig::default();
        assert_eq!(
            config.delay_for(1, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
        assert_eq!(
            config.delay_for(3, Some(Duration::from_millis(10))),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn test_validation() {
        assert!(BackoffConfig::default().validate().is_ok());
        let flat = BackoffConfig {
            multiplier: 1.0,
            ..BackoffConfig::default()
        };
        assert!(flat.validate().is_err());
    }
}
