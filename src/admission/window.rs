//! Sliding-window rate accounting
//!
//! Usage is kept as a log of `(timestamp, tokens)` entries and every window
//! is recomputed from timestamps on demand. Nothing resets on a calendar
//! boundary.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// How long history is kept before pruning
pub const HISTORY_RETENTION: Duration = DAY;

/// Request and token ceilings per window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateWindowConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u64,
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u64,
    #[serde(default = "default_requests_per_day")]
    pub requests_per_day: u64,
    #[serde(default = "default_tokens_per_minute")]
    pub tokens_per_minute: u64,
    #[serde(default = "default_tokens_per_hour")]
    pub tokens_per_hour: u64,
    #[serde(default = "default_tokens_per_day")]
    pub tokens_per_day: u64,
}

fn default_requests_per_minute() -> u64 {
    50
}

fn default_requests_per_hour() -> u64 {
    1_000
}

fn default_requests_per_day() -> u64 {
    10_000
}

fn default_tokens_per_minute() -> u64 {
    40_000
}

fn default_tokens_per_hour() -> u64 {
    1_000_000
}

fn default_tokens_per_day() -> u64 {
    10_000_000
}

impl Default for RateWindowConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            requests_per_hour: default_requests_per_hour(),
            requests_per_day: default_requests_per_day(),
            tokens_per_minute: default_tokens_per_minute(),
            tokens_per_hour: default_tokens_per_hour(),
            tokens_per_day: default_tokens_per_day(),
        }
    }
}

impl RateWindowConfig {
    pub fn validate(&self) -> Result<(), String> {
        for dimension in RateDimension::ALL {
            if self.limit(dimension) == 0 {
                return Err(format!("{} must be greater than 0", dimension));
            }
        }
        Ok(())
    }

    pub fn limit(&self, dimension: RateDimension) -> u64 {
        match dimension {
            RateDimension::RequestsPerMinute => self.requests_per_minute,
            RateDimension::RequestsPerHour => self.requests_per_hour,
            RateDimension::RequestsPerDay => self.requests_per_day,
            RateDimension::TokensPerMinute => self.tokens_per_minute,
            RateDimension::TokensPerHour => self.tokens_per_hour,
            RateDimension::TokensPerDay => self.tokens_per_day,
        }
    }
}

/// One of the six rate limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateDimension {
    RequestsPerMinute,
    RequestsPerHour,
    RequestsPerDay,
    TokensPerMinute,
    TokensPerHour,
    TokensPerDay,
}

impl RateDimension {
    /// Evaluation order; the first violated dimension is reported
    pub const ALL: [RateDimension; 6] = [
        Self::RequestsPerMinute,
        Self::RequestsPerHour,
        Self::RequestsPerDay,
        Self::TokensPerMinute,
        Self::TokensPerHour,
        Self::TokensPerDay,
    ];

    pub fn window(&self) -> Duration {
        match self {
            Self::RequestsPerMinute | Self::TokensPerMinute => MINUTE,
            Self::RequestsPerHour | Self::TokensPerHour => HOUR,
            Self::RequestsPerDay | Self::TokensPerDay => DAY,
        }
    }

    pub fn counts_tokens(&self) -> bool {
        matches!(self, Self::TokensPerMinute | Self::TokensPerHour | Self::TokensPerDay)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestsPerMinute => "requests_per_minute",
            Self::RequestsPerHour => "requests_per_hour",
            Self::RequestsPerDay => "requests_per_day",
            Self::TokensPerMinute => "tokens_per_minute",
            Self::TokensPerHour => "tokens_per_hour",
            Self::TokensPerDay => "tokens_per_day",
        }
    }
}

impl fmt::Display for RateDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed call as seen by the rate limiter
#[derive(Debug, Clone, Copy)]
pub struct RequestHistoryEntry {
    pub timestamp: Instant,
    pub token_count: u64,
}

/// Result of a rate-limit check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitStatus {
    pub can_proceed: bool,
    pub reason: Option<String>,
    pub dimension: Option<RateDimension>,
    /// Time until the oldest entry in the violated window expires
    pub wait_time: Duration,
}

impl RateLimitStatus {
    fn allowed() -> Self {
        Self {
            can_proceed: true,
            reason: None,
            dimension: None,
            wait_time: Duration::ZERO,
        }
    }
}

/// Time-ordered log of completed calls
#[derive(Debug, Default)]
pub struct RequestHistory {
    entries: VecDeque<RequestHistoryEntry>,
}

impl RequestHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, timestamp: Instant, token_count: u64) {
        self.entries.push_back(RequestHistoryEntry {
            timestamp,
            token_count,
        });
    }

    /// Drop entries older than `retention`, returning how many were removed
    pub fn prune(&mut self, now: Instant, retention: Duration) -> usize {
        let before = self.entries.len();
        while let Some(front) = self.entries.front() {
            if now.saturating_duration_since(front.timestamp) >= retention {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether a call of `estimated_tokens` may run at `now`
    ///
    /// Entries older than a window are ignored for that window even if they
    /// have not been pruned yet. A token-heavy call with nothing else in the
    /// window is admitted, since waiting would never make room for it.
    pub fn check(
        &self,
        config: &RateWindowConfig,
        now: Instant,
        estimated_tokens: u64,
    ) -> RateLimitStatus {
        for dimension in RateDimension::ALL {
            let window = dimension.window();
            let limit = config.limit(dimension);

            let mut in_window = self
                .entries
                .iter()
                .filter(|entry| now.saturating_duration_since(entry.timestamp) < window)
                .peekable();
            let Some(oldest) = in_window.peek().copied() else {
                continue;
            };

            let (used, requested) = if dimension.counts_tokens() {
                (in_window.map(|entry| entry.token_count).sum::<u64>(), estimated_tokens)
            } else {
                (in_window.count() as u64, 1)
            };

            if used + requested > limit {
                let wait_time = window - now.saturating_duration_since(oldest.timestamp);
                return RateLimitStatus {
                    can_proceed: false,
                    reason: Some(format!(
                        "Rate limit {} reached ({} used, {} requested, limit {})",
                        dimension, used, requested, limit
                    )),
                    dimension: Some(dimension),
                    wait_time,
                };
            }
        }

        RateLimitStatus::allowed()
    }
}
