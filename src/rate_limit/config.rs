//! Rate limiter construction parameters.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Admission algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    TokenBucket,
    LeakyBucket,
    FixedWindow,
    SlidingWindow,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::TokenBucket => "token_bucket",
            Strategy::LeakyBucket => "leaky_bucket",
            Strategy::FixedWindow => "fixed_window",
            Strategy::SlidingWindow => "sliding_window",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid limiter parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimiterError {
    #[error("permits_per_second must be greater than zero")]
    ZeroRate,

    #[error("burst_capacity must be greater than zero for the token bucket")]
    ZeroBurst,

    #[error("max_concurrency must be greater than zero when set")]
    ZeroConcurrency,

    #[error("maintenance interval must be greater than zero")]
    ZeroMaintenanceInterval,
}

/// Configuration for a [`RateLimiter`](super::RateLimiter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub strategy: Strategy,
    pub permits_per_second: u32,
    /// Token bucket capacity. Ignored by the other strategies.
    pub burst_capacity: u32,
    /// Wait for admission instead of failing fast.
    pub block_on_limit: bool,
    /// Cap on callers holding a permit at once.
    pub max_concurrency: Option<usize>,
    /// Period of the background sweep over window buckets.
    pub maintenance_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::TokenBucket,
            permits_per_second: 100,
            burst_capacity: 100,
            block_on_limit: false,
            max_concurrency: None,
            maintenance_interval: Duration::from_secs(30),
        }
    }
}

impl RateLimiterConfig {
    /// Config for `strategy` at `permits_per_second`, with a burst capacity
    /// equal to one second's worth of permits.
    pub fn new(strategy: Strategy, permits_per_second: u32) -> Self {
        Self {
            strategy,
            permits_per_second,
            burst_capacity: permits_per_second,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn burst_capacity(mut self, burst: u32) -> Self {
        self.burst_capacity = burst;
        self
    }

    #[must_use]
    pub fn block_on_limit(mut self, block: bool) -> Self {
        self.block_on_limit = block;
        self
    }

    #[must_use]
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }

    #[must_use]
    pub fn maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), LimiterError> {
        if self.permits_per_second == 0 {
            return Err(LimiterError::ZeroRate);
        }
        if self.strategy == Strategy::TokenBucket && self.burst_capacity == 0 {
            return Err(LimiterError::ZeroBurst);
        }
        if self.max_concurrency == Some(0) {
            return Err(LimiterError::ZeroConcurrency);
        }
        if self.maintenance_interval.is_zero() {
            return Err(LimiterError::ZeroMaintenanceInterval);
        }
        Ok(())
    }
}
