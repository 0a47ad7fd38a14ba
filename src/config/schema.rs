//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Durations are plain integers with the unit in the field name.

use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::TransportErrorKind;
use crate::rate_limit::{RateLimiterConfig, Strategy};
use crate::resilience::{Backoff, BackoffKind, PolicyError, RetryPolicy};

/// Root configuration for a resilient client.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Retry settings.
    pub retry: RetryConfig,

    /// Rate limiting settings.
    pub rate_limit: RateLimitConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Add a retry middleware at all.
    pub enabled: bool,

    /// Retries after the original attempt.
    pub max_attempts: u32,

    /// Delay growth between retries.
    pub backoff: BackoffKind,

    /// First delay (fixed, linear, exponential).
    pub base_delay_ms: u64,

    /// Upper bound on any single delay.
    pub max_delay_ms: u64,

    /// Lower bound for random backoff.
    pub min_delay_ms: u64,

    /// Growth factor for exponential backoff.
    pub multiplier: f64,

    /// Fraction of each delay that may be shaved off at random, in [0, 1].
    pub jitter_factor: f64,

    /// Response statuses that trigger a retry.
    pub retry_statuses: Vec<u16>,

    /// Transport failure kinds that trigger a retry.
    pub retry_errors: Vec<TransportErrorKind>,

    /// Methods eligible for retry. Must all be idempotent.
    pub retry_methods: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            min_delay_ms: 0,
            multiplier: 2.0,
            jitter_factor: 0.0,
            retry_statuses: vec![408, 429, 500, 502, 503, 504],
            retry_errors: TransportErrorKind::defaults().to_vec(),
            retry_methods: ["GET", "HEAD", "OPTIONS", "DELETE"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        let base = Duration::from_millis(self.base_delay_ms);
        let max = Duration::from_millis(self.max_delay_ms);
        match self.backoff {
            BackoffKind::Fixed => Backoff::fixed(base),
            BackoffKind::Linear => Backoff::linear(base, max),
            BackoffKind::Exponential => Backoff::Exponential {
                base,
                multiplier: self.multiplier,
                max,
            },
            BackoffKind::Random => Backoff::random(Duration::from_millis(self.min_delay_ms), max),
        }
    }

    /// Statuses as `StatusCode`s; out-of-range codes are dropped (and
    /// reported by validation).
    pub fn statuses(&self) -> Vec<StatusCode> {
        self.retry_statuses
            .iter()
            .filter_map(|code| StatusCode::from_u16(*code).ok())
            .collect()
    }

    /// Methods as `Method`s; unparseable names are dropped (and reported by
    /// validation).
    pub fn methods(&self) -> Vec<Method> {
        self.retry_methods
            .iter()
            .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
            .collect()
    }

    /// Build the runtime policy.
    pub fn to_policy(&self) -> Result<RetryPolicy, PolicyError> {
        RetryPolicy::builder()
            .max_attempts(self.max_attempts)
            .backoff(self.backoff())
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .jitter_factor(self.jitter_factor)
            .retry_statuses(self.statuses())
            .retry_errors(self.retry_errors.iter().copied())
            .retry_methods(self.methods())
            .build()
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Add a rate limiting middleware at all.
    pub enabled: bool,

    /// Admission algorithm.
    pub strategy: Strategy,

    /// Sustained permits per second.
    pub permits_per_second: u32,

    /// Token bucket capacity; defaults to `permits_per_second` when unset.
    pub burst_capacity: Option<u32>,

    /// Wait for admission instead of failing fast.
    pub block_on_limit: bool,

    /// Cap on concurrent in-flight calls.
    pub max_concurrency: Option<usize>,

    /// Period of the window bucket sweep.
    pub maintenance_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: Strategy::TokenBucket,
            permits_per_second: 100,
            burst_capacity: None,
            block_on_limit: false,
            max_concurrency: None,
            maintenance_interval_secs: 30,
        }
    }
}

impl RateLimitConfig {
    pub fn to_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            strategy: self.strategy,
            permits_per_second: self.permits_per_second,
            burst_capacity: self.burst_capacity.unwrap_or(self.permits_per_second),
            block_on_limit: self.block_on_limit,
            max_concurrency: self.max_concurrency,
            maintenance_interval: Duration::from_secs(self.maintenance_interval_secs),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline applied to requests that carry none.
    pub request_ms: u64,

    /// Hard cap on any request deadline.
    pub max_request_ms: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: 30_000,
            max_request_ms: None,
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn max_request(&self) -> Option<Duration> {
        self.max_request_ms.map(Duration::from_millis)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter
    /// directive. `RUST_LOG` wins when set.
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: ResilienceConfig = toml::from_str("[retry]\nmax_attempts = 5\n").unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff, BackoffKind::Exponential);
        assert_eq!(config.rate_limit, RateLimitConfig::default());
        assert_eq!(config.timeouts.request(), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_config_builds_policy() {
        let config = RetryConfig {
            backoff: BackoffKind::Linear,
            base_delay_ms: 50,
            max_delay_ms: 120,
            retry_methods: vec!["get".to_string(), "PUT".to_string()],
            ..RetryConfig::default()
        };
        let policy = config.to_policy().unwrap();

        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay_for(1), Duration::from_millis(50));
        assert_eq!(policy.base_delay_for(3), Duration::from_millis(120));
        assert!(policy.applies_to(&Method::PUT));
        assert!(!policy.applies_to(&Method::DELETE));
    }

    #[test]
    fn test_non_idempotent_retry_method_rejected() {
        let config = RetryConfig {
            retry_methods: vec!["POST".to_string()],
            ..RetryConfig::default()
        };
        assert_eq!(
            config.to_policy().unwrap_err(),
            PolicyError::NonIdempotentMethod(Method::POST)
        );
    }

    #[test]
    fn test_rate_limit_burst_defaults_to_rate() {
        let config: RateLimitConfig = toml::from_str(
            "strategy = \"sliding_window\"\npermits_per_second = 20\nmax_concurrency = 4\n",
        )
        .unwrap();
        let limiter = config.to_limiter_config();
        assert_eq!(limiter.strategy, Strategy::SlidingWindow);
        assert_eq!(limiter.burst_capacity, 20);
        assert_eq!(limiter.max_concurrency, Some(4));
    }
}
