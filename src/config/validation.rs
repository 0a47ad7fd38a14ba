//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (delays, rates, jitter, addresses)
//! - Reject retry methods that are not idempotent
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{Method, StatusCode};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::{
    ObservabilityConfig, RateLimitConfig, ResilienceConfig, RetryConfig, TimeoutConfig,
};
use crate::resilience::BackoffKind;

/// One semantic problem, located by its dotted field path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    validate_retry(&config.retry, &mut errors);
    validate_rate_limit(&config.rate_limit, &mut errors);
    validate_timeouts(&config.timeouts, &mut errors);
    validate_observability(&config.observability, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_retry(retry: &RetryConfig, errors: &mut Vec<ValidationError>) {
    if !(0.0..=1.0).contains(&retry.jitter_factor) {
        errors.push(ValidationError::new(
            "retry.jitter_factor",
            format!("must be within [0, 1], got {}", retry.jitter_factor),
        ));
    }
    if retry.backoff == BackoffKind::Exponential
        && (!retry.multiplier.is_finite() || retry.multiplier < 1.0)
    {
        errors.push(ValidationError::new(
            "retry.multiplier",
            format!("must be a finite value >= 1, got {}", retry.multiplier),
        ));
    }
    if retry.backoff == BackoffKind::Random && retry.min_delay_ms > retry.max_delay_ms {
        errors.push(ValidationError::new(
            "retry.min_delay_ms",
            "must not exceed retry.max_delay_ms",
        ));
    }
    for code in &retry.retry_statuses {
        if StatusCode::from_u16(*code).is_err() {
            errors.push(ValidationError::new(
                "retry.retry_statuses",
                format!("{code} is not a valid HTTP status"),
            ));
        }
    }
    for name in &retry.retry_methods {
        match Method::from_bytes(name.to_ascii_uppercase().as_bytes()) {
            Ok(method) if method.is_idempotent() => {}
            Ok(method) => errors.push(ValidationError::new(
                "retry.retry_methods",
                format!("{method} is not idempotent"),
            )),
            Err(_) => errors.push(ValidationError::new(
                "retry.retry_methods",
                format!("{name:?} is not a valid method"),
            )),
        }
    }
}

fn validate_rate_limit(rate_limit: &RateLimitConfig, errors: &mut Vec<ValidationError>) {
    if rate_limit.permits_per_second == 0 {
        errors.push(ValidationError::new(
            "rate_limit.permits_per_second",
            "must be greater than zero",
        ));
    }
    if rate_limit.burst_capacity == Some(0) {
        errors.push(ValidationError::new(
            "rate_limit.burst_capacity",
            "must be greater than zero",
        ));
    }
    if rate_limit.max_concurrency == Some(0) {
        errors.push(ValidationError::new(
            "rate_limit.max_concurrency",
            "must be greater than zero",
        ));
    }
    if rate_limit.maintenance_interval_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.maintenance_interval_secs",
            "must be greater than zero",
        ));
    }
}

fn validate_timeouts(timeouts: &TimeoutConfig, errors: &mut Vec<ValidationError>) {
    if timeouts.request_ms == 0 {
        errors.push(ValidationError::new(
            "timeouts.request_ms",
            "must be greater than zero",
        ));
    }
    if timeouts.max_request_ms == Some(0) {
        errors.push(ValidationError::new(
            "timeouts.max_request_ms",
            "must be greater than zero",
        ));
    }
}

fn validate_observability(observability: &ObservabilityConfig, errors: &mut Vec<ValidationError>) {
    if EnvFilter::try_new(&observability.log_level).is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("{:?} is not a valid filter", observability.log_level),
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", observability.metrics_address),
        ));
    }
}
