//! Retry policy and the retry decision function.
//!
//! # Design Decisions
//! - A policy is immutable once built and shared via `Arc` by the middleware
//! - The outcome of an attempt is classified into [`Outcome`] first; the
//!   decision to retry is a separate function of (attempt, outcome), so the
//!   blocking and async retry loops share every rule
//! - Only idempotent methods are ever retried, whatever else is configured

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use rand::Rng;
use thiserror::Error;

use crate::error::{Error, Result, TransportErrorKind};
use crate::message::Response;
use crate::resilience::backoff::Backoff;

/// Custom predicate over received responses.
pub type ResponsePredicate = Arc<dyn Fn(&Response) -> bool + Send + Sync>;
/// Custom predicate over call failures.
pub type ErrorPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Invalid retry policy parameters.
#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("jitter factor must be within [0, 1], got {0}")]
    InvalidJitter(f64),

    #[error("method {0} is not idempotent and cannot be retried")]
    NonIdempotentMethod(Method),

    #[error("backoff multiplier must be a finite value >= 1, got {0}")]
    InvalidMultiplier(f64),
}

/// What went wrong in a failed attempt.
#[derive(Debug)]
pub enum Failure {
    /// A response arrived but its status (or a predicate) marks it failed.
    Status(Response),
    /// The call itself failed.
    Error(Error),
}

/// Classified result of one terminal attempt.
#[derive(Debug)]
pub enum Outcome {
    Success(Response),
    RetryableFailure(Failure),
    FatalFailure(Failure),
}

impl Outcome {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Outcome::RetryableFailure(_))
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> String {
        match self {
            Outcome::Success(r) => r.status().as_u16().to_string(),
            Outcome::RetryableFailure(f) | Outcome::FatalFailure(f) => match f {
                Failure::Status(r) => r.status().as_u16().to_string(),
                Failure::Error(e) => e
                    .transport_kind()
                    .map(|k| k.as_str().to_string())
                    .unwrap_or_else(|| "error".to_string()),
            },
        }
    }

    /// Hand the attempt's result back unchanged: responses (even failed
    /// ones) as `Ok`, errors as `Err`.
    pub fn into_result(self) -> Result<Response> {
        match self {
            Outcome::Success(response)
            | Outcome::RetryableFailure(Failure::Status(response))
            | Outcome::FatalFailure(Failure::Status(response)) => Ok(response),
            Outcome::RetryableFailure(Failure::Error(error))
            | Outcome::FatalFailure(Failure::Error(error)) => Err(error),
        }
    }
}

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Return the outcome to the caller.
    Finish,
    /// Wait `delay`, then perform retry number `retry` (1-based).
    Retry { retry: u32, delay: Duration },
}

/// Immutable retry configuration.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    max_delay: Duration,
    jitter_factor: f64,
    retry_statuses: HashSet<StatusCode>,
    retry_errors: HashSet<TransportErrorKind>,
    response_predicate: Option<ResponsePredicate>,
    error_predicate: Option<ErrorPredicate>,
    retry_methods: HashSet<Method>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("max_delay", &self.max_delay)
            .field("jitter_factor", &self.jitter_factor)
            .field("retry_statuses", &self.retry_statuses)
            .field("retry_errors", &self.retry_errors)
            .field("response_predicate", &self.response_predicate.is_some())
            .field("error_predicate", &self.error_predicate.is_some())
            .field("retry_methods", &self.retry_methods)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.0,
            retry_statuses: default_statuses(),
            retry_errors: TransportErrorKind::defaults().into_iter().collect(),
            response_predicate: None,
            error_predicate: None,
            retry_methods: default_methods(),
        }
    }
}

fn default_statuses() -> HashSet<StatusCode> {
    [
        StatusCode::REQUEST_TIMEOUT,
        StatusCode::TOO_MANY_REQUESTS,
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::BAD_GATEWAY,
        StatusCode::SERVICE_UNAVAILABLE,
        StatusCode::GATEWAY_TIMEOUT,
    ]
    .into_iter()
    .collect()
}

fn default_methods() -> HashSet<Method> {
    [Method::GET, Method::HEAD, Method::OPTIONS, Method::DELETE]
        .into_iter()
        .collect()
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Retries allowed after the original attempt.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    /// Whether requests with this method may be retried at all.
    pub fn applies_to(&self, method: &Method) -> bool {
        method.is_idempotent() && self.retry_methods.contains(method)
    }

    pub fn is_retryable_response(&self, response: &Response) -> bool {
        self.retry_statuses.contains(&response.status())
            || self
                .response_predicate
                .as_ref()
                .is_some_and(|predicate| predicate(response))
    }

    /// An error is retryable if any link of its cause chain has a
    /// configured kind, or the custom predicate accepts it.
    pub fn is_retryable_error(&self, error: &Error) -> bool {
        error
            .kinds_in_chain()
            .iter()
            .any(|kind| self.retry_errors.contains(kind))
            || self
                .error_predicate
                .as_ref()
                .is_some_and(|predicate| predicate(error))
    }

    pub fn classify(&self, result: Result<Response>) -> Outcome {
        match result {
            Ok(response) if self.is_retryable_response(&response) => {
                Outcome::RetryableFailure(Failure::Status(response))
            }
            Ok(response) => Outcome::Success(response),
            Err(error) if self.is_retryable_error(&error) => {
                Outcome::RetryableFailure(Failure::Error(error))
            }
            Err(error) => Outcome::FatalFailure(Failure::Error(error)),
        }
    }

    /// Decide what follows an attempt, given how many retries already ran.
    pub fn decide(&self, retries_done: u32, outcome: &Outcome) -> Decision {
        if !outcome.is_retryable() || retries_done >= self.max_attempts {
            return Decision::Finish;
        }
        let retry = retries_done + 1;
        Decision::Retry {
            retry,
            delay: self.delay_for(retry),
        }
    }

    /// Backoff delay for a retry, clamped to `[0, max_delay]`, before jitter.
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        self.backoff.delay(retry).min(self.max_delay)
    }

    /// Backoff delay with jitter applied: scaled by a uniform factor in
    /// `[1 - jitter_factor, 1]`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.base_delay_for(retry);
        if self.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range((1.0 - self.jitter_factor)..=1.0);
        delay.mul_f64(factor)
    }
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
        }
    }

    pub fn max_attempts(mut self, retries: u32) -> Self {
        self.policy.max_attempts = retries;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.policy.backoff = backoff;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.policy.max_delay = max_delay;
        self
    }

    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.policy.jitter_factor = factor;
        self
    }

    /// Replace the retryable status set.
    pub fn retry_statuses(mut self, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        self.policy.retry_statuses = statuses.into_iter().collect();
        self
    }

    /// Replace the retryable transport error kinds.
    pub fn retry_errors(mut self, kinds: impl IntoIterator<Item = TransportErrorKind>) -> Self {
        self.policy.retry_errors = kinds.into_iter().collect();
        self
    }

    /// Replace the set of methods eligible for retry.
    pub fn retry_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.policy.retry_methods = methods.into_iter().collect();
        self
    }

    pub fn retry_on_response<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        self.policy.response_predicate = Some(Arc::new(predicate));
        self
    }

    pub fn retry_on_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.policy.error_predicate = Some(Arc::new(predicate));
        self
    }

    pub fn build(self) -> std::result::Result<RetryPolicy, PolicyError> {
        let policy = self.policy;
        if !(0.0..=1.0).contains(&policy.jitter_factor) {
            return Err(PolicyError::InvalidJitter(policy.jitter_factor));
        }
        if let Backoff::Exponential { multiplier, .. } = policy.backoff {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(PolicyError::InvalidMultiplier(multiplier));
            }
        }
        if let Some(method) = policy.retry_methods.iter().find(|m| !m.is_idempotent()) {
            return Err(PolicyError::NonIdempotentMethod(method.clone()));
        }
        Ok(policy)
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
