//! Retry middleware.
//!
//! # Responsibilities
//! - Replay the rest of the chain for idempotent requests that fail in a
//!   retryable way
//! - Wait out the policy's backoff between attempts, interruptibly
//! - Hand back the last outcome verbatim once retries run out
//!
//! # Design Decisions
//! - The blocking and async loops share `RetryPolicy::decide`, so both
//!   models make identical decisions and wait identical delays
//! - Each attempt gets a fresh clone of the original request
//! - The number of retries performed is written to the request context under
//!   `retry.attempts`

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::message::context::keys;
use crate::message::{Request, Response};
use crate::middleware::{order, AsyncNext, Middleware, Next};
use crate::observability::metrics;
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::policy::{Decision, Outcome, RetryPolicy};

/// Re-runs downstream work according to a [`RetryPolicy`].
///
/// ## Example
///
/// ```rust
/// use resilient_client::resilience::{Backoff, RetryMiddleware, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::builder()
///     .max_attempts(3)
///     .backoff(Backoff::exponential(Duration::from_millis(100), Duration::from_secs(5)))
///     .jitter_factor(0.2)
///     .build()
///     .unwrap();
/// let retry = RetryMiddleware::new(policy);
/// ```
#[derive(Debug, Clone)]
pub struct RetryMiddleware {
    policy: Arc<RetryPolicy>,
    clock: Arc<dyn Clock>,
}

impl RetryMiddleware {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            clock: SystemClock::shared(),
        }
    }

    /// Use `clock` for backoff waits.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Log and count a scheduled retry.
    fn note_retry(&self, request: &Request, outcome: &Outcome, retry: u32, delay: Duration) {
        let reason = outcome.reason();
        tracing::info!(
            method = %request.method(),
            target = %request.target(),
            retry,
            max_retries = self.policy.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "Retrying request"
        );
        metrics::record_retry(request.method().as_str(), &reason);
    }

    fn finish(&self, request: &Request, retries: u32, outcome: Outcome) -> Result<Response> {
        request.context().insert(keys::RETRY_ATTEMPTS, retries);
        if outcome.is_retryable() {
            tracing::warn!(
                method = %request.method(),
                target = %request.target(),
                retries,
                reason = %outcome.reason(),
                "Retries exhausted"
            );
            metrics::record_retries_exhausted(request.method().as_str());
        }
        outcome.into_result()
    }
}

impl Middleware for RetryMiddleware {
    fn name(&self) -> &str {
        "retry"
    }

    fn order(&self) -> i32 {
        order::RETRY
    }

    fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        if !self.policy.applies_to(request.method()) {
            return next.run(request);
        }

        let mut retries = 0;
        loop {
            let outcome = self.policy.classify(next.run(request.clone()));
            match self.policy.decide(retries, &outcome) {
                Decision::Finish => return self.finish(&request, retries, outcome),
                Decision::Retry { retry, delay } => {
                    self.note_retry(&request, &outcome, retry, delay);
                    self.clock.sleep(delay, request.cancel_token())?;
                    retries = retry;
                }
            }
        }
    }

    fn handle_async<'a>(
        &'a self,
        request: Request,
        next: AsyncNext<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        if !self.policy.applies_to(request.method()) {
            return next.run(request);
        }

        // The first attempt starts before the future is returned.
        let first = next.run(request.clone());
        Box::pin(async move {
            let mut attempt = first;
            let mut retries = 0;
            loop {
                let outcome = self.policy.classify(attempt.await);
                match self.policy.decide(retries, &outcome) {
                    Decision::Finish => return self.finish(&request, retries, outcome),
                    Decision::Retry { retry, delay } => {
                        self.note_retry(&request, &outcome, retry, delay);
                        self.clock
                            .sleep_async(delay, request.cancel_token().cloned())
                            .await?;
                        retries = retry;
                        attempt = next.run(request.clone());
                    }
                }
            }
        })
    }
}
