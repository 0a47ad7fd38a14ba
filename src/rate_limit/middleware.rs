//! Admission control as a chain middleware.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use super::limiter::RateLimiter;
use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::middleware::{order, AsyncNext, Middleware, Next};

/// Runs the rest of the chain only once the limiter admits the request.
///
/// A denial surfaces as `Err(Error::RateLimited)`; no response is
/// synthesized. When concurrency is capped the slot is held until the
/// downstream call returns.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn denied(&self) -> Error {
        Error::RateLimited {
            strategy: self.limiter.strategy().as_str(),
        }
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "rate_limit"
    }

    fn order(&self) -> i32 {
        order::RATE_LIMIT
    }

    fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let Some(_permit) = self.limiter.permit(request.cancel_token())? else {
            tracing::warn!(
                method = %request.method(),
                target = %request.target(),
                strategy = %self.limiter.strategy(),
                "Rate limit exceeded"
            );
            return Err(self.denied());
        };
        next.run(request)
    }

    fn handle_async<'a>(
        &'a self,
        request: Request,
        next: AsyncNext<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        // Admit eagerly when possible so downstream request phases still run
        // before the future is returned.
        if let Some(permit) = self.limiter.try_permit() {
            let downstream = next.run(request);
            return Box::pin(async move {
                let response = downstream.await;
                drop(permit);
                response
            });
        }
        if !self.limiter.blocks_on_limit() {
            tracing::warn!(
                method = %request.method(),
                target = %request.target(),
                strategy = %self.limiter.strategy(),
                "Rate limit exceeded"
            );
            let err = self.denied();
            return Box::pin(async move { Err(err) });
        }
        Box::pin(async move {
            let cancel = request.cancel_token().cloned();
            let Some(permit) = self.limiter.permit_async(cancel).await? else {
                return Err(self.denied());
            };
            let response = next.run(request).await;
            drop(permit);
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Chain;
    use crate::rate_limit::{RateLimiterConfig, Strategy};
    use crate::resilience::ManualClock;
    use crate::transport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn limiter(config: RateLimiterConfig) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::with_clock(config, Arc::new(ManualClock::new())).unwrap())
    }

    #[test]
    fn test_denied_request_never_reaches_transport() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let chain = Chain::builder(transport::from_fn(move |_req| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Response::ok())
        }))
        .with(RateLimitMiddleware::new(limiter(RateLimiterConfig::new(
            Strategy::FixedWindow,
            2,
        ))))
        .build();

        assert!(chain.call(Request::get("/a")).is_ok());
        assert!(chain.call(Request::get("/b")).is_ok());
        let err = chain.call(Request::get("/c")).unwrap_err();
        assert!(matches!(
            err,
            Error::RateLimited {
                strategy: "fixed_window"
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_slot_released_after_downstream_returns() {
        let limiter = limiter(
            RateLimiterConfig::new(Strategy::TokenBucket, 100).max_concurrency(1),
        );
        let observed = Arc::new(AtomicUsize::new(0));
        let seen = observed.clone();
        let probe = limiter.clone();
        let chain = Chain::builder(transport::from_fn(move |_req| {
            seen.store(probe.in_flight(), Ordering::SeqCst);
            Ok(Response::ok())
        }))
        .with(RateLimitMiddleware::new(limiter.clone()))
        .build();

        chain.call(Request::get("/")).unwrap();
        assert_eq!(observed.load(Ordering::SeqCst), 1);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_async_blocking_mode_waits_for_capacity() {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(
            RateLimiter::with_clock(
                RateLimiterConfig::new(Strategy::LeakyBucket, 10).block_on_limit(true),
                clock.clone(),
            )
            .unwrap(),
        );
        let chain = Chain::builder(transport::from_fn(|_req| Ok(Response::ok())))
            .with(RateLimitMiddleware::new(limiter))
            .build();

        chain.call_async(Request::get("/1")).await.unwrap();
        chain.call_async(Request::get("/2")).await.unwrap();
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(100)]);
    }
}
