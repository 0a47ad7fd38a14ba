//! Per-request deadline enforcement.

use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::middleware::{order, AsyncNext, Middleware, Next};

/// Ensures every request carries a timeout.
///
/// Requests without a timeout get `default_timeout`; with `with_max`, longer
/// timeouts are cut down to the maximum. The async path enforces the
/// deadline itself. The blocking path cannot preempt a running call, so it
/// relies on the transport honoring `Request::timeout`.
///
/// ## Example
///
/// ```rust
/// use resilient_client::middleware::TimeoutMiddleware;
/// use std::time::Duration;
///
/// let timeout = TimeoutMiddleware::new(Duration::from_secs(30))
///     .with_max(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TimeoutMiddleware {
    default_timeout: Duration,
    max_timeout: Option<Duration>,
}

impl TimeoutMiddleware {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            max_timeout: None,
        }
    }

    /// Set a maximum timeout that will be enforced even if the request
    /// asks for a longer one.
    #[must_use]
    pub fn with_max(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = Some(max_timeout);
        self
    }

    /// Resolve and store the effective timeout on the request.
    fn apply(&self, request: &mut Request) -> Result<Duration> {
        let mut timeout = request.timeout().unwrap_or(self.default_timeout);
        if let Some(max) = self.max_timeout {
            timeout = timeout.min(max);
        }
        if timeout.is_zero() {
            return Err(Error::Timeout(timeout));
        }
        request.set_timeout(Some(timeout));
        Ok(timeout)
    }
}

impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &str {
        "timeout"
    }

    fn order(&self) -> i32 {
        order::TIMEOUT
    }

    fn handle(&self, mut request: Request, next: Next<'_>) -> Result<Response> {
        self.apply(&mut request)?;
        next.run(request)
    }

    fn handle_async<'a>(
        &'a self,
        mut request: Request,
        next: AsyncNext<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        let timeout = match self.apply(&mut request) {
            Ok(timeout) => timeout,
            Err(error) => return Box::pin(async move { Err(error) }),
        };
        let downstream = next.run(request);
        Box::pin(async move {
            match tokio::time::timeout(timeout, downstream).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(timeout = ?timeout, "Request deadline elapsed");
                    Err(Error::Timeout(timeout))
                }
            }
        })
    }
}
