//! Request tracing and timing.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::http::Method;
use futures_util::future::BoxFuture;
use tracing::{Instrument, Span};

use crate::error::Result;
use crate::message::context::keys;
use crate::message::{Context, Request, Response};
use crate::middleware::{order, AsyncNext, Middleware, Next};
use crate::observability::metrics;

/// Wraps the rest of the chain in a span, records timing markers in the
/// request context and request metrics on completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl TracingMiddleware {
    pub fn new() -> Self {
        Self
    }

    fn span(request: &Request) -> Span {
        tracing::info_span!(
            "client_request",
            method = %request.method(),
            target = %request.target(),
            request_id = %request.context().get_str(keys::REQUEST_ID).unwrap_or_default(),
        )
    }

    fn mark_start(request: &Request) {
        let start_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        request
            .context()
            .insert(keys::TIMING_START_MS, u64::try_from(start_ms).unwrap_or(u64::MAX));
        tracing::debug!("Sending request");
    }

    fn observe(method: &Method, ctx: &Context, elapsed: Duration, result: &Result<Response>) {
        ctx.insert(
            keys::TIMING_ELAPSED_MS,
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        );
        match result {
            Ok(response) => {
                tracing::debug!(
                    status = %response.status(),
                    elapsed = ?elapsed,
                    "Request completed"
                );
                metrics::record_request(method.as_str(), response.status().as_str(), elapsed);
            }
            Err(error) => {
                tracing::warn!(error = %error, elapsed = ?elapsed, "Request failed");
                metrics::record_request(method.as_str(), "error", elapsed);
            }
        }
    }
}

impl Middleware for TracingMiddleware {
    fn name(&self) -> &str {
        "tracing"
    }

    fn order(&self) -> i32 {
        order::TRACING
    }

    fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let span = Self::span(&request);
        let _entered = span.enter();

        Self::mark_start(&request);
        let method = request.method().clone();
        let ctx = request.context().clone();
        let start = Instant::now();

        let result = next.run(request);
        Self::observe(&method, &ctx, start.elapsed(), &result);
        result
    }

    fn handle_async<'a>(
        &'a self,
        request: Request,
        next: AsyncNext<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        let span = Self::span(&request);
        let method = request.method().clone();
        let ctx = request.context().clone();
        let start = Instant::now();

        let downstream = span.in_scope(|| {
            Self::mark_start(&request);
            next.run(request)
        });

        Box::pin(
            async move {
                let result = downstream.await;
                Self::observe(&method, &ctx, start.elapsed(), &result);
                result
            }
            .instrument(span),
        )
    }
}
