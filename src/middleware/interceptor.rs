//! Hook-style middlewares.
//!
//! Most middlewares only need to look at the request on the way in and the
//! response (or error) on the way out. [`Interceptor`] captures that shape
//! and [`Intercept`] turns it into a [`Middleware`] that behaves the same in
//! the blocking and async models.

use futures_util::future::BoxFuture;

use crate::error::{Error, Result};
use crate::message::{Context, Request, Response};
use crate::middleware::{order, AsyncNext, Middleware, Next};

/// Request/response hooks around the rest of the chain.
///
/// ## Example
///
/// ```rust
/// use resilient_client::error::Result;
/// use resilient_client::message::Request;
/// use resilient_client::middleware::{order, Interceptor};
/// use axum::http::{HeaderName, HeaderValue};
///
/// struct AuthInterceptor {
///     token: HeaderValue,
/// }
///
/// impl Interceptor for AuthInterceptor {
///     fn name(&self) -> &str {
///         "auth"
///     }
///
///     fn order(&self) -> i32 {
///         order::AUTH
///     }
///
///     fn intercept_request(&self, request: &mut Request) -> Result<()> {
///         request
///             .headers_mut()
///             .insert(HeaderName::from_static("authorization"), self.token.clone());
///         Ok(())
///     }
/// }
/// ```
pub trait Interceptor: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn order(&self) -> i32 {
        order::BUSINESS
    }

    /// Inspect or rewrite the outgoing request. Returning an error
    /// short-circuits the chain; this interceptor's response hooks are
    /// then skipped.
    fn intercept_request(&self, request: &mut Request) -> Result<()> {
        let _ = request;
        Ok(())
    }

    /// Inspect or replace the response on its way back.
    fn intercept_response(&self, ctx: &Context, response: Response) -> Result<Response> {
        let _ = ctx;
        Ok(response)
    }

    /// Observe a downstream failure. The default rethrows it unchanged; an
    /// implementation may also recover by returning a response.
    fn on_error(&self, ctx: &Context, error: Error) -> Result<Response> {
        let _ = ctx;
        Err(error)
    }
}

/// Adapter running an [`Interceptor`] as a [`Middleware`].
pub struct Intercept<I>(pub I);

impl<I: Interceptor> Intercept<I> {
    fn finish(&self, ctx: &Context, result: Result<Response>) -> Result<Response> {
        match result {
            Ok(response) => self.0.intercept_response(ctx, response),
            Err(error) => self.0.on_error(ctx, error),
        }
    }
}

impl<I: Interceptor> Middleware for Intercept<I> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn order(&self) -> i32 {
        self.0.order()
    }

    fn handle(&self, mut request: Request, next: Next<'_>) -> Result<Response> {
        self.0.intercept_request(&mut request)?;
        let ctx = request.context().clone();
        let result = next.run(request);
        self.finish(&ctx, result)
    }

    fn handle_async<'a>(
        &'a self,
        mut request: Request,
        next: AsyncNext<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        if let Err(error) = self.0.intercept_request(&mut request) {
            return Box::pin(async move { Err(error) });
        }
        let ctx = request.context().clone();
        let downstream = next.run(request);
        Box::pin(async move {
            let result = downstream.await;
            self.finish(&ctx, result)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Chain;
    use crate::transport;
    use axum::http::StatusCode;

    struct Rejecting;

    impl Interceptor for Rejecting {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn intercept_request(&self, _request: &mut Request) -> Result<()> {
            Err(Error::rejected(self.name(), "not allowed"))
        }
    }

    struct Fallback;

    impl Interceptor for Fallback {
        fn name(&self) -> &str {
            "fallback"
        }

        fn on_error(&self, _ctx: &Context, _error: Error) -> Result<Response> {
            Ok(Response::new(StatusCode::SERVICE_UNAVAILABLE).with_body("fallback"))
        }
    }

    #[test]
    fn test_rejection_short_circuits() {
        let chain = Chain::builder(transport::from_fn(|_req| Ok(Response::ok())))
            .with(Intercept(Rejecting))
            .build();

        let err = chain.call(Request::get("/")).unwrap_err();
        assert!(matches!(err, Error::Rejected { ref middleware, .. } if middleware == "rejecting"));
    }

    #[tokio::test]
    async fn test_error_hook_can_recover() {
        let chain = Chain::builder(transport::from_fn(|_req| Err(Error::Interrupted)))
            .with(Intercept(Fallback))
            .build();

        let response = chain.call_async(Request::get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body().as_ref(), b"fallback");
    }
}
