//! Request ID assignment.

use axum::http::{HeaderName, HeaderValue};
use uuid::Uuid;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::message::context::keys;
use crate::message::{Request, Response};
use crate::middleware::{order, AsyncNext, Middleware, Next};

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Ensures every request carries an `x-request-id` header.
///
/// An ID already present on the request is kept; otherwise a UUID v4 is
/// generated. Either way the ID is mirrored into the context so later
/// middlewares can log it.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestIdMiddleware;

impl RequestIdMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl RequestIdMiddleware {
    fn assign(&self, request: &mut Request) {
        let existing = request
            .headers()
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                // A hyphenated UUID is always a valid header value.
                if let Ok(value) = HeaderValue::from_str(&id) {
                    request.headers_mut().insert(X_REQUEST_ID.clone(), value);
                }
                id
            }
        };
        request.context().insert(keys::REQUEST_ID, id);
    }
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &str {
        "request_id"
    }

    fn order(&self) -> i32 {
        // Ahead of tracing so spans can include it.
        order::TRACING - 10
    }

    fn handle(&self, mut request: Request, next: Next<'_>) -> Result<Response> {
        self.assign(&mut request);
        next.run(request)
    }

    fn handle_async<'a>(
        &'a self,
        mut request: Request,
        next: AsyncNext<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        self.assign(&mut request);
        next.run(request)
    }
}
