//! Middleware chain subsystem.
//!
//! # Data Flow
//! ```text
//! Chain::call(request)
//!     → Next::run → middleware[0].handle(request, next)
//!         pre-processing (may rewrite request or short-circuit)
//!         → next.run → middleware[1].handle … → Transport::send
//!         post-processing (may rewrite response or intercept error)
//!     ← Response / Error unwinds in exact reverse order
//! ```
//!
//! # Design Decisions
//! - Onion composition: each middleware wraps the rest of the chain, so the
//!   response phase only visits middlewares whose request phase ran
//! - Middlewares are sorted once, stably, by `order()`; bands in [`order`] are
//!   conventions and the chain never treats any band specially
//! - The async variant runs request-phase code eagerly when `call_async` is
//!   invoked; only the downstream result is deferred
//! - No per-request state lives on a middleware or on the chain

pub mod chain;
pub mod interceptor;
pub mod order;
pub mod request_id;
pub mod service;
pub mod timeout;
pub mod trace;

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::message::{Request, Response};
use crate::transport::Transport;

pub use chain::{Chain, ChainBuilder};
pub use interceptor::{Intercept, Interceptor};
pub use request_id::RequestIdMiddleware;
pub use service::ChainService;
pub use timeout::TimeoutMiddleware;
pub use trace::TracingMiddleware;

/// An interceptor wrapped around the rest of the chain.
///
/// Both `handle` and `handle_async` default to passing the request through
/// untouched, and errors from downstream propagate unchanged unless a
/// middleware chooses to inspect them. Implementations that add behavior
/// should override both methods so the blocking and async models agree.
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs and rejection errors.
    fn name(&self) -> &str;

    /// Position in the chain; lower runs first on the way in.
    fn order(&self) -> i32 {
        order::BUSINESS
    }

    fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        next.run(request)
    }

    fn handle_async<'a>(
        &'a self,
        request: Request,
        next: AsyncNext<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        next.run(request)
    }
}

/// Remainder of a blocking chain invocation.
///
/// `Next` is `Copy`, so a middleware may run the rest of the chain more than
/// once (this is how retries replay downstream work).
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub(crate) fn new(rest: &'a [Arc<dyn Middleware>], transport: &'a dyn Transport) -> Self {
        Self { rest, transport }
    }

    /// Pass the request to the next middleware, or to the transport when
    /// no middleware is left.
    pub fn run(self, request: Request) -> Result<Response> {
        match self.rest.split_first() {
            Some((current, rest)) => current.handle(request, Next::new(rest, self.transport)),
            None => self.transport.send(request),
        }
    }

    /// Number of middlewares still ahead of the transport.
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

/// Remainder of an async chain invocation.
#[derive(Clone, Copy)]
pub struct AsyncNext<'a> {
    rest: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
}

impl<'a> AsyncNext<'a> {
    pub(crate) fn new(rest: &'a [Arc<dyn Middleware>], transport: &'a dyn Transport) -> Self {
        Self { rest, transport }
    }

    /// Invoke the next middleware immediately and return its pending result.
    pub fn run(self, request: Request) -> BoxFuture<'a, Result<Response>> {
        match self.rest.split_first() {
            Some((current, rest)) => {
                current.handle_async(request, AsyncNext::new(rest, self.transport))
            }
            None => self.transport.send_async(request),
        }
    }

    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}
