//! Terminal transport boundary.
//!
//! # Data Flow
//! ```text
//! last middleware → Next::run → Transport::send / send_async
//!     → wire I/O (HTTP, TCP, UDP, WebSocket…) lives behind this trait
//!     → Response or TransportError
//! ```
//!
//! # Design Decisions
//! - The chain calls the transport exactly once per attempt; replays are
//!   the retry middleware's business, never the transport's
//! - Closure adapters exist so tests and small integrations need no types
//! - Blocking sends of async transports reuse the ambient multi-thread
//!   runtime when there is one, else spin up a private current-thread one

pub mod http;

use std::future::Future;

use futures_util::future::BoxFuture;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::error::{Error, Result};
use crate::message::{Request, Response};

pub use self::http::HttpTransport;

/// The terminal call supplied by the transport layer.
pub trait Transport: Send + Sync + 'static {
    /// Perform the call, blocking the current thread.
    fn send(&self, request: Request) -> Result<Response>;

    /// Perform the call asynchronously.
    fn send_async(&self, request: Request) -> BoxFuture<'_, Result<Response>>;
}

/// Transport backed by a blocking closure.
pub struct FnTransport<F> {
    f: F,
}

/// Wrap a blocking closure as a transport. The async path runs the closure
/// when the future is first polled.
pub fn from_fn<F>(f: F) -> FnTransport<F>
where
    F: Fn(Request) -> Result<Response> + Send + Sync + 'static,
{
    FnTransport { f }
}

impl<F> Transport for FnTransport<F>
where
    F: Fn(Request) -> Result<Response> + Send + Sync + 'static,
{
    fn send(&self, request: Request) -> Result<Response> {
        (self.f)(request)
    }

    fn send_async(&self, request: Request) -> BoxFuture<'_, Result<Response>> {
        Box::pin(async move { (self.f)(request) })
    }
}

/// Transport backed by an async closure.
pub struct AsyncFnTransport<F> {
    f: F,
}

pub fn from_async_fn<F, Fut>(f: F) -> AsyncFnTransport<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    AsyncFnTransport { f }
}

impl<F, Fut> Transport for AsyncFnTransport<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    fn send(&self, request: Request) -> Result<Response> {
        block_on((self.f)(request))
    }

    fn send_async(&self, request: Request) -> BoxFuture<'_, Result<Response>> {
        Box::pin((self.f)(request))
    }
}

/// Drive a transport future to completion from blocking code.
///
/// Fails instead of deadlocking when called on a current-thread runtime.
pub(crate) fn block_on<F>(future: F) -> Result<Response>
where
    F: Future<Output = Result<Response>>,
{
    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::CurrentThread => Err(Error::InvalidRequest(
                "blocking send called from a current-thread runtime; use call_async".into(),
            )),
            _ => tokio::task::block_in_place(|| handle.block_on(future)),
        },
        Err(_) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(future),
    }
}
