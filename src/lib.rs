//! Client-side resilience pipeline.
//!
//! Outbound calls travel through an ordered [`Chain`](middleware::Chain) of
//! middlewares in front of a [`Transport`](transport::Transport). Built-in
//! pieces cover retries with backoff ([`resilience`]), admission control
//! ([`rate_limit`]), request ids, tracing and deadlines ([`middleware`]).
//! Every chain can be called blocking or async with the same semantics.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod middleware;
pub mod observability;
pub mod rate_limit;
pub mod resilience;
pub mod transport;

pub use config::ResilienceConfig;
pub use error::{Error, Result, TransportError, TransportErrorKind};
pub use lifecycle::{CancelToken, Shutdown};
pub use message::{Context, Request, Response};
pub use middleware::{Chain, Middleware};
pub use rate_limit::{RateLimitMiddleware, RateLimiter, RateLimiterConfig, Strategy};
pub use resilience::{Backoff, RetryMiddleware, RetryPolicy};
pub use transport::{HttpTransport, Transport};
