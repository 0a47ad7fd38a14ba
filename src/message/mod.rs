//! Request/response values exchanged with the transport layer.
//!
//! # Data Flow
//! ```text
//! caller builds Request
//!     → middleware chain (request phase may rewrite it, Context collects markers)
//!     → transport produces Response
//!     → middleware chain (response phase, reverse order)
//!     → caller receives Response
//! ```
//!
//! # Design Decisions
//! - Request is a plain value; only its `Context` is shared across clones so
//!   retried attempts and post-processing observe the same sidecar
//! - Response is immutable once built; middlewares derive new values from it
//! - Bodies are `Bytes`, so replaying a request for a retry is a cheap clone

pub mod context;
pub mod request;
pub mod response;

pub use context::Context;
pub use request::Request;
pub use response::{Response, Timing};
