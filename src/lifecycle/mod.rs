//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Background tasks (shutdown.rs):
//!     RateLimiter::new → subscribe → maintenance loop
//!     RateLimiter::shutdown → trigger → loop exits
//!
//! Per-request cancellation (cancel.rs):
//!     caller attaches CancelToken to Request
//!     → retry backoff / admission wait selects on the token
//!     → cancel() interrupts the wait with Error::Interrupted
//! ```
//!
//! # Design Decisions
//! - Shutdown only stops background work; it never revokes granted permits
//! - Cancellation is best effort: an attempt already in flight completes

pub mod cancel;
pub mod shutdown;

pub use cancel::CancelToken;
pub use shutdown::Shutdown;
