//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! RetryMiddleware::handle(request, next)
//!     → policy.rs applies_to(method)?  no → single pass-through
//!     → next.run(clone) → classify → Outcome
//!     → decide(retries_done, outcome)
//!         Finish → return the outcome as-is
//!         Retry  → backoff.rs delay + jitter → clock.rs sleep → next attempt
//! ```
//!
//! # Design Decisions
//! - Retries only for idempotent requests (GET, HEAD, OPTIONS, PUT, DELETE)
//! - Jittered backoff prevents thundering herd
//! - Every wait goes through an injectable `Clock`, so timing is testable
//!   without real sleeps
//! - All resilience logic is composable middleware

pub mod backoff;
pub mod clock;
pub mod policy;
pub mod retries;

pub use backoff::{Backoff, BackoffKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use policy::{Decision, Failure, Outcome, PolicyError, RetryPolicy, RetryPolicyBuilder};
pub use retries::RetryMiddleware;
