//! Rate limiting subsystem.
//!
//! # Data Flow
//! ```text
//! RateLimiter::acquire / acquire_async / RateLimitMiddleware
//!     → concurrency.rs (optional cap on callers holding a slot)
//!     → algorithm (token_bucket.rs | leaky_bucket.rs | window.rs)
//!         granted → caller proceeds, release() returns the slot
//!         denied  → fail fast with false, or wait on the clock and retry
//!
//! maintenance.rs (tokio task, only when built inside a runtime):
//!     every interval → sweep expired window buckets
//!     RateLimiter::shutdown / drop → task exits
//! ```
//!
//! # Design Decisions
//! - All strategies read one nanosecond clock anchored to the UNIX epoch
//! - Hot-path state is atomic words updated by compare-and-swap; window
//!   buckets live in a sharded `DashMap`
//! - The concurrency slot is taken before the rate check and returned if
//!   the rate check denies, so a denied caller never holds a slot
//! - Inside a chain a denial is an error, never a synthesized 429

mod algorithm;
mod cas;
mod concurrency;
pub mod config;
mod leaky_bucket;
pub mod limiter;
mod maintenance;
pub mod middleware;
mod token_bucket;
pub mod window;

pub use algorithm::Verdict;
pub use config::{LimiterError, RateLimiterConfig, Strategy};
pub use limiter::{Permit, RateLimiter};
pub use middleware::RateLimitMiddleware;
