//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! middleware, retry, rate limiter produce:
//!     → tracing events and spans (request id as a span field)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, human or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through spans, not through every log call
//! - Metrics are cheap (atomic increments) and no-ops without a recorder

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
