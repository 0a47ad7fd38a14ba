//! Conventional order bands, low to high.
//!
//! Purely advisory: the chain sorts on the integer and nothing else.

pub const TRACING: i32 = 100;
pub const METRICS: i32 = 200;
pub const AUTH: i32 = 300;
pub const CACHING: i32 = 400;
pub const RETRY: i32 = 500;
pub const CIRCUIT_BREAKING: i32 = 600;
pub const TIMEOUT: i32 = 700;
pub const RATE_LIMIT: i32 = 800;
pub const TRANSFORM: i32 = 900;
pub const BUSINESS: i32 = 1000;
