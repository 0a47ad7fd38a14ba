//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML/JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ResilienceConfig (validated, immutable)
//!     → to_policy() / to_limiter_config() → runtime components
//!     → build.rs: chain_builder() / install_observability()
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; components are built from it once
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod build;
pub mod loader;
pub mod schema;
pub mod validation;

pub use build::SetupError;
pub use loader::{load_config, ConfigError};
pub use schema::{
    ObservabilityConfig, RateLimitConfig, ResilienceConfig, RetryConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
