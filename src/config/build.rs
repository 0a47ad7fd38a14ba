//! Wiring a loaded config into running components.

use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;
use tracing_subscriber::util::TryInitError;

use super::schema::ResilienceConfig;
use crate::middleware::{
    Chain, ChainBuilder, RequestIdMiddleware, TimeoutMiddleware, TracingMiddleware,
};
use crate::observability::{init_logging, init_metrics};
use crate::rate_limit::{LimiterError, RateLimitMiddleware, RateLimiter};
use crate::resilience::{PolicyError, RetryMiddleware};
use crate::transport::Transport;

/// Failure to turn a config into components.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("retry policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("rate limiter: {0}")]
    Limiter(#[from] LimiterError),

    #[error("logging: {0}")]
    Logging(#[from] TryInitError),

    #[error("invalid metrics address {address:?}: {source}")]
    MetricsAddress {
        address: String,
        #[source]
        source: AddrParseError,
    },

    #[error("metrics exporter: {0}")]
    Metrics(#[from] BuildError),
}

impl ResilienceConfig {
    /// Chain builder carrying the configured middlewares.
    ///
    /// Request id, tracing and timeout are always present. Retry and rate
    /// limiting follow their `enabled` switches. Callers may add their own
    /// middlewares before building.
    pub fn chain_builder(&self, transport: impl Transport) -> Result<ChainBuilder, SetupError> {
        self.chain_builder_shared(Arc::new(transport))
    }

    pub fn chain_builder_shared(
        &self,
        transport: Arc<dyn Transport>,
    ) -> Result<ChainBuilder, SetupError> {
        let mut timeout = TimeoutMiddleware::new(self.timeouts.request());
        if let Some(max) = self.timeouts.max_request() {
            timeout = timeout.with_max(max);
        }

        let mut builder = Chain::builder_shared(transport)
            .with(RequestIdMiddleware::new())
            .with(TracingMiddleware::new())
            .with(timeout);

        if self.retry.enabled {
            builder = builder.with(RetryMiddleware::new(self.retry.to_policy()?));
        }
        if self.rate_limit.enabled {
            let limiter = RateLimiter::new(self.rate_limit.to_limiter_config())?;
            builder = builder.with(RateLimitMiddleware::new(Arc::new(limiter)));
        }
        Ok(builder)
    }

    /// Install the global subscriber and, when enabled, the metrics exporter.
    ///
    /// The exporter needs a tokio runtime to serve scrapes.
    pub fn install_observability(&self) -> Result<(), SetupError> {
        let observability = &self.observability;
        let metrics_addr = if observability.metrics_enabled {
            let addr = observability
                .metrics_address
                .parse::<SocketAddr>()
                .map_err(|source| SetupError::MetricsAddress {
                    address: observability.metrics_address.clone(),
                    source,
                })?;
            Some(addr)
        } else {
            None
        };

        init_logging(observability)?;
        if let Some(addr) = metrics_addr {
            init_metrics(addr)?;
        }
        Ok(())
    }
}
