//! The rate limiter facade: strategy, concurrency cap and maintenance.

use std::sync::Arc;

use super::algorithm::{Algorithm, Verdict};
use super::concurrency::ConcurrencyLimit;
use super::config::{LimiterError, RateLimiterConfig, Strategy};
use super::leaky_bucket::LeakyBucket;
use super::maintenance;
use super::token_bucket::TokenBucket;
use super::window::{FixedWindow, SlidingWindow};
use crate::error::Result;
use crate::lifecycle::{CancelToken, Shutdown};
use crate::observability::metrics;
use crate::resilience::{Clock, SystemClock};

/// State shared with the maintenance task.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) config: RateLimiterConfig,
    pub(crate) algorithm: Box<dyn Algorithm>,
    pub(crate) concurrency: Option<ConcurrencyLimit>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Shared {
    pub(crate) fn sweep(&self) -> usize {
        self.algorithm.sweep(self.clock.now_nanos())
    }

    fn strategy_name(&self) -> &'static str {
        self.algorithm.strategy().as_str()
    }

    fn acquire_slot(&self, cancel: Option<&CancelToken>) -> Result<bool> {
        let Some(limit) = &self.concurrency else {
            return Ok(true);
        };
        if self.config.block_on_limit {
            limit.acquire_blocking(cancel)?;
            Ok(true)
        } else {
            Ok(limit.try_acquire())
        }
    }

    async fn acquire_slot_async(&self, cancel: Option<CancelToken>) -> Result<bool> {
        let Some(limit) = &self.concurrency else {
            return Ok(true);
        };
        if self.config.block_on_limit {
            limit.acquire(cancel).await?;
            Ok(true)
        } else {
            Ok(limit.try_acquire())
        }
    }

    fn release_slot(&self) -> bool {
        match &self.concurrency {
            Some(limit) => {
                let released = limit.release();
                if released {
                    metrics::record_in_flight(self.strategy_name(), limit.in_flight());
                }
                released
            }
            None => false,
        }
    }

    fn admit(&self, cancel: Option<&CancelToken>) -> Result<bool> {
        loop {
            match self.algorithm.try_acquire(self.clock.now_nanos()) {
                Verdict::Granted => return Ok(true),
                Verdict::Denied { retry_after } if self.config.block_on_limit => {
                    self.clock.sleep(retry_after, cancel)?;
                }
                Verdict::Denied { .. } => return Ok(false),
            }
        }
    }

    async fn admit_async(&self, cancel: Option<CancelToken>) -> Result<bool> {
        loop {
            match self.algorithm.try_acquire(self.clock.now_nanos()) {
                Verdict::Granted => return Ok(true),
                Verdict::Denied { retry_after } if self.config.block_on_limit => {
                    self.clock.sleep_async(retry_after, cancel.clone()).await?;
                }
                Verdict::Denied { .. } => return Ok(false),
            }
        }
    }

    /// Settle the slot taken before admission and record the decision.
    fn conclude(&self, admitted: Result<bool>) -> Result<bool> {
        match admitted {
            Ok(true) => {
                self.record(true);
                Ok(true)
            }
            Ok(false) => {
                self.release_slot();
                self.record(false);
                Ok(false)
            }
            Err(e) => {
                self.release_slot();
                Err(e)
            }
        }
    }

    fn record(&self, granted: bool) {
        let strategy = self.strategy_name();
        metrics::record_rate_limit_decision(strategy, granted);
        if let Some(limit) = &self.concurrency {
            metrics::record_in_flight(strategy, limit.in_flight());
        }
        if !granted {
            tracing::debug!(strategy, "Rate limit exceeded");
        }
    }
}

/// Admission control for outbound calls.
///
/// One instance is shared by any number of threads and tasks. Every hot-path
/// update is a compare-and-swap on an atomic word; no lock is held while
/// deciding.
///
/// With `block_on_limit` unset, a denied acquire returns `Ok(false)` at once.
/// With it set, acquire waits until admitted or until its cancel token fires.
#[derive(Debug)]
pub struct RateLimiter {
    shared: Arc<Shared>,
    shutdown: Shutdown,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Result<Self, LimiterError> {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Build against an explicit clock. Starts the maintenance task when
    /// called inside a tokio runtime.
    pub fn with_clock(
        config: RateLimiterConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LimiterError> {
        config.validate()?;

        let now = clock.now_nanos();
        let algorithm: Box<dyn Algorithm> = match config.strategy {
            Strategy::TokenBucket => Box::new(TokenBucket::new(
                config.permits_per_second,
                config.burst_capacity,
                now,
            )),
            Strategy::LeakyBucket => Box::new(LeakyBucket::new(config.permits_per_second)),
            Strategy::FixedWindow => Box::new(FixedWindow::new(config.permits_per_second)),
            Strategy::SlidingWindow => Box::new(SlidingWindow::new(config.permits_per_second)),
        };
        let concurrency = config.max_concurrency.map(ConcurrencyLimit::new);

        tracing::info!(
            strategy = %config.strategy,
            permits_per_second = config.permits_per_second,
            burst_capacity = config.burst_capacity,
            max_concurrency = ?config.max_concurrency,
            block_on_limit = config.block_on_limit,
            "Rate limiter created"
        );

        let interval = config.maintenance_interval;
        let shared = Arc::new(Shared {
            config,
            algorithm,
            concurrency,
            clock,
        });
        let shutdown = Shutdown::new();
        if maintenance::spawn(Arc::downgrade(&shared), interval, shutdown.subscribe()).is_none() {
            tracing::debug!("No tokio runtime, rate limiter maintenance not started");
        }

        Ok(Self { shared, shutdown })
    }

    pub fn strategy(&self) -> Strategy {
        self.shared.config.strategy
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.shared.config
    }

    /// Whether a denied acquire waits instead of failing fast.
    pub fn blocks_on_limit(&self) -> bool {
        self.shared.config.block_on_limit
    }

    /// Callers currently holding a concurrency slot.
    pub fn in_flight(&self) -> usize {
        self.shared
            .concurrency
            .as_ref()
            .map_or(0, ConcurrencyLimit::in_flight)
    }

    /// Free concurrency slots, or `None` when concurrency is uncapped.
    pub fn available_concurrency(&self) -> Option<usize> {
        self.shared.concurrency.as_ref().map(ConcurrencyLimit::available)
    }

    pub fn max_concurrency(&self) -> Option<usize> {
        self.shared.concurrency.as_ref().map(ConcurrencyLimit::max)
    }

    /// Ask for one permit, blocking the calling thread if configured to.
    ///
    /// `Ok(true)` admits the caller, who must later call
    /// [`release`](Self::release) when concurrency is capped.
    pub fn acquire(&self) -> Result<bool> {
        self.acquire_with(None)
    }

    /// [`acquire`](Self::acquire) whose wait can be interrupted; a cancelled
    /// wait returns `Err(Error::Interrupted)`.
    pub fn acquire_cancellable(&self, cancel: &CancelToken) -> Result<bool> {
        self.acquire_with(Some(cancel))
    }

    fn acquire_with(&self, cancel: Option<&CancelToken>) -> Result<bool> {
        if !self.shared.acquire_slot(cancel)? {
            self.shared.record(false);
            return Ok(false);
        }
        let admitted = self.shared.admit(cancel);
        self.shared.conclude(admitted)
    }

    /// Async variant of [`acquire`](Self::acquire). Waiting happens on
    /// timers, never by blocking a worker thread.
    pub async fn acquire_async(&self) -> Result<bool> {
        self.acquire_async_with(None).await
    }

    pub async fn acquire_async_cancellable(&self, cancel: CancelToken) -> Result<bool> {
        self.acquire_async_with(Some(cancel)).await
    }

    async fn acquire_async_with(&self, cancel: Option<CancelToken>) -> Result<bool> {
        if !self.shared.acquire_slot_async(cancel.clone()).await? {
            self.shared.record(false);
            return Ok(false);
        }
        let admitted = self.shared.admit_async(cancel).await;
        self.shared.conclude(admitted)
    }

    /// Single non-blocking attempt, regardless of `block_on_limit`.
    pub fn try_acquire(&self) -> bool {
        let shared = &self.shared;
        if let Some(limit) = &shared.concurrency {
            if !limit.try_acquire() {
                shared.record(false);
                return false;
            }
        }
        let granted = shared
            .algorithm
            .try_acquire(shared.clock.now_nanos())
            .is_granted();
        matches!(shared.conclude(Ok(granted)), Ok(true))
    }

    /// Give back a concurrency slot. Without a cap, or with nothing in
    /// flight, this does nothing and returns `false`.
    pub fn release(&self) -> bool {
        self.shared.release_slot()
    }

    /// Like [`acquire`](Self::acquire), but the slot is returned when the
    /// guard drops.
    pub fn permit(&self, cancel: Option<&CancelToken>) -> Result<Option<Permit<'_>>> {
        Ok(self.acquire_with(cancel)?.then(|| Permit::new(self)))
    }

    pub async fn permit_async(&self, cancel: Option<CancelToken>) -> Result<Option<Permit<'_>>> {
        Ok(self.acquire_async_with(cancel).await?.then(|| Permit::new(self)))
    }

    pub fn try_permit(&self) -> Option<Permit<'_>> {
        self.try_acquire().then(|| Permit::new(self))
    }

    /// Remove window buckets that can no longer affect a decision.
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    /// Stop the maintenance task. Idempotent; admission keeps working.
    pub fn shutdown(&self) {
        if self.shutdown.trigger() {
            tracing::debug!(strategy = %self.strategy(), "Rate limiter shut down");
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// An admission that holds a concurrency slot until dropped.
#[derive(Debug)]
#[must_use = "dropping the permit releases its slot immediately"]
pub struct Permit<'a> {
    limiter: &'a RateLimiter,
    holds_slot: bool,
}

impl<'a> Permit<'a> {
    fn new(limiter: &'a RateLimiter) -> Self {
        Self {
            limiter,
            holds_slot: limiter.shared.concurrency.is_some(),
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.holds_slot {
            self.limiter.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::resilience::ManualClock;
    use std::thread;
    use std::time::Duration;

    fn manual(config: RateLimiterConfig) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(config, clock.clone()).unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_token_bucket_burst_and_refill() {
        let (limiter, clock) = manual(RateLimiterConfig::new(Strategy::TokenBucket, 10));
        for _ in 0..10 {
            assert!(limiter.acquire().unwrap());
        }
        assert!(!limiter.acquire().unwrap());

        clock.advance(Duration::from_millis(100));
        assert!(limiter.acquire().unwrap());
        assert!(!limiter.acquire().unwrap());
    }

    #[test]
    fn test_fixed_window_admits_limit_per_second() {
        let (limiter, clock) = manual(RateLimiterConfig::new(Strategy::FixedWindow, 5));
        let admitted = (0..10).filter(|_| limiter.acquire().unwrap()).count();
        assert_eq!(admitted, 5);

        clock.advance(Duration::from_secs(1));
        let admitted = (0..10).filter(|_| limiter.acquire().unwrap()).count();
        assert_eq!(admitted, 5);
    }

    #[test]
    fn test_blocking_token_bucket_waits_for_one_token() {
        let (limiter, clock) = manual(
            RateLimiterConfig::new(Strategy::TokenBucket, 4).block_on_limit(true),
        );
        for _ in 0..5 {
            assert!(limiter.acquire().unwrap());
        }
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250)]);
    }

    #[test]
    fn test_blocking_fixed_window_waits_for_next_second() {
        let (limiter, clock) = manual(
            RateLimiterConfig::new(Strategy::FixedWindow, 2).block_on_limit(true),
        );
        clock.advance(Duration::from_millis(300));
        let start = clock.now();
        for _ in 0..3 {
            assert!(limiter.acquire().unwrap());
        }
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(700)]);
        assert_eq!(clock.now() - start, Duration::from_millis(700));
    }

    #[test]
    fn test_blocking_mode_waits_on_the_clock() {
        let (limiter, clock) = manual(
            RateLimiterConfig::new(Strategy::LeakyBucket, 4).block_on_limit(true),
        );
        for _ in 0..3 {
            assert!(limiter.acquire().unwrap());
        }
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250); 2]);
    }

    #[test]
    fn test_blocking_wait_can_be_cancelled() {
        let (limiter, _clock) = manual(
            RateLimiterConfig::new(Strategy::TokenBucket, 1).block_on_limit(true),
        );
        assert!(limiter.acquire().unwrap());

        let token = CancelToken::new();
        token.cancel();
        let err = limiter.acquire_cancellable(&token).unwrap_err();
        assert!(matches!(err, Error::Interrupted));
    }

    #[test]
    fn test_concurrency_cap() {
        let (limiter, _clock) = manual(
            RateLimiterConfig::new(Strategy::TokenBucket, 1000).max_concurrency(2),
        );
        assert!(limiter.acquire().unwrap());
        assert!(limiter.acquire().unwrap());
        assert!(!limiter.acquire().unwrap());
        assert_eq!(limiter.in_flight(), 2);

        assert!(limiter.release());
        assert!(limiter.acquire().unwrap());
    }

    #[test]
    fn test_concurrency_wait_leaves_clock_untouched() {
        let (limiter, clock) = manual(
            RateLimiterConfig::new(Strategy::TokenBucket, 1000)
                .max_concurrency(1)
                .block_on_limit(true),
        );
        let limiter = Arc::new(limiter);
        assert!(limiter.acquire().unwrap());
        let before = clock.now();

        let waiter = {
            let limiter = limiter.clone();
            thread::spawn(move || limiter.acquire())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(limiter.release());

        assert!(waiter.join().unwrap().unwrap());
        assert_eq!(limiter.in_flight(), 1);
        assert_eq!(clock.now(), before);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_shutdown_keeps_granted_permits() {
        let (limiter, _clock) = manual(
            RateLimiterConfig::new(Strategy::TokenBucket, 100).max_concurrency(2),
        );
        assert!(limiter.acquire().unwrap());
        limiter.shutdown();

        assert_eq!(limiter.in_flight(), 1);
        assert!(limiter.release());
        assert_eq!(limiter.in_flight(), 0);
        assert!(limiter.acquire().unwrap());
        assert_eq!(limiter.in_flight(), 1);
    }

    #[test]
    fn test_rate_denial_returns_concurrency_slot() {
        let (limiter, _clock) = manual(
            RateLimiterConfig::new(Strategy::TokenBucket, 1).max_concurrency(5),
        );
        assert!(limiter.acquire().unwrap());
        assert!(!limiter.acquire().unwrap());
        assert_eq!(limiter.in_flight(), 1);
        assert_eq!(limiter.available_concurrency(), Some(4));
    }

    #[test]
    fn test_release_without_cap_is_noop() {
        let (limiter, _clock) = manual(RateLimiterConfig::new(Strategy::FixedWindow, 5));
        assert!(limiter.acquire().unwrap());
        assert!(!limiter.release());
    }

    #[test]
    fn test_permit_guard_releases_on_drop() {
        let (limiter, _clock) = manual(
            RateLimiterConfig::new(Strategy::TokenBucket, 100).max_concurrency(1),
        );
        {
            let permit = limiter.try_permit();
            assert!(permit.is_some());
            assert!(limiter.try_permit().is_none());
        }
        assert_eq!(limiter.in_flight(), 0);
        assert!(limiter.try_permit().is_some());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = RateLimiter::new(RateLimiterConfig::new(Strategy::SlidingWindow, 0)).unwrap_err();
        assert_eq!(err, LimiterError::ZeroRate);
    }

    #[test]
    fn test_concurrent_callers_never_exceed_burst() {
        let limiter = Arc::new(
            RateLimiter::new(RateLimiterConfig::new(Strategy::TokenBucket, 1).burst_capacity(50))
                .unwrap(),
        );
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || (0..50).filter(|_| limiter.acquire().unwrap()).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // One more token may trickle in while the threads run.
        assert!((50..=51).contains(&admitted), "admitted {admitted}");
    }

    #[tokio::test]
    async fn test_async_acquire_matches_sync_decisions() {
        let (limiter, clock) = manual(RateLimiterConfig::new(Strategy::TokenBucket, 2));
        assert!(limiter.acquire_async().await.unwrap());
        assert!(limiter.acquire_async().await.unwrap());
        assert!(!limiter.acquire_async().await.unwrap());
        clock.advance(Duration::from_millis(500));
        assert!(limiter.acquire_async().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_maintenance_task_stops_on_shutdown() {
        let limiter = RateLimiter::new(
            RateLimiterConfig::new(Strategy::SlidingWindow, 10)
                .maintenance_interval(Duration::from_millis(10)),
        )
        .unwrap();
        assert_eq!(limiter.shutdown.receiver_count(), 1);
        limiter.shutdown();
        limiter.shutdown();

        for _ in 0..100 {
            if limiter.shutdown.receiver_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(limiter.shutdown.receiver_count(), 0);
    }
}
