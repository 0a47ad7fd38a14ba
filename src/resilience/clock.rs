//! Time source and the delay-then-continue primitive.
//!
//! Every timed decision in the crate (backoff waits, bucket refills, window
//! boundaries, admission waits) goes through a [`Clock`], so tests can swap
//! in [`ManualClock`] and run without real sleeps.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures_util::future::BoxFuture;

use crate::error::{Error, Result};
use crate::lifecycle::CancelToken;

/// Injectable time source.
///
/// `now` is a monotonic reading expressed as time since the UNIX epoch, so
/// it can be bucketed into epoch seconds without mixing clocks.
pub trait Clock: Send + Sync + fmt::Debug + 'static {
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`, or until `cancel` fires.
    fn sleep(&self, duration: Duration, cancel: Option<&CancelToken>) -> Result<()>;

    /// Wait for `duration` on a timer without occupying a worker thread.
    fn sleep_async(
        &self,
        duration: Duration,
        cancel: Option<CancelToken>,
    ) -> BoxFuture<'static, Result<()>>;

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.now().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Wall-clock anchored, monotonic clock backed by the OS and tokio timers.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    anchor_wall: Duration,
    anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            anchor_wall: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default(),
            anchor: Instant::now(),
        }
    }

    /// Shared default clock handle.
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.anchor_wall + self.anchor.elapsed()
    }

    fn sleep(&self, duration: Duration, cancel: Option<&CancelToken>) -> Result<()> {
        match cancel {
            Some(token) => {
                if token.wait_timeout(duration) {
                    return Err(Error::Interrupted);
                }
            }
            None => std::thread::sleep(duration),
        }
        Ok(())
    }

    fn sleep_async(
        &self,
        duration: Duration,
        cancel: Option<CancelToken>,
    ) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            match cancel {
                Some(token) => tokio::select! {
                    _ = tokio::time::sleep(duration) => Ok(()),
                    _ = token.cancelled() => Err(Error::Interrupted),
                },
                None => {
                    tokio::time::sleep(duration).await;
                    Ok(())
                }
            }
        })
    }
}

/// Deterministic clock for tests. Sleeping advances virtual time instantly
/// and records the requested duration.
#[derive(Debug)]
pub struct ManualClock {
    nanos: AtomicU64,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Starts on an exact second boundary (2023-11-14T22:13:20Z).
    pub fn new() -> Self {
        Self::starting_at(Duration::from_secs(1_700_000_000))
    }

    pub fn starting_at(start: Duration) -> Self {
        Self {
            nanos: AtomicU64::new(u64::try_from(start.as_nanos()).unwrap_or(u64::MAX)),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(by, Ordering::AcqRel);
    }

    /// Durations passed to `sleep`/`sleep_async`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        self.advance(duration);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }

    fn sleep(&self, duration: Duration, cancel: Option<&CancelToken>) -> Result<()> {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(Error::Interrupted);
        }
        self.record(duration);
        Ok(())
    }

    fn sleep_async(
        &self,
        duration: Duration,
        cancel: Option<CancelToken>,
    ) -> BoxFuture<'static, Result<()>> {
        let outcome = self.sleep(duration, cancel.as_ref());
        Box::pin(async move { outcome })
    }
}
