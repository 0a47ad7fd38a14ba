//! Cap on callers holding a permit at the same time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::{Error, Result};
use crate::lifecycle::CancelToken;

/// Longest a blocked thread sleeps before re-checking its cancel token.
const CANCEL_CHECK: Duration = Duration::from_millis(10);

/// Slots are tokio semaphore permits that are forgotten on acquire and
/// handed back explicitly on release, so a slot can outlive any borrow.
///
/// Async waiters queue on the semaphore. Blocking waiters park on a condvar
/// that every release signals, so they wait in real time and never touch
/// the limiter's clock.
#[derive(Debug)]
pub(crate) struct ConcurrencyLimit {
    semaphore: Semaphore,
    max: usize,
    in_flight: AtomicUsize,
    parked: Mutex<()>,
    released: Condvar,
}

impl ConcurrencyLimit {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            semaphore: Semaphore::new(max),
            max,
            in_flight: AtomicUsize::new(0),
            parked: Mutex::new(()),
            released: Condvar::new(),
        }
    }

    pub(crate) fn max(&self) -> usize {
        self.max
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub(crate) fn try_acquire(&self) -> bool {
        match self.semaphore.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                true
            }
            Err(_) => false,
        }
    }

    /// Park the calling thread until a slot is free or `cancel` fires.
    pub(crate) fn acquire_blocking(&self, cancel: Option<&CancelToken>) -> Result<()> {
        let mut guard = self.parked.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            // Checked under the lock: a release between here and the wait
            // cannot signal before this thread is parked.
            if self.try_acquire() {
                return Ok(());
            }
            if cancel.is_some_and(CancelToken::is_cancelled) {
                // Pass on a wakeup this thread may have consumed.
                self.released.notify_one();
                return Err(Error::Interrupted);
            }
            guard = match self.released.wait_timeout(guard, CANCEL_CHECK) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    pub(crate) async fn acquire(&self, cancel: Option<CancelToken>) -> Result<()> {
        let permit = match cancel {
            Some(token) => tokio::select! {
                permit = self.semaphore.acquire() => permit,
                _ = token.cancelled() => return Err(Error::Interrupted),
            },
            None => self.semaphore.acquire().await,
        };
        // The semaphore is never closed.
        let permit = permit.map_err(|_| Error::Interrupted)?;
        permit.forget();
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Return one slot. A release with nothing in flight is ignored and
    /// reported as `false`.
    pub(crate) fn release(&self) -> bool {
        let released = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if released {
            self.semaphore.add_permits(1);
            drop(self.parked.lock().unwrap_or_else(|e| e.into_inner()));
            self.released.notify_one();
        }
        released
    }
}
