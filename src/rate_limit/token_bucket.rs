//! Token bucket: capacity `burst`, refilled continuously at the permit rate.
//!
//! The refill timestamp and the token units are separate atomic words. The
//! thread that moves the timestamp credits the units a moment later, so a
//! caller that observes the moved timestamp may read the units before the
//! credit lands. Refills are counted when they start and when they settle;
//! a caller about to be denied re-checks until no refill is pending and none
//! has settled since it started.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::algorithm::{Algorithm, Verdict, NANOS_PER_SEC};
use super::cas;
use super::config::Strategy;

/// Fixed-point units per token. Refill credit is `elapsed_ns * rate` units,
/// so fractional tokens accrue without floating point.
const UNITS_PER_TOKEN: u64 = NANOS_PER_SEC;

#[derive(Debug)]
pub(crate) struct TokenBucket {
    rate: u64,
    capacity: u64,
    units: AtomicU64,
    last_refill: AtomicU64,
    refills_started: AtomicU64,
    refills_settled: AtomicU64,
}

impl TokenBucket {
    /// Bucket starts full.
    pub(crate) fn new(permits_per_second: u32, burst: u32, now_nanos: u64) -> Self {
        let capacity = u64::from(burst).saturating_mul(UNITS_PER_TOKEN);
        Self {
            rate: u64::from(permits_per_second),
            capacity,
            units: AtomicU64::new(capacity),
            last_refill: AtomicU64::new(now_nanos),
            refills_started: AtomicU64::new(0),
            refills_settled: AtomicU64::new(0),
        }
    }

    /// Whole tokens currently available, without refilling.
    #[cfg(test)]
    pub(crate) fn available(&self) -> u64 {
        self.units.load(Ordering::Acquire) / UNITS_PER_TOKEN
    }

    fn refill(&self, now_nanos: u64) {
        let last = self.last_refill.load(Ordering::Acquire);
        if now_nanos <= last {
            return;
        }
        // Counted before the timestamp moves, so any caller that sees the
        // new timestamp also sees this refill as pending.
        self.refills_started.fetch_add(1, Ordering::AcqRel);
        // Whoever moves the timestamp owns the credit for that interval.
        if self
            .last_refill
            .compare_exchange(last, now_nanos, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let credit = u128::from(now_nanos - last) * u128::from(self.rate);
            let credit = u64::try_from(credit).unwrap_or(u64::MAX);
            let capacity = self.capacity;
            let _ = cas::update(&self.units, |units| {
                Some(units.saturating_add(credit).min(capacity))
            });
        }
        self.refills_settled.fetch_add(1, Ordering::AcqRel);
    }

    fn refill_pending(&self) -> bool {
        self.refills_settled.load(Ordering::Acquire) != self.refills_started.load(Ordering::Acquire)
    }
}

impl Algorithm for TokenBucket {
    fn strategy(&self) -> Strategy {
        Strategy::TokenBucket
    }

    fn try_acquire(&self, now_nanos: u64) -> Verdict {
        loop {
            let settled = self.refills_settled.load(Ordering::Acquire);
            self.refill(now_nanos);
            let units = match cas::update(&self.units, |units| units.checked_sub(UNITS_PER_TOKEN)) {
                Ok(_) => return Verdict::Granted,
                Err(units) => units,
            };
            if self.refill_pending() {
                std::thread::yield_now();
                continue;
            }
            if self.refills_settled.load(Ordering::Acquire) != settled {
                continue;
            }
            let deficit = UNITS_PER_TOKEN - units;
            let wait = deficit.div_ceil(self.rate.max(1));
            return Verdict::Denied {
                retry_after: Duration::from_nanos(wait),
            };
        }
    }
}
