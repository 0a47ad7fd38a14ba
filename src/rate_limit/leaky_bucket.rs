//! Leaky bucket: admissions are spaced at least `1 / rate` apart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::algorithm::{Algorithm, Verdict, NANOS_PER_SEC};
use super::config::Strategy;

#[derive(Debug)]
pub(crate) struct LeakyBucket {
    interval: u64,
    next_eligible: AtomicU64,
}

impl LeakyBucket {
    pub(crate) fn new(permits_per_second: u32) -> Self {
        Self {
            interval: (NANOS_PER_SEC / u64::from(permits_per_second.max(1))).max(1),
            next_eligible: AtomicU64::new(0),
        }
    }
}

impl Algorithm for LeakyBucket {
    fn strategy(&self) -> Strategy {
        Strategy::LeakyBucket
    }

    fn try_acquire(&self, now_nanos: u64) -> Verdict {
        let mut next = self.next_eligible.load(Ordering::Acquire);
        loop {
            if now_nanos < next {
                return Verdict::Denied {
                    retry_after: Duration::from_nanos(next - now_nanos),
                };
            }
            match self.next_eligible.compare_exchange_weak(
                next,
                now_nanos.saturating_add(self.interval),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Verdict::Granted,
                Err(observed) => next = observed,
            }
        }
    }
}
