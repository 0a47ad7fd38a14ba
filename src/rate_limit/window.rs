//! Fixed and sliding window counters over one-second buckets.
//!
//! # Design Decisions
//! - Buckets are keyed by whole epoch seconds in a `DashMap`; the counter is
//!   an `Arc<AtomicU64>` cloned out of the map so increments never hold a
//!   shard lock
//! - The sliding window sums the 60 most recent buckets against a budget of
//!   `rate * 60`. Admissions are exact per bucket, so across an arbitrary
//!   60 second span the count may exceed the budget by at most one bucket
//! - A new bucket prunes expired ones inline, so memory stays bounded even
//!   when no maintenance task runs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use super::algorithm::{Algorithm, Verdict, NANOS_PER_SEC};
use super::cas;
use super::config::Strategy;

/// Seconds of history a sliding window considers.
pub const WINDOW_SECS: u64 = 60;

/// Per-second admission counters.
#[derive(Debug, Default)]
pub(crate) struct Buckets {
    counters: DashMap<u64, Arc<AtomicU64>>,
}

impl Buckets {
    fn counter(&self, second: u64) -> Arc<AtomicU64> {
        if let Some(counter) = self.counters.get(&second) {
            return counter.value().clone();
        }
        let counter = self
            .counters
            .entry(second)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .value()
            .clone();
        if self.counters.len() as u64 > WINDOW_SECS + 1 {
            self.prune_before(second.saturating_sub(WINDOW_SECS - 1));
        }
        counter
    }

    fn count(&self, second: u64) -> u64 {
        self.counters
            .get(&second)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Sum of the buckets in `first..=last`.
    fn sum(&self, first: u64, last: u64) -> u64 {
        (first..=last).map(|s| self.count(s)).sum()
    }

    fn prune_before(&self, oldest_kept: u64) -> usize {
        let before = self.counters.len();
        self.counters.retain(|second, _| *second >= oldest_kept);
        before.saturating_sub(self.counters.len())
    }

    fn len(&self) -> usize {
        self.counters.len()
    }
}

fn until_next_second(now_nanos: u64) -> Duration {
    Duration::from_nanos(NANOS_PER_SEC - now_nanos % NANOS_PER_SEC)
}

/// At most `rate` admissions per calendar second.
#[derive(Debug)]
pub(crate) struct FixedWindow {
    limit: u64,
    buckets: Buckets,
}

impl FixedWindow {
    pub(crate) fn new(permits_per_second: u32) -> Self {
        Self {
            limit: u64::from(permits_per_second),
            buckets: Buckets::default(),
        }
    }
}

impl Algorithm for FixedWindow {
    fn strategy(&self) -> Strategy {
        Strategy::FixedWindow
    }

    fn try_acquire(&self, now_nanos: u64) -> Verdict {
        let counter = self.buckets.counter(now_nanos / NANOS_PER_SEC);
        let limit = self.limit;
        match cas::update(&counter, |n| (n < limit).then_some(n + 1)) {
            Ok(_) => Verdict::Granted,
            Err(_) => Verdict::Denied {
                retry_after: until_next_second(now_nanos),
            },
        }
    }

    fn sweep(&self, now_nanos: u64) -> usize {
        let second = now_nanos / NANOS_PER_SEC;
        self.buckets.prune_before(second.saturating_sub(WINDOW_SECS))
    }

    fn retained(&self) -> usize {
        self.buckets.len()
    }
}

/// At most `rate * 60` admissions across the trailing 60 buckets.
#[derive(Debug)]
pub(crate) struct SlidingWindow {
    budget: u64,
    buckets: Buckets,
}

impl SlidingWindow {
    pub(crate) fn new(permits_per_second: u32) -> Self {
        Self {
            budget: u64::from(permits_per_second) * WINDOW_SECS,
            buckets: Buckets::default(),
        }
    }

    /// Admissions counted in the window ending at `now_nanos`.
    pub(crate) fn in_window(&self, now_nanos: u64) -> u64 {
        let second = now_nanos / NANOS_PER_SEC;
        self.buckets
            .sum(second.saturating_sub(WINDOW_SECS - 1), second)
    }
}

impl Algorithm for SlidingWindow {
    fn strategy(&self) -> Strategy {
        Strategy::SlidingWindow
    }

    fn try_acquire(&self, now_nanos: u64) -> Verdict {
        let counter = self.buckets.counter(now_nanos / NANOS_PER_SEC);
        counter.fetch_add(1, Ordering::AcqRel);
        if self.in_window(now_nanos) > self.budget {
            counter.fetch_sub(1, Ordering::AcqRel);
            return Verdict::Denied {
                retry_after: until_next_second(now_nanos),
            };
        }
        Verdict::Granted
    }

    fn sweep(&self, now_nanos: u64) -> usize {
        let second = now_nanos / NANOS_PER_SEC;
        self.buckets.prune_before(second.saturating_sub(WINDOW_SECS))
    }

    fn retained(&self) -> usize {
        self.buckets.len()
    }
}
