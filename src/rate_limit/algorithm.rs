//! Common shape of the admission algorithms.

use std::fmt;
use std::time::Duration;

use super::config::Strategy;

pub(crate) const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Result of one non-blocking admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Granted,
    /// Denied; `retry_after` is when the algorithm expects capacity again.
    Denied { retry_after: Duration },
}

impl Verdict {
    pub fn is_granted(&self) -> bool {
        matches!(self, Verdict::Granted)
    }
}

/// One admission algorithm over a shared nanosecond clock reading.
///
/// Implementations are lock-free on the hot path; `now_nanos` comes from the
/// limiter's clock so every strategy sees the same timeline.
pub(crate) trait Algorithm: Send + Sync + fmt::Debug {
    fn strategy(&self) -> Strategy;

    /// Attempt to take one permit at `now_nanos`.
    fn try_acquire(&self, now_nanos: u64) -> Verdict;

    /// Drop state that can no longer influence a decision. Returns the
    /// number of entries removed.
    fn sweep(&self, _now_nanos: u64) -> usize {
        0
    }

    /// Number of retained window buckets, for gauges.
    fn retained(&self) -> usize {
        0
    }
}
