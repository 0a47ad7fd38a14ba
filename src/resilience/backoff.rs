//! Backoff strategies: attempt number → delay.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff kind as named in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Linear,
    #[default]
    Exponential,
    Random,
}

/// Delay schedule between retry attempts.
///
/// `delay(k)` takes the 1-based retry number. Every variant except
/// `Random` is a pure function of `k`; none ever yields a negative delay.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Constant `base`.
    Fixed { base: Duration },
    /// `base * k`, capped at `max`.
    Linear { base: Duration, max: Duration },
    /// `base * multiplier^(k-1)`, capped at `max`.
    Exponential {
        base: Duration,
        multiplier: f64,
        max: Duration,
    },
    /// Uniform in `[min, max]`.
    Random { min: Duration, max: Duration },
}

impl Backoff {
    pub fn fixed(base: Duration) -> Self {
        Backoff::Fixed { base }
    }

    pub fn linear(base: Duration, max: Duration) -> Self {
        Backoff::Linear { base, max }
    }

    /// Doubling exponential backoff.
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Backoff::Exponential {
            base,
            multiplier: 2.0,
            max,
        }
    }

    pub fn random(min: Duration, max: Duration) -> Self {
        Backoff::Random { min, max }
    }

    pub fn kind(&self) -> BackoffKind {
        match self {
            Backoff::Fixed { .. } => BackoffKind::Fixed,
            Backoff::Linear { .. } => BackoffKind::Linear,
            Backoff::Exponential { .. } => BackoffKind::Exponential,
            Backoff::Random { .. } => BackoffKind::Random,
        }
    }

    /// Delay before retry number `attempt` (1-based; 0 is treated as 1).
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match *self {
            Backoff::Fixed { base } => base,
            Backoff::Linear { base, max } => base.saturating_mul(attempt).min(max),
            Backoff::Exponential {
                base,
                multiplier,
                max,
            } => {
                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                let factor = multiplier.max(0.0).powi(exponent);
                let nanos = base.as_nanos() as f64 * factor;
                // NaN and overflow both fall through to the cap.
                if nanos.is_finite() && nanos < max.as_nanos() as f64 {
                    Duration::from_nanos(nanos.max(0.0).round() as u64)
                } else {
                    max
                }
            }
            Backoff::Random { min, max } => {
                let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
                if lo == hi {
                    return lo;
                }
                let lo_ns = u64::try_from(lo.as_nanos()).unwrap_or(u64::MAX);
                let hi_ns = u64::try_from(hi.as_nanos()).unwrap_or(u64::MAX);
                Duration::from_nanos(rand::thread_rng().gen_range(lo_ns..=hi_ns))
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::exponential(Duration::from_millis(100), Duration::from_secs(10))
    }
}
