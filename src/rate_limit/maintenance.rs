//! Background sweep of expired window buckets.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use super::algorithm::Algorithm;
use super::limiter::Shared;
use crate::observability::metrics;

/// Start the sweeper on the current tokio runtime, if there is one.
///
/// The task holds only a weak reference, so it also exits once the limiter
/// is gone.
pub(crate) fn spawn(
    shared: Weak<Shared>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
) -> Option<JoinHandle<()>> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    Some(handle.spawn(run(shared, interval, shutdown)))
}

async fn run(shared: Weak<Shared>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    tracing::debug!(
        interval_ms = interval.as_millis() as u64,
        "Rate limiter maintenance starting"
    );
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let removed = shared.sweep();
                if removed > 0 {
                    tracing::debug!(
                        strategy = %shared.algorithm.strategy(),
                        removed,
                        "Swept expired window buckets"
                    );
                }
                metrics::record_window_buckets(
                    shared.algorithm.strategy().as_str(),
                    shared.algorithm.retained(),
                );
            }
            _ = shutdown.recv() => {
                tracing::debug!("Rate limiter maintenance received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
