//! Optimistic update loop over a single atomic word.

use std::sync::atomic::{AtomicU64, Ordering};

/// Failed compare-and-swap rounds before the loop starts yielding the thread.
const SPIN_LIMIT: u32 = 64;

/// Read, compute, attempt a compare-and-swap, and retry on contention.
///
/// `update` returns `None` to abandon the update (e.g. no tokens left).
/// Returns `Ok(previous)` when the swap landed and `Err(observed)` when
/// `update` declined. After `SPIN_LIMIT` lost races the loop yields between
/// attempts so heavy contention cannot pin a core.
pub(crate) fn update<F>(cell: &AtomicU64, mut update: F) -> Result<u64, u64>
where
    F: FnMut(u64) -> Option<u64>,
{
    let mut current = cell.load(Ordering::Acquire);
    let mut lost = 0u32;
    loop {
        let next = match update(current) {
            Some(next) => next,
            None => return Err(current),
        };
        match cell.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
            Ok(previous) => return Ok(previous),
            Err(observed) => {
                current = observed;
                lost += 1;
                if lost < SPIN_LIMIT {
                    std::hint::spin_loop();
                } else {
                    std::thread::yield_now();
                }
            }
        }
    }
}
