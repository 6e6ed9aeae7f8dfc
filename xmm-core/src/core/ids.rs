//! Timestamp and id generation
//!
//! Client order ids are the local nanosecond wall clock at submission
//! time, bumped by one whenever two submissions land on the same
//! nanosecond, so ids are strictly increasing within a process run and
//! double as the submit timestamp. Request ids are a plain per-process
//! counter used to correlate outbound operations with their acks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_CLIENT_ORDER_ID: AtomicU64 = AtomicU64::new(0);
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Current wall-clock time in nanoseconds since the unix epoch.
#[inline]
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Allocate a fresh client order id, strictly greater than any id
/// previously returned by this process.
pub fn next_client_order_id() -> u64 {
    let now = now_ns();
    let mut last = LAST_CLIENT_ORDER_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_CLIENT_ORDER_ID.compare_exchange_weak(
            last,
            candidate,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

/// Allocate a fresh request id for outbound operation correlation.
#[inline]
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_order_ids_strictly_increase() {
        let mut prev = next_client_order_id();
        for _ in 0..10_000 {
            let id = next_client_order_id();
            assert!(id > prev, "{} should be > {}", id, prev);
            prev = id;
        }
    }

    #[test]
    fn test_client_order_ids_unique_across_threads() {
        use std::collections::HashSet;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..1000).map(|_| next_client_order_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
    }

    #[test]
    fn test_request_ids_monotonic() {
        let first = next_request_id();
        let second = next_request_id();
        assert!(second > first);
    }

    #[test]
    fn test_now_ns_is_plausible() {
        // After 2020-01-01 in nanoseconds
        assert!(now_ns() > 1_577_836_800_000_000_000);
    }
}
