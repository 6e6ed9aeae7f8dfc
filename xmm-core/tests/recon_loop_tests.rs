//! Reconciliation loop behavior over the real recon thread: gap
//! confirmation, interval selection, terminal exits and the one-shot
//! recon future.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use xmm_core::position::{
    PositionConfig, PositionManager, PositionSource, ReconSettings, ReconStatus, Reconciler,
};
use xmm_core::VenueRole;

fn settings() -> ReconSettings {
    ReconSettings {
        tick_size: 0.001,
        tolerable_threshold: 0.5,
        max_mismatch_cnt: 3,
        max_failure_query_cnt: 5,
        retry_interval_on_failure: Duration::from_millis(5),
        normal_recon_interval: Duration::from_millis(10),
        retry_interval_on_mismatch: Duration::from_millis(5),
    }
}

struct SequencedSource {
    responses: Mutex<Vec<anyhow::Result<f64>>>,
    fallback: f64,
}

impl SequencedSource {
    fn new(mut responses: Vec<anyhow::Result<f64>>, fallback: f64) -> Self {
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            fallback,
        }
    }
}

impl PositionSource for SequencedSource {
    fn fetch_position(&self) -> anyhow::Result<f64> {
        match self.responses.lock().pop() {
            Some(response) => response,
            None => Ok(self.fallback),
        }
    }
}

fn manager(source: Box<dyn PositionSource>) -> Arc<PositionManager> {
    Arc::new(PositionManager::new(
        PositionConfig {
            venue: VenueRole::Quote,
            max_position: 1e6,
            base_position: 0.0,
            contract_multiplier: 1.0,
        },
        Reconciler::new(VenueRole::Quote, settings(), source),
    ))
}

fn wait_for<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_persistent_tolerable_gap_is_confirmed_then_clears() {
    // Warmup reads 10.0, then three cycles at gap 0.1, then agreement
    let source = SequencedSource::new(
        vec![Ok(10.0), Ok(10.1), Ok(10.1), Ok(10.1)],
        10.1,
    );
    let pm = manager(Box::new(source));
    assert!(pm.is_warmed_up());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    pm.start(Some(Box::new(move |_, status| {
        seen_clone.lock().push(status);
    })));

    wait_for("tolerable gap confirmation", || {
        seen.lock().contains(&ReconStatus::TolerableGap)
    });
    // Confirmation adopts the exchange position, after which the gap
    // disappears and the loop reports NoGap again
    wait_for("return to no-gap", || {
        let seen = seen.lock();
        match seen.iter().rposition(|s| *s == ReconStatus::TolerableGap) {
            Some(index) => seen[index + 1..].contains(&ReconStatus::NoGap),
            None => false,
        }
    });
    assert!(pm.is_running());
    assert_eq!(pm.raw_position(), 10.1);
    pm.stop();
}

#[test]
fn test_intolerable_gap_stops_the_loop() {
    // Warmup at 0, then the exchange insists on a gap of 10
    let source = SequencedSource::new(vec![Ok(0.0)], 10.0);
    let pm = manager(Box::new(source));

    let terminal = Arc::new(Mutex::new(None));
    let terminal_clone = Arc::clone(&terminal);
    pm.start(Some(Box::new(move |_, status| {
        if status.is_terminal() {
            *terminal_clone.lock() = Some(status);
        }
    })));

    wait_for("terminal status", || terminal.lock().is_some());
    assert_eq!(*terminal.lock(), Some(ReconStatus::IntolerableGap));
    wait_for("loop exit", || !pm.is_running());
    // Internal position was never overwritten by the bad value
    assert_eq!(pm.raw_position(), 0.0);
}

#[test]
fn test_repeated_query_failures_terminate() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let source: Box<dyn PositionSource> = Box::new(move || -> anyhow::Result<f64> {
        // First call is the warmup; keep it failing throughout
        calls_clone.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("gateway timeout")
    });
    let pm = manager(source);
    assert!(!pm.is_warmed_up());

    pm.start(None);
    wait_for("failed-query exit", || !pm.is_running());
    assert_eq!(pm.last_status(), ReconStatus::FailedQuery);
    // Warmup plus max_failure_query_cnt loop calls
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[test]
fn test_recon_future_forces_immediate_cycle() {
    let pm = manager(Box::new(|| Ok(0.0)));
    pm.start(None);

    // Ask well inside the 10ms normal interval repeatedly
    for _ in 0..5 {
        let rx = pm.recon();
        let status = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(status, ReconStatus::NoGap);
    }
    pm.stop();
}

#[test]
fn test_stop_during_sleep_wakes_promptly() {
    let mut slow = settings();
    slow.normal_recon_interval = Duration::from_secs(3600);
    let pm = Arc::new(PositionManager::new(
        PositionConfig {
            venue: VenueRole::Hedge,
            max_position: 1e6,
            base_position: 0.0,
            contract_multiplier: 1.0,
        },
        Reconciler::new(
            VenueRole::Hedge,
            slow,
            Box::new(|| Ok(0.0)) as Box<dyn PositionSource>,
        ),
    ));
    pm.start(None);
    std::thread::sleep(Duration::from_millis(50));

    let begun = Instant::now();
    pm.stop();
    assert!(begun.elapsed() < Duration::from_secs(2));
}
