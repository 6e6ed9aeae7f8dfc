//! Per-venue position manager
//!
//! Tracks the strategy's net position in one instrument, seeds it from
//! the exchange at construction (warmup), keeps it current from fills,
//! and runs the periodic reconciliation loop on a dedicated thread.
//! The position itself lives in a lock-free cell so risk checks outside
//! the dispatcher can read it at any time.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam::atomic::AtomicCell;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use tracing::{error, info, warn};

use crate::core::{Side, VenueRole};

use super::recon::{PositionSource, ReconStatus, Reconciler};

/// Per-venue position limits and scaling.
#[derive(Debug, Clone)]
pub struct PositionConfig {
    pub venue: VenueRole,
    /// Risk limit per direction, after base-position adjustment.
    pub max_position: f64,
    /// Constant offset subtracted from the raw position for reporting.
    pub base_position: f64,
    /// Contracts-to-base-units factor applied to reported fill sizes.
    pub contract_multiplier: f64,
}

pub type ReconCallback = Box<dyn Fn(VenueRole, ReconStatus) + Send + Sync>;

type BoxedReconciler = Reconciler<Box<dyn PositionSource>>;

struct LoopState {
    running: bool,
    /// Forces an immediate cycle regardless of the schedule.
    poke: bool,
    status: ReconStatus,
    pending: Option<std::sync::mpsc::SyncSender<ReconStatus>>,
}

/// State shared between the API surface and the recon thread.
struct Shared {
    config: PositionConfig,
    current: AtomicCell<f64>,
    /// Serializes read-modify-write of `current`; plain loads stay lock-free.
    write_lock: Mutex<()>,
    warmed_up: AtomicBool,
    state: Mutex<LoopState>,
    recon_cv: Condvar,
    /// Parked here between runs; the loop thread takes it while running.
    reconciler_slot: Mutex<Option<BoxedReconciler>>,
}

pub struct PositionManager {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PositionManager {
    /// Build the manager and run the warmup query. A failed warmup is
    /// not fatal here; it leaves `warmed_up` false, which gates the
    /// strategy's readiness check.
    pub fn new(config: PositionConfig, reconciler: BoxedReconciler) -> Self {
        let shared = Arc::new(Shared {
            current: AtomicCell::new(0.0),
            write_lock: Mutex::new(()),
            warmed_up: AtomicBool::new(false),
            state: Mutex::new(LoopState {
                running: false,
                poke: false,
                status: ReconStatus::NoGap,
                pending: None,
            }),
            recon_cv: Condvar::new(),
            reconciler_slot: Mutex::new(Some(reconciler)),
            config,
        });
        shared.warmup();
        Self {
            shared,
            thread: Mutex::new(None),
        }
    }

    pub fn is_warmed_up(&self) -> bool {
        self.shared.warmed_up.load(Ordering::Acquire)
    }

    pub fn venue(&self) -> VenueRole {
        self.shared.config.venue
    }

    /// Start the reconciliation thread. Idempotent while running.
    pub fn start(&self, callback: Option<ReconCallback>) {
        {
            let mut state = self.shared.state.lock();
            if state.running {
                return;
            }
            state.running = true;
            state.status = ReconStatus::NoGap;
        }
        // A previous terminal run may still hold the join handle
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }

        let Some(mut reconciler) = self.shared.reconciler_slot.lock().take() else {
            warn!(
                action = "start_position_recon",
                result = "fail",
                reason = "reconciler_consumed"
            );
            self.shared.state.lock().running = false;
            return;
        };

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(format!("recon-{}", self.shared.config.venue))
            .spawn(move || {
                shared.recon_loop(&mut reconciler, callback);
                *shared.reconciler_slot.lock() = Some(reconciler);
            })
            .expect("failed to spawn recon thread");
        *self.thread.lock() = Some(handle);
    }

    /// Stop the reconciliation thread and join it. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.running && self.thread.lock().is_none() {
                return;
            }
            state.running = false;
        }
        self.shared.recon_cv.notify_all();
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!(
                    action = "join_recon_thread",
                    result = "fail",
                    venue = %self.shared.config.venue,
                );
            }
        }
    }

    /// Request an immediate reconciliation; the receiver resolves with
    /// the status of the next completed cycle (or the last status if
    /// the loop is not running).
    pub fn recon(&self) -> Receiver<ReconStatus> {
        let (tx, rx) = sync_channel(1);
        let mut state = self.shared.state.lock();
        if !state.running {
            let _ = tx.try_send(state.status);
            return rx;
        }
        state.pending = Some(tx);
        state.poke = true;
        drop(state);
        self.shared.recon_cv.notify_one();
        rx
    }

    pub fn last_status(&self) -> ReconStatus {
        self.shared.state.lock().status
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Reported position after the base offset.
    #[inline]
    pub fn get_position(&self) -> f64 {
        self.shared.current.load() - self.shared.config.base_position
    }

    /// Raw internal position as last synchronized.
    #[inline]
    pub fn raw_position(&self) -> f64 {
        self.shared.current.load()
    }

    /// Whether quoting on `side` would grow past the risk limit.
    pub fn is_max_position(&self, side: Side) -> bool {
        let position = self.get_position();
        match side {
            // Asks grow the short side
            Side::Ask => -position >= self.shared.config.max_position,
            Side::Bid => position >= self.shared.config.max_position,
        }
    }

    /// Apply one observed fill, scaled by the contract multiplier.
    pub fn update_position_by_fillsz(&self, fill_sz: f64, buy: bool) {
        let delta =
            fill_sz * self.shared.config.contract_multiplier * if buy { 1.0 } else { -1.0 };
        let _guard = self.shared.write_lock.lock();
        self.shared.current.store(self.shared.current.load() + delta);
    }
}

impl Drop for PositionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn warmup(&self) {
        let guard = self.reconciler_slot.lock();
        let reconciler = guard.as_ref().expect("reconciler present before start");
        match reconciler.fetch_position() {
            Ok(position) => {
                self.current.store(position);
                self.warmed_up.store(true, Ordering::Release);
                info!(
                    action = "initialize_position",
                    result = "pass",
                    venue = %self.config.venue,
                    position_from_exch = position,
                    base_position = self.config.base_position,
                );
            }
            Err(err) => {
                error!(
                    action = "initialize_position",
                    result = "fail",
                    venue = %self.config.venue,
                    error = %err,
                );
            }
        }
    }

    fn recon_loop(&self, reconciler: &mut BoxedReconciler, callback: Option<ReconCallback>) {
        let mut next_recon_time = Instant::now();
        info!(action = "position_recon_loop", state = "start", venue = %self.config.venue);

        loop {
            {
                let mut state = self.state.lock();
                loop {
                    if !state.running || state.poke {
                        break;
                    }
                    if Instant::now() >= next_recon_time {
                        break;
                    }
                    self.recon_cv.wait_until(&mut state, next_recon_time);
                }
                if !state.running {
                    break;
                }
                state.poke = false;
            }

            let outcome = reconciler.reconcile(self.current.load());
            if let Some(position) = outcome.adopt_position {
                let _guard = self.write_lock.lock();
                self.current.store(position);
            }
            if let Some(delay) = outcome.next_delay {
                next_recon_time = Instant::now() + delay;
            }

            {
                let mut state = self.state.lock();
                state.status = outcome.status;
                if let Some(tx) = state.pending.take() {
                    let _ = tx.try_send(outcome.status);
                }
            }
            if let Some(cb) = callback.as_ref() {
                cb(self.config.venue, outcome.status);
            }
            if outcome.is_terminal() {
                break;
            }
        }

        let mut state = self.state.lock();
        state.running = false;
        if let Some(tx) = state.pending.take() {
            let _ = tx.try_send(state.status);
        }
        info!(action = "position_recon_loop", state = "exit", venue = %self.config.venue);
    }
}
