//! Periodic timer on a dedicated thread
//!
//! Drives websocket heartbeats. The callback runs on the timer thread;
//! `stop` wakes the sleep and joins.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

struct TimerShared {
    stopped: Mutex<bool>,
    condition: Condvar,
}

pub struct PeriodicTimer {
    shared: Arc<TimerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTimer {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(TimerShared {
                stopped: Mutex::new(false),
                condition: Condvar::new(),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Fire `callback` every `interval` until stopped. Idempotent while
    /// running.
    pub fn start(&self, interval: Duration, callback: Box<dyn Fn() + Send>) {
        let mut thread = self.thread.lock();
        if thread.is_some() {
            debug!(action = "start_timer", result = "already_running");
            return;
        }
        *self.shared.stopped.lock() = false;

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("heartbeat-timer".into())
            .spawn(move || loop {
                {
                    let mut stopped = shared.stopped.lock();
                    if !*stopped {
                        shared.condition.wait_for(&mut stopped, interval);
                    }
                    if *stopped {
                        return;
                    }
                }
                callback();
            })
            .expect("failed to spawn timer thread");
        *thread = Some(handle);
    }

    /// Stop and join. Idempotent.
    pub fn stop(&self) {
        *self.shared.stopped.lock() = true;
        self.shared.condition.notify_all();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Default for PeriodicTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
