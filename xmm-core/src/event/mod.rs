//! Event loop: the single linearization point for all state mutation
//!
//! Every asynchronous input the engine reacts to (market-data ticks,
//! order-status updates, recon results, websocket disconnects, trading
//! control) is converted by a callback adapter into one `Event` variant
//! and pushed onto the queue. One consumer thread pops events in FIFO
//! order and runs the handler, so order maps, books and target ladders
//! never need locks inside handlers.
//!
//! ```text
//!  md thread ──┐
//!  md thread ──┤                    ┌──────────────┐
//!  md thread ──┼──► EventQueue ───► │  dispatcher  │──► handlers mutate
//!  oms thread ─┤   (mutex+condvar)  │  (1 thread)  │    books / orders /
//!  oms thread ─┤                    └──────────────┘    positions / ladder
//!  recon ──────┘
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::core::VenueRole;
use crate::oms::OrderSnapshot;
use crate::position::ReconStatus;

/// A single input to the dispatcher.
#[derive(Debug, Clone)]
pub enum Event {
    StartTrading,
    StopTrading { reason: String },
    MarketUpdate(VenueRole),
    OrderUpdate(VenueRole, OrderSnapshot),
    PositionRecon(VenueRole, ReconStatus),
    PnlRecon(bool),
    WsDisconnected { reached_retry_limit: bool },
}

impl Event {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::StartTrading => "start_trading",
            Event::StopTrading { .. } => "stop_trading",
            Event::MarketUpdate(_) => "market_update",
            Event::OrderUpdate(..) => "order_update",
            Event::PositionRecon(..) => "position_recon",
            Event::PnlRecon(_) => "pnl_recon",
            Event::WsDisconnected { .. } => "ws_disconnected",
        }
    }
}

/// Multi-producer single-consumer FIFO guarded by a mutex and condvar.
struct EventQueue {
    inner: Mutex<QueueInner>,
    condition: Condvar,
}

struct QueueInner {
    queue: VecDeque<Event>,
    running: bool,
}

impl EventQueue {
    fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                queue: VecDeque::new(),
                running: true,
            }),
            condition: Condvar::new(),
        }
    }

    /// Enqueue from any producer thread. Never blocks past the queue lock
    /// and never fails; events submitted after `stop` are accepted but
    /// will not be processed.
    fn push(&self, event: Event) {
        {
            let mut inner = self.inner.lock();
            inner.queue.push_back(event);
        }
        self.condition.notify_one();
    }

    /// Dequeue one event; returns `None` once stopped and drained.
    fn pop(&self) -> Option<Event> {
        let mut inner = self.inner.lock();
        while inner.queue.is_empty() && inner.running {
            self.condition.wait(&mut inner);
        }
        if !inner.running && inner.queue.is_empty() {
            return None;
        }
        inner.queue.pop_front()
    }

    fn stop(&self) {
        {
            let mut inner = self.inner.lock();
            inner.running = false;
        }
        self.condition.notify_all();
    }

    fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

/// Owns the queue and the consumer thread.
///
/// The handler runs on the consumer thread only. A handler returning an
/// error is logged and the loop continues; the loop exits when `stop`
/// has been called and the queue is drained of whatever was in flight.
pub struct EventProcessor {
    queue: Arc<EventQueue>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl EventProcessor {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(EventQueue::new()),
            consumer: Mutex::new(None),
        }
    }

    /// Spawn the consumer with the given handler. Idempotent while a
    /// consumer is already running.
    pub fn start<F>(&self, mut handler: F)
    where
        F: FnMut(Event) -> anyhow::Result<()> + Send + 'static,
    {
        let mut consumer = self.consumer.lock();
        if consumer.is_some() {
            debug!(action = "start_event_processor", result = "already_running");
            return;
        }

        let queue = Arc::clone(&self.queue);
        let handle = std::thread::Builder::new()
            .name("event-processor".into())
            .spawn(move || {
                info!(action = "event_processor_started");
                while let Some(event) = queue.pop() {
                    let kind = event.kind();
                    if let Err(err) = handler(event) {
                        error!(action = "handler_error", event = kind, error = %err);
                    }
                }
                info!(action = "event_processor_stopped");
            })
            .expect("failed to spawn event processor thread");
        *consumer = Some(handle);
    }

    /// Enqueue an event from any thread.
    pub fn submit(&self, event: Event) {
        self.queue.push(event);
    }

    /// Stop the consumer: wake all waiters, let the in-flight handler
    /// finish, join the thread. Idempotent.
    pub fn stop(&self) {
        self.queue.stop();
        if let Some(handle) = self.consumer.lock().take() {
            if handle.join().is_err() {
                error!(action = "join_event_processor", result = "fail");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.queue.is_running()
    }
}

impl Default for EventProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_events_processed_in_fifo_order() {
        let processor = EventProcessor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        processor.start(move |event| {
            if let Event::StopTrading { reason } = event {
                seen_clone.lock().push(reason);
            }
            Ok(())
        });

        for i in 0..100 {
            processor.submit(Event::StopTrading {
                reason: format!("{i}"),
            });
        }

        // Drain
        std::thread::sleep(Duration::from_millis(100));
        processor.stop();

        let seen = seen.lock();
        assert_eq!(seen.len(), 100);
        for (i, reason) in seen.iter().enumerate() {
            assert_eq!(reason, &format!("{i}"));
        }
    }

    #[test]
    fn test_handler_error_does_not_kill_loop() {
        let processor = EventProcessor::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        processor.start(move |event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            match event {
                Event::StartTrading => anyhow::bail!("boom"),
                _ => Ok(()),
            }
        });

        processor.submit(Event::StartTrading);
        processor.submit(Event::PnlRecon(true));
        processor.submit(Event::PnlRecon(false));

        std::thread::sleep(Duration::from_millis(100));
        processor.stop();

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stop_drains_pending_then_exits() {
        let processor = EventProcessor::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        for _ in 0..10 {
            processor.submit(Event::PnlRecon(true));
        }
        processor.start(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        std::thread::sleep(Duration::from_millis(100));
        processor.stop();
        assert_eq!(count.load(Ordering::SeqCst), 10);

        // Post-stop submissions are accepted but never processed
        processor.submit(Event::PnlRecon(false));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_start_is_idempotent() {
        let processor = EventProcessor::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&count);
        processor.start(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let c2 = Arc::clone(&count);
        processor.start(move |_| {
            c2.fetch_add(100, Ordering::SeqCst);
            Ok(())
        });

        processor.submit(Event::PnlRecon(true));
        std::thread::sleep(Duration::from_millis(100));
        processor.stop();

        // Only the first handler ran
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_multi_producer_delivery() {
        let processor = Arc::new(EventProcessor::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        processor.start(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let p = Arc::clone(&processor);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        p.submit(Event::MarketUpdate(VenueRole::Reference));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        std::thread::sleep(Duration::from_millis(200));
        processor.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1000);
    }

    #[test]
    fn test_queue_len_and_running_flag() {
        let queue = EventQueue::new();
        assert!(queue.is_running());
        queue.push(Event::StartTrading);
        assert_eq!(queue.len(), 1);
        queue.stop();
        assert!(!queue.is_running());
        // Drains the remaining event, then reports empty
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_none());
    }
}
