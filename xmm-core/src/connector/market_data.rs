//! Market-data channel handler
//!
//! Parses book-ticker frames into the venue's `Book`. The first data
//! frame establishes the book (warmup) and emits nothing; afterwards an
//! update callback fires only when the best bid or ask actually moved,
//! while the book timestamp advances on every frame either way.
//!
//! Frame shape (venue encodings vary only in field spelling):
//!
//! ```text
//! {"op":"ping"}                                   control, ignored
//! {"ts":1700000000000,                            exchange ms
//!  "data":{"b":[["100.00","1.5"],...],            bid levels, best first
//!          "a":[["100.10","2.0"],...]}}           ask levels, best first
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::book::Book;

use super::ws::VenueStream;

const MILLI_TO_NANO: u64 = 1_000_000;

pub type MarketUpdateCallback = Arc<dyn Fn() + Send + Sync>;

pub struct MarketDataHandler {
    channel_name: String,
    book: Arc<Book>,
    subscribe_payloads: Vec<String>,
    heartbeat_payload: Option<String>,
    update_callback: MarketUpdateCallback,
    warmed_up: Arc<AtomicBool>,
    saw_first_frame: bool,
}

impl MarketDataHandler {
    pub fn new(
        channel_name: impl Into<String>,
        book: Arc<Book>,
        subscribe_payloads: Vec<String>,
        heartbeat_payload: Option<String>,
        update_callback: MarketUpdateCallback,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            book,
            subscribe_payloads,
            heartbeat_payload,
            update_callback,
            warmed_up: Arc::new(AtomicBool::new(false)),
            saw_first_frame: false,
        }
    }

    /// Shared flag for the strategy's readiness check.
    pub fn warmed_up_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.warmed_up)
    }

    fn apply_levels(&self, side_levels: Option<&Value>, is_bid: bool) {
        let Some(levels) = side_levels.and_then(Value::as_array) else {
            return;
        };
        for (index, level) in levels.iter().enumerate() {
            let Some(pair) = level.as_array() else {
                continue;
            };
            let (Some(price), Some(qty)) = (
                pair.first().and_then(parse_decimal_field),
                pair.get(1).and_then(parse_decimal_field),
            ) else {
                continue;
            };
            self.book.with_depth(|depth| {
                let ladder = if is_bid { &mut depth.bids } else { &mut depth.asks };
                ladder.insert(price, qty);
            });
            // Level zero carries the touch
            if index == 0 && qty > 0.0 {
                if is_bid {
                    self.book.set_best_bid(price);
                } else {
                    self.book.set_best_ask(price);
                }
            }
        }
    }
}

fn parse_decimal_field(value: &Value) -> Option<f64> {
    match value {
        Value::String(text) => text.parse().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    }
}

impl VenueStream for MarketDataHandler {
    fn name(&self) -> &str {
        &self.channel_name
    }

    fn on_open(&mut self) -> Vec<String> {
        self.subscribe_payloads.clone()
    }

    fn heartbeat_payload(&self) -> Option<String> {
        self.heartbeat_payload.clone()
    }

    fn on_frame(&mut self, text: &str) {
        let parsed: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    action = "parse_error",
                    channel = %self.channel_name,
                    error = %err,
                );
                return;
            }
        };

        if parsed.get("op").and_then(Value::as_str) == Some("ping")
            || parsed.get("op").and_then(Value::as_str) == Some("pong")
        {
            debug!(action = "heartbeat", channel = %self.channel_name, result = "pass");
            return;
        }

        let old_best_bid = self.book.best_bid();
        let old_best_ask = self.book.best_ask();

        if let Some(ts) = parsed.get("ts").and_then(Value::as_u64) {
            self.book.set_timestamp_ns(ts * MILLI_TO_NANO);
        }
        let data = parsed.get("data").unwrap_or(&Value::Null);
        self.apply_levels(data.get("b"), true);
        self.apply_levels(data.get("a"), false);

        // The first frame only establishes the book
        if !self.saw_first_frame {
            self.saw_first_frame = true;
            self.warmed_up.store(true, Ordering::Release);
            return;
        }

        // Coalesce: no emission when the touch did not move
        if old_best_bid == self.book.best_bid() && old_best_ask == self.book.best_ask() {
            return;
        }
        (self.update_callback)();
    }

    fn on_disconnect(&mut self) {
        self.warmed_up.store(false, Ordering::Release);
        self.saw_first_frame = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn handler_with_counter() -> (MarketDataHandler, Arc<Book>, Arc<AtomicUsize>) {
        let book = Arc::new(Book::new("refx_perp_doge_usdt"));
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let handler = MarketDataHandler::new(
            "refx-md",
            Arc::clone(&book),
            vec![r#"{"op":"subscribe"}"#.into()],
            Some(r#"{"op":"ping"}"#.into()),
            Arc::new(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (handler, book, count)
    }

    fn frame(ts: u64, bid: &str, ask: &str) -> String {
        format!(
            r#"{{"ts":{ts},"data":{{"b":[["{bid}","1.0"]],"a":[["{ask}","1.0"]]}}}}"#
        )
    }

    #[test]
    fn test_first_frame_warms_up_without_emitting() {
        let (mut handler, book, count) = handler_with_counter();
        let warmed = handler.warmed_up_flag();
        assert!(!warmed.load(Ordering::SeqCst));

        handler.on_frame(&frame(1_000, "100.00", "100.10"));

        assert!(warmed.load(Ordering::SeqCst));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(book.best_bid(), 100.0);
        assert_eq!(book.best_ask(), 100.1);
        assert_eq!(book.timestamp_ns(), 1_000 * MILLI_TO_NANO);
    }

    #[test]
    fn test_touch_move_emits_update() {
        let (mut handler, _book, count) = handler_with_counter();
        handler.on_frame(&frame(1_000, "100.00", "100.10"));
        handler.on_frame(&frame(1_001, "100.01", "100.10"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unchanged_touch_is_coalesced_but_timestamp_advances() {
        let (mut handler, book, count) = handler_with_counter();
        handler.on_frame(&frame(1_000, "100.00", "100.10"));
        handler.on_frame(&frame(2_000, "100.00", "100.10"));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(book.timestamp_ns(), 2_000 * MILLI_TO_NANO);
    }

    #[test]
    fn test_identical_frame_twice_is_noop_emissionwise() {
        let (mut handler, _book, count) = handler_with_counter();
        let payload = frame(1_000, "100.00", "100.10");
        handler.on_frame(&payload);
        handler.on_frame(&payload);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_depth_levels_maintained() {
        let (mut handler, book, _count) = handler_with_counter();
        handler.on_frame(
            r#"{"ts":1,"data":{"b":[["100.00","1.0"],["99.99","2.0"]],"a":[["100.10","1.0"],["100.11","3.0"]]}}"#,
        );
        assert!(book.depth_is_well_formed());
        let (bid_levels, ask_levels) =
            book.with_depth(|depth| (depth.bids.len(), depth.asks.len()));
        assert_eq!(bid_levels, 2);
        assert_eq!(ask_levels, 2);

        // Zero quantity erases a level
        handler.on_frame(r#"{"ts":2,"data":{"b":[["99.99","0"]]}}"#);
        assert_eq!(book.with_depth(|depth| depth.bids.len()), 1);
    }

    #[test]
    fn test_parse_error_emits_nothing() {
        let (mut handler, _book, count) = handler_with_counter();
        handler.on_frame(&frame(1_000, "100.00", "100.10"));
        handler.on_frame("not json at all");
        handler.on_frame(r#"{"ts":"wrong type"}"#);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ping_frames_ignored() {
        let (mut handler, _book, count) = handler_with_counter();
        handler.on_frame(r#"{"op":"ping"}"#);
        handler.on_frame(r#"{"op":"pong"}"#);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!handler.warmed_up_flag().load(Ordering::SeqCst));
    }

    #[test]
    fn test_disconnect_resets_warmup() {
        let (mut handler, _book, _count) = handler_with_counter();
        handler.on_frame(&frame(1_000, "100.00", "100.10"));
        let warmed = handler.warmed_up_flag();
        assert!(warmed.load(Ordering::SeqCst));

        handler.on_disconnect();
        assert!(!warmed.load(Ordering::SeqCst));

        // The next first frame warms up again without emitting
        handler.on_frame(&frame(3_000, "100.05", "100.15"));
        assert!(warmed.load(Ordering::SeqCst));
    }
}
