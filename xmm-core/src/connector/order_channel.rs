//! Order-routing channel handler
//!
//! Parses the trade channel's two frame families into typed messages
//! and forwards them to a late-bound sink (the order manager):
//!
//! ```text
//! {"id":"42","op":"order","code":0,"msg":"","ts":"1700000000000"}
//!     request ack; code != 0 is a reject
//! {"topic":"order","data":[{"clOrdId":"...","state":"live",...}]}
//!     order status update keyed by client order id
//! ```
//!
//! A parse failure emits nothing and logs a `parse_error` line.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::oms::{AckFrame, AckKind, ExchangeOrderState, OrderUpdateFrame};

use super::ws::VenueStream;

const MILLI_TO_NANO: u64 = 1_000_000;

/// Typed traffic out of the trade channel.
#[derive(Debug, Clone)]
pub enum ChannelMessage {
    Ack(AckFrame),
    Update(OrderUpdateFrame),
}

type SinkFn = Box<dyn Fn(ChannelMessage) + Send + Sync>;

/// Late-bound receiver for channel messages.
///
/// The websocket client and the order manager reference each other
/// (manager owns the router, the channel feeds the manager), so the
/// handler is constructed with an empty sink that the strategy binds
/// once both ends exist.
#[derive(Clone, Default)]
pub struct MessageSink {
    inner: Arc<Mutex<Option<SinkFn>>>,
}

impl MessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, sink: SinkFn) {
        *self.inner.lock() = Some(sink);
    }

    pub fn emit(&self, message: ChannelMessage) {
        if let Some(sink) = self.inner.lock().as_ref() {
            sink(message);
        } else {
            warn!(action = "order_channel_emit", result = "drop", reason = "sink_unbound");
        }
    }

    pub fn is_bound(&self) -> bool {
        self.inner.lock().is_some()
    }
}

pub struct OrderChannelHandler {
    channel_name: String,
    auth_payloads: Vec<String>,
    heartbeat_payload: Option<String>,
    sink: MessageSink,
}

impl OrderChannelHandler {
    pub fn new(
        channel_name: impl Into<String>,
        auth_payloads: Vec<String>,
        heartbeat_payload: Option<String>,
        sink: MessageSink,
    ) -> Self {
        Self {
            channel_name: channel_name.into(),
            auth_payloads,
            heartbeat_payload,
            sink,
        }
    }
}

impl VenueStream for OrderChannelHandler {
    fn name(&self) -> &str {
        &self.channel_name
    }

    fn on_open(&mut self) -> Vec<String> {
        self.auth_payloads.clone()
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

        if parsed.get("op").and_then(Value::as_str) == Some("pong") {
            debug!(action = "heartbeat", channel = %self.channel_name, result = "pass");
            return;
        }

        if parsed.get("id").is_some() {
            if let Some(frame) = parse_ack(&parsed) {
                self.sink.emit(ChannelMessage::Ack(frame));
            } else {
                warn!(
                    action = "parse_error",
                    channel = %self.channel_name,
                    reason = "malformed_ack",
                );
            }
            return;
        }

        if parsed.get("topic").and_then(Value::as_str) == Some("order") {
            for frame in parse_updates(&parsed) {
                self.sink.emit(ChannelMessage::Update(frame));
            }
        }
    }

    fn on_disconnect(&mut self) {}
}

fn parse_u64_field(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::String(text) => text.parse().ok(),
        Value::Number(number) => number.as_u64(),
        _ => None,
    }
}

fn parse_f64_field(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::String(text) if !text.is_empty() => text.parse().ok(),
        Value::Number(number) => number.as_f64(),
        _ => None,
    }
}

fn parse_ack(parsed: &Value) -> Option<AckFrame> {
    let req_id = parse_u64_field(parsed.get("id"))?;
    let kind = match parsed.get("op").and_then(Value::as_str)? {
        "order" => AckKind::New,
        "amend-order" => AckKind::Modify,
        "cancel-order" => AckKind::Cancel,
        _ => return None,
    };
    let ret_code = parsed.get("code").and_then(Value::as_i64)?;
    let ret_msg = parsed
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let exch_ts_ns = parse_u64_field(parsed.get("ts")).unwrap_or(0) * MILLI_TO_NANO;
    Some(AckFrame {
        req_id,
        kind,
        ret_code,
        ret_msg,
        exch_ts_ns,
    })
}

fn parse_updates(parsed: &Value) -> Vec<OrderUpdateFrame> {
    let Some(entries) = parsed.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut frames = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(client_order_id) = parse_u64_field(entry.get("clOrdId")) else {
            warn!(action = "parse_order_update", result = "drop", reason = "missing_cl_ord_id");
            continue;
        };
        let state = match entry.get("state").and_then(Value::as_str) {
            Some("live") => Some(ExchangeOrderState::Live),
            Some("canceled") => Some(ExchangeOrderState::Canceled),
            Some("partially_filled") => Some(ExchangeOrderState::PartiallyFilled),
            Some("filled") => Some(ExchangeOrderState::Filled),
            _ => None,
        };
        frames.push(OrderUpdateFrame {
            client_order_id,
            state,
            exchange_order_id: parse_u64_field(entry.get("ordId")),
            price_on_exch: parse_f64_field(entry.get("px")),
            qty_on_exch: parse_f64_field(entry.get("sz")),
            acc_fill_qty: parse_f64_field(entry.get("accFillSz")),
            fill_px: parse_f64_field(entry.get("fillPx")),
            fill_sz: parse_f64_field(entry.get("fillSz")),
            fill_fee: parse_f64_field(entry.get("fillFee")),
            fill_pnl: parse_f64_field(entry.get("fillPnl")),
            is_taker: entry
                .get("execType")
                .and_then(Value::as_str)
                .map(|t| t == "T"),
            transaction_id: entry
                .get("tradeId")
                .and_then(Value::as_str)
                .map(str::to_string),
            fill_ts_ns: parse_u64_field(entry.get("fillTime")).map(|ms| ms * MILLI_TO_NANO),
        });
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting_handler() -> (OrderChannelHandler, Arc<Mutex<Vec<ChannelMessage>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = MessageSink::new();
        let seen_clone = Arc::clone(&seen);
        sink.bind(Box::new(move |message| {
            seen_clone.lock().push(message);
        }));
        let handler = OrderChannelHandler::new("quotex-orders", Vec::new(), None, sink);
        (handler, seen)
    }

    #[test]
    fn test_parse_ok_ack() {
        let (mut handler, seen) = collecting_handler();
        handler.on_frame(r#"{"id":"42","op":"order","code":0,"msg":"","ts":"1700000000000"}"#);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            ChannelMessage::Ack(frame) => {
                assert_eq!(frame.req_id, 42);
                assert_eq!(frame.kind, AckKind::New);
                assert_eq!(frame.ret_code, 0);
                assert_eq!(frame.exch_ts_ns, 1_700_000_000_000 * MILLI_TO_NANO);
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_reject_ack_kinds() {
        let (mut handler, seen) = collecting_handler();
        handler.on_frame(r#"{"id":7,"op":"cancel-order","code":51503,"msg":"not found","ts":1}"#);
        handler.on_frame(r#"{"id":8,"op":"amend-order","code":1,"msg":"busy","ts":1}"#);

        let seen = seen.lock();
        match (&seen[0], &seen[1]) {
            (ChannelMessage::Ack(cancel), ChannelMessage::Ack(amend)) => {
                assert_eq!(cancel.kind, AckKind::Cancel);
                assert_eq!(cancel.ret_code, 51503);
                assert_eq!(cancel.ret_msg, "not found");
                assert_eq!(amend.kind, AckKind::Modify);
            }
            other => panic!("expected two acks, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_fill_update() {
        let (mut handler, seen) = collecting_handler();
        handler.on_frame(
            r#"{"topic":"order","data":[{"clOrdId":"1001","state":"partially_filled",
                "accFillSz":"0.5","fillPx":"100.00","fillSz":"0.5","fillFee":"-0.01",
                "execType":"M","tradeId":"t-9","fillTime":"1700000000001","ordId":"555"}]}"#,
        );

        let seen = seen.lock();
        match &seen[0] {
            ChannelMessage::Update(frame) => {
                assert_eq!(frame.client_order_id, 1001);
                assert_eq!(frame.state, Some(ExchangeOrderState::PartiallyFilled));
                assert_eq!(frame.acc_fill_qty, Some(0.5));
                assert_eq!(frame.fill_px, Some(100.0));
                assert_eq!(frame.fill_fee, Some(-0.01));
                assert_eq!(frame.is_taker, Some(false));
                assert_eq!(frame.transaction_id.as_deref(), Some("t-9"));
                assert_eq!(frame.exchange_order_id, Some(555));
                assert_eq!(frame.fill_ts_ns, Some(1_700_000_000_001 * MILLI_TO_NANO));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_multiple_updates_in_one_frame() {
        let (mut handler, seen) = collecting_handler();
        handler.on_frame(
            r#"{"topic":"order","data":[
                {"clOrdId":"1","state":"live","px":"100.0","sz":"1.0"},
                {"clOrdId":"2","state":"canceled","accFillSz":"0"}]}"#,
        );
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_garbage_and_empty_ids_dropped() {
        let (mut handler, seen) = collecting_handler();
        handler.on_frame("{{{");
        handler.on_frame(r#"{"topic":"order","data":[{"clOrdId":"","state":"live"}]}"#);
        handler.on_frame(r#"{"op":"pong"}"#);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_unbound_sink_drops_quietly() {
        let sink = MessageSink::new();
        assert!(!sink.is_bound());
        let mut handler = OrderChannelHandler::new("quotex-orders", Vec::new(), None, sink);
        handler.on_frame(r#"{"id":1,"op":"order","code":0,"ts":1}"#);
    }
}
