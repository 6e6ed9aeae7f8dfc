//! Order manager: the per-venue lifecycle machine
//!
//! Upstream callers see three operations (`place_order`, `cancel_order`,
//! `modify_order`), each returning the client order id or 0 on failure.
//! The venue trade channel feeds back two kinds of inbound traffic:
//! request acks (`apply_ack`, correlated by request id) and order status
//! updates (`apply_order_update`, correlated by client order id).
//! Updates for ids this process never issued are logged and dropped, so
//! orders from previous runs stay invisible to the strategy.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::core::{now_ns, next_request_id, OrderStatus, RejectReason, Side, VenueRole};
use crate::position::PositionManager;

use super::handler::{OrderHandler, OrderSnapshot};
use super::reject::RejectCodeMap;
use super::store::{CompletionQueue, OrderStore};

/// Delay imposed on re-submission after a throttle reject.
const THROTTLE_BACKOFF_NS: u64 = 2_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    Market,
    PostOnly,
}

impl OrderType {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
            OrderType::PostOnly => "post_only",
        }
    }
}

/// Outbound submission passed to the venue router.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub instrument: String,
    pub price: f64,
    pub qty: f64,
    pub buy: bool,
    pub order_type: OrderType,
    pub td_mode: String,
    pub ban_amend: bool,
}

/// The venue's order-routing primitives; implemented over the websocket
/// trade channel in production and by stubs in tests.
///
/// `send_order` returns the freshly generated client order id, or 0 when
/// the send failed. Cancel and modify return the client order id they
/// were called with, or 0 on send failure.
pub trait OrderRouter: Send + Sync {
    fn is_ready(&self) -> bool;
    fn send_order(&self, request: &OrderRequest, req_id: u64) -> u64;
    fn send_cancel_order(&self, client_order_id: u64, req_id: u64, instrument: &str) -> u64;
    fn send_modify_order(
        &self,
        client_order_id: u64,
        new_qty: f64,
        new_price: f64,
        req_id: u64,
        instrument: &str,
    ) -> u64;
    fn send_heartbeat(&self) -> bool;
}

/// Which outbound operation an ack refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    New,
    Modify,
    Cancel,
}

/// Parsed request ack from the trade channel.
#[derive(Debug, Clone)]
pub struct AckFrame {
    pub req_id: u64,
    pub kind: AckKind,
    pub ret_code: i64,
    pub ret_msg: String,
    /// Exchange-side timestamp of the ack, nanoseconds.
    pub exch_ts_ns: u64,
}

/// Order state as reported on the fill/cancel channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOrderState {
    Live,
    Canceled,
    PartiallyFilled,
    Filled,
}

/// Parsed order/execution frame from the trade channel.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdateFrame {
    pub client_order_id: u64,
    pub state: Option<ExchangeOrderState>,
    pub exchange_order_id: Option<u64>,
    pub price_on_exch: Option<f64>,
    /// Remaining quantity in venue contracts.
    pub qty_on_exch: Option<f64>,
    /// Cumulative filled quantity in venue contracts.
    pub acc_fill_qty: Option<f64>,
    pub fill_px: Option<f64>,
    /// Last fill size in venue contracts.
    pub fill_sz: Option<f64>,
    pub fill_fee: Option<f64>,
    pub fill_pnl: Option<f64>,
    pub is_taker: Option<bool>,
    pub transaction_id: Option<String>,
    pub fill_ts_ns: Option<u64>,
}

pub type OrderStatusCallback = Box<dyn Fn(OrderSnapshot) + Send + Sync>;
pub type WsHealthCallback = Box<dyn Fn(bool) + Send + Sync>;

pub struct OrderManager<R: OrderRouter> {
    venue: VenueRole,
    router: R,
    store: Mutex<OrderStore>,
    reject_map: Box<dyn RejectCodeMap>,
    contract_multiplier: f64,
    position: Arc<PositionManager>,
    status_callback: RwLock<Option<OrderStatusCallback>>,
    ws_health_callback: RwLock<Option<WsHealthCallback>>,
}

impl<R: OrderRouter> OrderManager<R> {
    pub fn new(
        venue: VenueRole,
        router: R,
        track_order_cnt: usize,
        reject_map: Box<dyn RejectCodeMap>,
        contract_multiplier: f64,
        position: Arc<PositionManager>,
    ) -> Self {
        Self {
            venue,
            router,
            store: Mutex::new(OrderStore::new(track_order_cnt)),
            reject_map,
            contract_multiplier,
            position,
            status_callback: RwLock::new(None),
            ws_health_callback: RwLock::new(None),
        }
    }

    pub fn set_order_status_callback(&self, callback: OrderStatusCallback) {
        *self.status_callback.write() = Some(callback);
    }

    pub fn set_ws_health_callback(&self, callback: WsHealthCallback) {
        *self.ws_health_callback.write() = Some(callback);
    }

    pub fn venue(&self) -> VenueRole {
        self.venue
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    pub fn is_ws_ready(&self) -> bool {
        self.router.is_ready()
    }

    fn fire_status(&self, snapshot: OrderSnapshot) {
        if let Some(cb) = self.status_callback.read().as_ref() {
            cb(snapshot);
        }
    }

    fn fire_ws_health(&self, reached_retry_limit: bool) {
        if let Some(cb) = self.ws_health_callback.read().as_ref() {
            cb(reached_retry_limit);
        }
    }

    /// Submit a new order. Returns the client order id, or 0 when the
    /// websocket was down or the send failed; either failure synthesizes
    /// a REJECTED / WS_FAILURE status update.
    pub fn place_order(&self, request: OrderRequest) -> u64 {
        let mut order = OrderHandler::new(request.instrument.clone());
        order.new_order_on_oms_ts = now_ns();
        order.side = Side::from_buy(request.buy);
        order.qty_submitted = request.qty;
        order.price_submitted = request.price;

        if !self.router.is_ready() {
            order.status = OrderStatus::Rejected;
            order.reason = RejectReason::WsFailure;
            order.rejection_ts = now_ns();
            self.fire_status(order);
            return 0;
        }

        let req_id = next_request_id();
        let client_order_id = self.router.send_order(&request, req_id);
        if client_order_id == 0 {
            order.status = OrderStatus::Rejected;
            order.reason = RejectReason::WsFailure;
            order.rejection_ts = now_ns();
            self.fire_status(order);
            self.fire_ws_health(false);
            return 0;
        }

        order.client_order_id = client_order_id;
        order.status = OrderStatus::Pending;
        order.reason = RejectReason::None;
        {
            let mut store = self.store.lock();
            store.insert(order);
            store.correlate(req_id, client_order_id);
        }
        debug!(
            action = "place_order",
            venue = %self.venue,
            client_order_id,
            req_id,
            price = request.price,
            qty = request.qty,
            side = %Side::from_buy(request.buy),
            order_type = request.order_type.as_str(),
        );
        client_order_id
    }

    /// Cancel an order by client order id. Unknown ids get a fresh
    /// placeholder record so the eventual ack has somewhere to land.
    pub fn cancel_order(&self, client_order_id: u64, instrument: &str) -> u64 {
        {
            let mut store = self.store.lock();
            if !store.contains(client_order_id) {
                let mut placeholder = OrderHandler::new(instrument);
                placeholder.client_order_id = client_order_id;
                store.insert(placeholder);
            }
        }

        if !self.router.is_ready() {
            let snapshot = self.mark_ws_reject(client_order_id);
            if let Some(snapshot) = snapshot {
                self.fire_status(snapshot);
            }
            return 0;
        }

        {
            let mut store = self.store.lock();
            if let Some(order) = store.get_mut(client_order_id) {
                order.cancel_order_on_oms_ts = now_ns();
            }
        }

        let req_id = next_request_id();
        let result = self
            .router
            .send_cancel_order(client_order_id, req_id, instrument);
        if result == 0 {
            let snapshot = self.mark_ws_reject(client_order_id);
            if let Some(snapshot) = snapshot {
                self.fire_status(snapshot);
            }
            self.fire_ws_health(false);
            return 0;
        }
        self.store.lock().correlate(req_id, client_order_id);
        debug!(action = "cancel_order", venue = %self.venue, client_order_id, req_id);
        result
    }

    /// Modify price and quantity of a resting order.
    pub fn modify_order(
        &self,
        client_order_id: u64,
        new_price: f64,
        new_qty: f64,
        instrument: &str,
    ) -> u64 {
        {
            let mut store = self.store.lock();
            if !store.contains(client_order_id) {
                let mut placeholder = OrderHandler::new(instrument);
                placeholder.client_order_id = client_order_id;
                store.insert(placeholder);
            }
        }

        if !self.router.is_ready() {
            if let Some(snapshot) = self.mark_ws_reject(client_order_id) {
                self.fire_status(snapshot);
            }
            return 0;
        }

        {
            let mut store = self.store.lock();
            if let Some(order) = store.get_mut(client_order_id) {
                order.modify_order_on_oms_ts = now_ns();
                order.qty_submitted = new_qty;
            }
        }

        let req_id = next_request_id();
        let result =
            self.router
                .send_modify_order(client_order_id, new_qty, new_price, req_id, instrument);
        if result == 0 {
            if let Some(snapshot) = self.mark_ws_reject(client_order_id) {
                self.fire_status(snapshot);
            }
            self.fire_ws_health(false);
            return 0;
        }
        {
            let mut store = self.store.lock();
            store.correlate(req_id, client_order_id);
            if let Some(order) = store.get_mut(client_order_id) {
                order.price_submitted = new_price;
            }
        }
        debug!(action = "modify_order", venue = %self.venue, client_order_id, req_id);
        result
    }

    fn mark_ws_reject(&self, client_order_id: u64) -> Option<OrderSnapshot> {
        let mut store = self.store.lock();
        let order = store.get_mut(client_order_id)?;
        order.status = OrderStatus::Rejected;
        order.reason = RejectReason::WsFailure;
        order.rejection_ts = now_ns();
        Some(order.clone())
    }

    /// Route a request ack or reject from the trade channel.
    pub fn apply_ack(&self, frame: AckFrame) {
        let snapshot = {
            let mut store = self.store.lock();
            let Some(client_order_id) = store.take_correlation(frame.req_id) else {
                warn!(
                    action = "apply_ack",
                    venue = %self.venue,
                    req_id = frame.req_id,
                    result = "drop",
                    reason = "unknown_request_id",
                );
                return;
            };
            let Some(order) = store.get_mut(client_order_id) else {
                warn!(
                    action = "apply_ack",
                    venue = %self.venue,
                    client_order_id,
                    result = "drop",
                    reason = "order_evicted",
                );
                return;
            };

            if frame.ret_code == 0 {
                let confirmation_ts = now_ns();
                match frame.kind {
                    AckKind::New => {
                        order.new_order_on_exch_ts = frame.exch_ts_ns;
                        order.new_order_confirmation_ts = confirmation_ts;
                    }
                    AckKind::Modify => {
                        order.modify_order_on_exch_ts = frame.exch_ts_ns;
                        order.modify_order_confirmation_ts = confirmation_ts;
                    }
                    AckKind::Cancel => {
                        order.cancel_order_on_exch_ts = frame.exch_ts_ns;
                        order.cancel_order_confirmation_ts = confirmation_ts;
                    }
                }
                None
            } else {
                order.rejection_ts = if frame.exch_ts_ns != 0 {
                    frame.exch_ts_ns
                } else {
                    now_ns()
                };
                order.status = OrderStatus::Rejected;
                let mapping = self.reject_map.map(frame.ret_code, &frame.ret_msg);
                order.reason = mapping.reason;
                if mapping.reason == RejectReason::ThrottleHit {
                    order.place_order_now = order.rejection_ts + THROTTLE_BACKOFF_NS;
                }
                info!(
                    action = "order_rejected",
                    venue = %self.venue,
                    client_order_id,
                    ret_code = frame.ret_code,
                    reason = %mapping.reason,
                );
                let snapshot = order.clone();
                let queue_it = mapping.always_queue || !snapshot.has_been_live;
                if queue_it && !store.in_any_queue(client_order_id) {
                    store.push_completed(CompletionQueue::Rejected, client_order_id);
                }
                Some(snapshot)
            }
        };
        if let Some(snapshot) = snapshot {
            self.fire_status(snapshot);
        }
    }

    /// Route an order/execution update from the trade channel.
    pub fn apply_order_update(&self, frame: OrderUpdateFrame) {
        let (snapshot, fill) = {
            let mut store = self.store.lock();
            let Some(order) = store.get_mut(frame.client_order_id) else {
                warn!(
                    action = "apply_order_update",
                    venue = %self.venue,
                    client_order_id = frame.client_order_id,
                    result = "drop",
                    reason = "not_placed_from_this_run",
                );
                return;
            };
            order.reason = RejectReason::None;

            let mut fill: Option<(f64, bool)> = None;
            let factor = self.contract_multiplier;
            match frame.state {
                Some(ExchangeOrderState::Live) => {
                    order.status = OrderStatus::Live;
                    order.has_been_live = true;
                    if let Some(price) = frame.price_on_exch {
                        order.price_on_exch = price;
                    }
                    if let Some(qty) = frame.qty_on_exch {
                        order.qty_on_exch = qty * factor;
                    }
                    if let Some(id) = frame.exchange_order_id {
                        order.exchange_order_id = id;
                    }
                }
                Some(ExchangeOrderState::Canceled) => {
                    order.status = OrderStatus::Canceled;
                    if let Some(acc) = frame.acc_fill_qty {
                        order.cum_filled_qty = order.cum_filled_qty.max(acc * factor);
                    }
                }
                Some(state) => {
                    order.status = match state {
                        ExchangeOrderState::Filled => OrderStatus::Filled,
                        _ => OrderStatus::PartiallyFilled,
                    };
                    if let Some(acc) = frame.acc_fill_qty {
                        order.cum_filled_qty = order.cum_filled_qty.max(acc * factor);
                    }
                    if let Some(px) = frame.fill_px {
                        order.fill_px = px;
                    }
                    if let Some(sz) = frame.fill_sz {
                        order.fill_sz = sz * factor;
                        fill = Some((sz, order.side.is_buy()));
                    }
                    if let Some(fee) = frame.fill_fee {
                        // Venues report fees as negative charges
                        let fee = -fee;
                        order.cum_fee += fee;
                        order.fill_fee = fee;
                    }
                    if let Some(pnl) = frame.fill_pnl {
                        order.fill_pnl = pnl;
                    }
                    if let Some(taker) = frame.is_taker {
                        order.fill_maker = !taker;
                    }
                    if let Some(id) = frame.transaction_id.as_ref() {
                        order.transaction_id = id.clone();
                    }
                    if let Some(ts) = frame.fill_ts_ns {
                        order.executed_ts = ts;
                    }
                    order.executed_ts_on_oms = now_ns();
                }
                None => {}
            }

            let snapshot = order.clone();
            let terminal_queue = match snapshot.status {
                OrderStatus::Canceled => Some(CompletionQueue::Canceled),
                OrderStatus::Filled => Some(CompletionQueue::Filled),
                _ => None,
            };
            if let Some(queue) = terminal_queue {
                if !store.in_any_queue(frame.client_order_id) {
                    store.push_completed(queue, frame.client_order_id);
                }
            }
            (snapshot, fill)
        };

        if let Some((fill_sz, buy)) = fill {
            self.position.update_position_by_fillsz(fill_sz, buy);
        }
        self.fire_status(snapshot);
    }

    /// Forward trade-channel health transitions to the strategy.
    pub fn notify_ws_health(&self, reached_retry_limit: bool) {
        self.fire_ws_health(reached_retry_limit);
    }

    pub fn send_heartbeat(&self) {
        if !self.router.send_heartbeat() {
            self.fire_ws_health(false);
        }
    }

    pub fn order_snapshot(&self, client_order_id: u64) -> Option<OrderSnapshot> {
        self.store.lock().snapshot(client_order_id)
    }

    pub fn orders_by_status(&self, status: OrderStatus) -> Vec<OrderSnapshot> {
        self.store.lock().orders_by_status(status)
    }

    pub fn active_orders(&self) -> Vec<OrderSnapshot> {
        self.store.lock().active_orders()
    }

    pub fn order_count(&self) -> usize {
        self.store.lock().len()
    }

    /// Shared-state access for invariant checks in tests and recon.
    pub fn with_store<T>(&self, f: impl FnOnce(&OrderStore) -> T) -> T {
        f(&self.store.lock())
    }
}
