//! Hedger: flattens inventory produced by quote-side fills
//!
//! Exposure is the sum of both venue positions. Hedge orders are market
//! orders on the hedge venue, sized to the exposure not already covered
//! by in-flight hedge orders on the reducing side, and only sent when
//! the hedge book passes its health gates.

use std::sync::Arc;

use tracing::{debug, info};

use xmm_core::book::{Book, BookFreshnessChecker, BookSpreadChecker};
use xmm_core::oms::{OrderManager, OrderRequest, OrderRouter, OrderType};
use xmm_core::position::PositionManager;
use xmm_core::{OrderStatus, Side};

pub struct Hedger<R: OrderRouter> {
    hedge_orders: Arc<OrderManager<R>>,
    quote_position: Arc<PositionManager>,
    hedge_position: Arc<PositionManager>,
    hedge_book: Arc<Book>,
    instrument: String,
    min_hedge_size: f64,
    spread_checker: BookSpreadChecker,
    freshness_checker: BookFreshnessChecker,
}

impl<R: OrderRouter> Hedger<R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hedge_orders: Arc<OrderManager<R>>,
        quote_position: Arc<PositionManager>,
        hedge_position: Arc<PositionManager>,
        hedge_book: Arc<Book>,
        instrument: impl Into<String>,
        min_hedge_size: f64,
        stale_threshold_ns: u64,
        max_spread: f64,
    ) -> Self {
        Self {
            hedge_orders,
            quote_position,
            hedge_position,
            hedge_book,
            instrument: instrument.into(),
            min_hedge_size,
            spread_checker: BookSpreadChecker::new(max_spread),
            freshness_checker: BookFreshnessChecker::new(stale_threshold_ns),
        }
    }

    /// Preconditions for sending a hedge: liquid book, fresh book,
    /// working trade channel.
    pub fn healthcheck(&self) -> (bool, &'static str) {
        if !self.spread_checker.check(&self.hedge_book) {
            debug!(action = "check_hedger_health", reason = "hedge_market_illiquid");
            return (false, "hedge_market_illiquid");
        }
        if !self.freshness_checker.check(&self.hedge_book) {
            debug!(action = "check_hedger_health", reason = "hedge_book_outdated");
            return (false, "hedge_book_outdated");
        }
        if !self.hedge_orders.is_ws_ready() {
            debug!(action = "check_hedger_health", reason = "hedge_ws_disconnected");
            return (false, "hedge_ws_disconnected");
        }
        (true, "")
    }

    /// Evaluate exposure and send a hedge order when warranted.
    /// Returns the client order id of the hedge sent, if any.
    pub fn hedge(&self) -> Option<u64> {
        let total_exposure = self.total_exposure();
        if !self.is_significant(total_exposure) {
            debug!(
                action = "hedge",
                reason = "total_exposure_within_min_hedge_size",
                total_exposure,
                min_hedge_size = self.min_hedge_size,
            );
            return None;
        }

        let unhedged_exposure = self.unhedged_exposure(total_exposure);
        if !self.is_significant(unhedged_exposure) {
            debug!(
                action = "hedge",
                reason = "unhedged_exposure_within_min_hedge_size",
                unhedged_exposure,
                min_hedge_size = self.min_hedge_size,
            );
            return None;
        }

        // Long exposure is worked off with asks, short with bids
        let hedge_side = if unhedged_exposure > 0.0 {
            Side::Ask
        } else {
            Side::Bid
        };
        self.send_hedge_order(unhedged_exposure.abs(), hedge_side)
    }

    fn is_significant(&self, exposure: f64) -> bool {
        exposure.abs() >= self.min_hedge_size
    }

    pub fn total_exposure(&self) -> f64 {
        self.quote_position.get_position() + self.hedge_position.get_position()
    }

    /// Exposure minus what in-flight hedge orders on the reducing side
    /// would already cover, floored at zero.
    fn unhedged_exposure(&self, exposure: f64) -> f64 {
        if exposure > 0.0 {
            let potential_ask_fills = self.potential_fill_size(Side::Ask);
            if exposure > potential_ask_fills {
                exposure - potential_ask_fills
            } else {
                0.0
            }
        } else if exposure < 0.0 {
            let potential_bid_fills = self.potential_fill_size(Side::Bid);
            if -exposure > potential_bid_fills {
                exposure + potential_bid_fills
            } else {
                0.0
            }
        } else {
            0.0
        }
    }

    /// Quantity that could still fill on `side`: submitted quantity of
    /// pending orders plus on-exchange remainder of live and partially
    /// filled ones.
    fn potential_fill_size(&self, side: Side) -> f64 {
        let mut total = 0.0;
        for order in self.hedge_orders.orders_by_status(OrderStatus::Pending) {
            if order.side == side {
                total += order.qty_submitted;
            }
        }
        for order in self.hedge_orders.orders_by_status(OrderStatus::Live) {
            if order.side == side {
                total += order.qty_on_exch;
            }
        }
        for order in self
            .hedge_orders
            .orders_by_status(OrderStatus::PartiallyFilled)
        {
            if order.side == side {
                total += order.qty_on_exch;
            }
        }
        total
    }

    fn send_hedge_order(&self, size: f64, side: Side) -> Option<u64> {
        let client_order_id = self.hedge_orders.place_order(OrderRequest {
            instrument: self.instrument.clone(),
            price: 0.0,
            qty: size,
            buy: side.is_buy(),
            order_type: OrderType::Market,
            td_mode: "cross".into(),
            ban_amend: true,
        });
        info!(
            action = "send_hedge",
            client_order_id,
            role = "hedge",
            instrument = %self.instrument,
            price = "market",
            size,
            side = %side,
            order_type = "market",
        );
        (client_order_id != 0).then_some(client_order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;
    use xmm_core::core::now_ns;
    use xmm_core::oms::QuoteVenueRejectMap;
    use xmm_core::position::{PositionConfig, PositionSource, ReconSettings, Reconciler};
    use xmm_core::VenueRole;

    #[derive(Default)]
    struct RecordingRouter {
        down: AtomicBool,
        next_id: AtomicU64,
        sent: Mutex<Vec<OrderRequest>>,
    }

    impl RecordingRouter {
        fn new() -> Self {
            Self {
                down: AtomicBool::new(false),
                next_id: AtomicU64::new(100),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl OrderRouter for RecordingRouter {
        fn is_ready(&self) -> bool {
            !self.down.load(Ordering::SeqCst)
        }
        fn send_order(&self, request: &OrderRequest, _req_id: u64) -> u64 {
            self.sent.lock().push(request.clone());
            self.next_id.fetch_add(1, Ordering::SeqCst)
        }
        fn send_cancel_order(&self, client_order_id: u64, _req_id: u64, _instrument: &str) -> u64 {
            client_order_id
        }
        fn send_modify_order(
            &self,
            client_order_id: u64,
            _new_qty: f64,
            _new_price: f64,
            _req_id: u64,
            _instrument: &str,
        ) -> u64 {
            client_order_id
        }
        fn send_heartbeat(&self) -> bool {
            true
        }
    }

    fn position_manager(venue: VenueRole) -> Arc<PositionManager> {
        let settings = ReconSettings {
            tick_size: 0.001,
            tolerable_threshold: 1.0,
            max_mismatch_cnt: 3,
            max_failure_query_cnt: 3,
            retry_interval_on_failure: Duration::from_millis(10),
            normal_recon_interval: Duration::from_millis(10),
            retry_interval_on_mismatch: Duration::from_millis(10),
        };
        let source: Box<dyn PositionSource> = Box::new(|| Ok(0.0));
        Arc::new(PositionManager::new(
            PositionConfig {
                venue,
                max_position: 1e9,
                base_position: 0.0,
                contract_multiplier: 1.0,
            },
            Reconciler::new(venue, settings, source),
        ))
    }

    struct Rig {
        hedger: Hedger<RecordingRouter>,
        orders: Arc<OrderManager<RecordingRouter>>,
        quote_position: Arc<PositionManager>,
        hedge_position: Arc<PositionManager>,
        book: Arc<Book>,
    }

    fn rig(min_hedge_size: f64) -> Rig {
        let quote_position = position_manager(VenueRole::Quote);
        let hedge_position = position_manager(VenueRole::Hedge);
        let orders = Arc::new(OrderManager::new(
            VenueRole::Hedge,
            RecordingRouter::new(),
            100,
            Box::new(QuoteVenueRejectMap),
            1.0,
            Arc::clone(&hedge_position),
        ));
        let book = Arc::new(Book::new("hedgex_perp_doge_usdt"));
        book.set_best_bid(100.0);
        book.set_best_ask(100.05);
        book.set_timestamp_ns(now_ns());

        let hedger = Hedger::new(
            Arc::clone(&orders),
            Arc::clone(&quote_position),
            Arc::clone(&hedge_position),
            Arc::clone(&book),
            "hedgex_perp_doge_usdt",
            min_hedge_size,
            5_000_000_000,
            0.01,
        );
        Rig {
            hedger,
            orders,
            quote_position,
            hedge_position,
            book,
        }
    }

    #[test]
    fn test_healthcheck_passes_on_fresh_tight_book() {
        let rig = rig(0.1);
        assert_eq!(rig.hedger.healthcheck(), (true, ""));
    }

    #[test]
    fn test_healthcheck_fails_on_wide_spread() {
        let rig = rig(0.1);
        rig.book.set_best_ask(102.0);
        let (ok, reason) = rig.hedger.healthcheck();
        assert!(!ok);
        assert_eq!(reason, "hedge_market_illiquid");
    }

    #[test]
    fn test_healthcheck_fails_on_stale_book() {
        let rig = rig(0.1);
        rig.book.set_timestamp_ns(now_ns() - 60_000_000_000);
        let (ok, reason) = rig.hedger.healthcheck();
        assert!(!ok);
        assert_eq!(reason, "hedge_book_outdated");
    }

    #[test]
    fn test_no_hedge_below_min_size() {
        let rig = rig(1.0);
        rig.quote_position.update_position_by_fillsz(0.5, true);
        assert!(rig.hedger.hedge().is_none());
        assert!(rig.orders.router().sent.lock().is_empty());
    }

    #[test]
    fn test_long_exposure_hedged_with_market_ask() {
        // Quote bid filled 0.5: hedge with an ask of 0.5
        let rig = rig(0.1);
        rig.quote_position.update_position_by_fillsz(0.5, true);

        let id = rig.hedger.hedge();
        assert!(id.is_some());

        let sent = rig.orders.router().sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].buy);
        assert_eq!(sent[0].qty, 0.5);
        assert_eq!(sent[0].order_type, OrderType::Market);
    }

    #[test]
    fn test_short_exposure_hedged_with_market_bid() {
        let rig = rig(0.1);
        rig.quote_position.update_position_by_fillsz(0.75, false);

        rig.hedger.hedge().unwrap();
        let sent = rig.orders.router().sent.lock();
        assert!(sent[0].buy);
        assert_eq!(sent[0].qty, 0.75);
    }

    #[test]
    fn test_in_flight_hedge_prevents_double_hedging() {
        let rig = rig(0.1);
        rig.quote_position.update_position_by_fillsz(0.5, true);

        // First pass sends the hedge; it stays pending
        assert!(rig.hedger.hedge().is_some());
        // Second pass sees 0.5 of pending ask and sends nothing
        assert!(rig.hedger.hedge().is_none());
        assert_eq!(rig.orders.router().sent.lock().len(), 1);
    }

    #[test]
    fn test_partial_inflight_coverage_hedges_the_difference() {
        let rig = rig(0.1);
        rig.quote_position.update_position_by_fillsz(0.5, true);
        assert!(rig.hedger.hedge().is_some());

        // More quote fills arrive while the first hedge is in flight
        rig.quote_position.update_position_by_fillsz(0.7, true);
        rig.hedger.hedge().unwrap();

        let sent = rig.orders.router().sent.lock();
        assert_eq!(sent.len(), 2);
        assert!((sent[1].qty - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_flat_after_hedge_fill() {
        // Full round trip: quote fill, hedge sent, hedge filled
        let rig = rig(0.1);
        rig.quote_position.update_position_by_fillsz(0.5, true);
        let hedge_id = rig.hedger.hedge().unwrap();

        // Hedge fill flows through the order manager into the position
        rig.orders
            .apply_order_update(xmm_core::oms::OrderUpdateFrame {
                client_order_id: hedge_id,
                state: Some(xmm_core::oms::ExchangeOrderState::Filled),
                acc_fill_qty: Some(0.5),
                fill_sz: Some(0.5),
                fill_px: Some(100.0),
                ..Default::default()
            });

        assert_eq!(rig.hedge_position.get_position(), -0.5);
        assert_eq!(rig.hedger.total_exposure(), 0.0);
        assert!(rig.hedger.hedge().is_none());
    }

    #[test]
    fn test_opposite_side_inflight_does_not_offset() {
        let rig = rig(0.1);
        // Short exposure, but a pending ask hedge exists from before
        rig.quote_position.update_position_by_fillsz(0.5, true);
        rig.hedger.hedge().unwrap();

        rig.quote_position.update_position_by_fillsz(1.5, false);
        // Net exposure -1.0; the pending ask does not cover bids
        rig.hedger.hedge().unwrap();
        let sent = rig.orders.router().sent.lock();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].buy);
        assert!((sent[1].qty - 1.0).abs() < 1e-9);
    }
}
