//! The mutable record of one order
//!
//! Keyed by client order id everywhere. Quantities that the exchange
//! reports in contracts are stored already scaled by the instrument's
//! contract multiplier; `cum_filled_qty` never decreases.

use crate::core::{OrderStatus, RejectReason, Side};

/// Mutable per-order state.
///
/// Timestamps are local or exchange nanoseconds; zero means the
/// corresponding transition has not happened.
#[derive(Debug, Clone)]
pub struct OrderHandler {
    pub new_order_on_oms_ts: u64,
    pub new_order_on_exch_ts: u64,
    pub new_order_confirmation_ts: u64,
    pub modify_order_on_oms_ts: u64,
    pub modify_order_on_exch_ts: u64,
    pub modify_order_confirmation_ts: u64,
    pub cancel_order_on_oms_ts: u64,
    pub cancel_order_on_exch_ts: u64,
    pub cancel_order_confirmation_ts: u64,
    pub rejection_ts: u64,
    pub executed_ts: u64,
    pub executed_ts_on_oms: u64,

    pub side: Side,
    pub has_been_live: bool,
    pub exchange_order_id: u64,
    pub client_order_id: u64,

    pub cum_filled_qty: f64,
    pub cum_fee: f64,
    pub fill_fee: f64,
    pub fill_px: f64,
    pub fill_sz: f64,
    pub fill_pnl: f64,
    pub fill_maker: bool,
    pub transaction_id: String,

    pub price_on_exch: f64,
    pub qty_on_exch: f64,
    pub qty_submitted: f64,
    pub price_submitted: f64,

    /// Earliest local time a throttled order may be re-sent.
    pub place_order_now: u64,
    pub instrument_id: String,

    pub status: OrderStatus,
    pub reason: RejectReason,
}

impl OrderHandler {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            new_order_on_oms_ts: 0,
            new_order_on_exch_ts: 0,
            new_order_confirmation_ts: 0,
            modify_order_on_oms_ts: 0,
            modify_order_on_exch_ts: 0,
            modify_order_confirmation_ts: 0,
            cancel_order_on_oms_ts: 0,
            cancel_order_on_exch_ts: 0,
            cancel_order_confirmation_ts: 0,
            rejection_ts: 0,
            executed_ts: 0,
            executed_ts_on_oms: 0,
            side: Side::Bid,
            has_been_live: false,
            exchange_order_id: 0,
            client_order_id: 0,
            cum_filled_qty: 0.0,
            cum_fee: 0.0,
            fill_fee: 0.0,
            fill_px: 0.0,
            fill_sz: 0.0,
            fill_pnl: 0.0,
            fill_maker: false,
            transaction_id: String::new(),
            price_on_exch: 0.0,
            qty_on_exch: 0.0,
            qty_submitted: 0.0,
            price_submitted: 0.0,
            place_order_now: 0,
            instrument_id: instrument.into(),
            status: OrderStatus::Initial,
            reason: RejectReason::None,
        }
    }

    /// Remaining quantity as last reported by the exchange.
    #[inline]
    pub fn remaining_qty(&self) -> f64 {
        (self.qty_submitted - self.cum_filled_qty).max(0.0)
    }
}

/// Value shipped inside `OrderUpdate` events: a point-in-time copy of
/// the handler, taken while the store lock is held.
pub type OrderSnapshot = OrderHandler;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_handler_defaults() {
        let order = OrderHandler::new("quotex_perp_doge_usdt");
        assert_eq!(order.status, OrderStatus::Initial);
        assert_eq!(order.reason, RejectReason::None);
        assert_eq!(order.client_order_id, 0);
        assert_eq!(order.cum_filled_qty, 0.0);
        assert!(!order.has_been_live);
        assert_eq!(order.instrument_id, "quotex_perp_doge_usdt");
    }

    #[test]
    fn test_remaining_qty() {
        let mut order = OrderHandler::new("quotex_perp_doge_usdt");
        order.qty_submitted = 2.0;
        order.cum_filled_qty = 0.5;
        assert_eq!(order.remaining_qty(), 1.5);

        // Exchange over-reporting never goes negative
        order.cum_filled_qty = 2.5;
        assert_eq!(order.remaining_qty(), 0.0);
    }
}
