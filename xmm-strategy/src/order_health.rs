//! Quote health check
//!
//! Detects stale or mispriced quotes: the innermost target on a side is
//! healthy only while the shifted reference touch stays strictly inner
//! to a safety boundary `minimum_distance` inner of that quote. A side
//! with no targets at all is unhealthy.

use tracing::debug;

use xmm_core::book::Book;
use xmm_core::Side;

use super::ladder::TargetOrderManager;
use super::quote_mid::QuoteMidService;

pub struct OrderHealthChecker {
    /// Required fractional distance between quote and reference touch.
    minimum_distance: f64,
}

impl OrderHealthChecker {
    pub fn new(minimum_distance: f64) -> Self {
        Self { minimum_distance }
    }

    pub fn check(
        &self,
        side: Side,
        ladder: &TargetOrderManager,
        reference_book: &Book,
        quote_mid_service: &QuoteMidService,
    ) -> bool {
        let Some(best_target) = ladder.best_target(side) else {
            debug!(
                action = "check_order_health",
                side = %side,
                reason = "no_active_orders",
            );
            return false;
        };

        let quote = best_target.price;
        let boundary = quote * side.add_inner(1.0, self.minimum_distance);
        let reference_touch = match side {
            Side::Ask => reference_book.best_ask(),
            Side::Bid => reference_book.best_bid(),
        };
        let shifted_touch = quote_mid_service.shift(reference_touch);
        let is_safe = side.is_inner(shifted_touch, boundary);

        debug!(
            action = "check_order_health",
            side = %side,
            best_quote_price = quote,
            safety_boundary = boundary,
            ref_touch_price = shifted_touch,
            result = if is_safe { "pass" } else { "fail" },
        );
        is_safe
    }
}
