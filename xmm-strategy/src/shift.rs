//! Ladder price shifters
//!
//! Both shifters fix up an already-rounded price ladder, innermost
//! first. The touch shifter anchors the innermost price to the local
//! best on the same side; the postable shifter anchors it to the
//! opposite side's best so the order would rest instead of crossing.
//! Both then walk outward forcing each price at least one tick away
//! from its inner neighbor.

use xmm_core::Side;

#[derive(Debug, Clone, Copy)]
pub struct TouchPriceShifter {
    ticks_from_touch: f64,
    tick_size: f64,
}

impl TouchPriceShifter {
    pub fn new(ticks_from_touch: f64, tick_size: f64) -> Self {
        Self {
            ticks_from_touch,
            tick_size,
        }
    }

    /// `market_price` is the local best on the same side.
    pub fn shift(&self, side: Side, prices: &mut [f64], market_price: f64) {
        if prices.is_empty() {
            return;
        }
        if side.is_inner(prices[0], market_price) {
            prices[0] = side.add_away(market_price, self.ticks_from_touch * self.tick_size);
        }
        for i in 1..prices.len() {
            if side.is_inner_or_equal(prices[i], prices[i - 1]) {
                prices[i] = side.add_away(prices[i - 1], self.tick_size);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PostablePriceShifter {
    ticks_from_postable: f64,
    tick_size: f64,
}

impl PostablePriceShifter {
    pub fn new(ticks_from_postable: f64, tick_size: f64) -> Self {
        Self {
            ticks_from_postable,
            tick_size,
        }
    }

    /// `market_opposite_price` is the local best on the other side.
    pub fn shift(&self, side: Side, prices: &mut [f64], market_opposite_price: f64) {
        if prices.is_empty() {
            return;
        }
        if side.is_inner_or_equal(prices[0], market_opposite_price) {
            prices[0] = side.add_away(
                market_opposite_price,
                (1.0 + self.ticks_from_postable) * self.tick_size,
            );
        }
        for i in 1..prices.len() {
            if side.is_inner_or_equal(prices[i], prices[i - 1]) {
                prices[i] = side.add_away(prices[i - 1], self.tick_size);
            }
        }
    }
}
