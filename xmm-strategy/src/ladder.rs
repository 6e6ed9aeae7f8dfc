//! Target-order ladder
//!
//! Computes the desired resting orders per side from the reference
//! book, the local quote book and current inventory (through the
//! quote-mid service). Results live in per-side maps keyed by
//! tick-quantized price, ask side ascending and bid side descending,
//! with a dirty/clean protocol so a refresh is free when nothing
//! relevant changed.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use xmm_core::book::Book;
use xmm_core::core::{PriceRoundMode, PriceRounder, SizeRoundMode, SizeRounder};
use xmm_core::Side;

use super::quote_mid::QuoteMidService;
use super::shift::{PostablePriceShifter, TouchPriceShifter};

/// Whether rung offsets apply to the shifted mid or to the reference
/// touch on the rung's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetBase {
    Mid,
    Touch,
}

#[derive(Debug, Clone, Copy)]
pub struct TargetOrder {
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

/// One configured rung: fractional offset and size.
#[derive(Debug, Clone, Copy)]
pub struct Rung {
    pub offset: f64,
    pub size: f64,
}

#[derive(Debug, Clone)]
pub struct LadderSettings {
    pub price_tick_size: f64,
    pub quantity_tick_size: f64,
    pub price_round_mode: PriceRoundMode,
    pub size_round_mode: SizeRoundMode,
    pub offset_base: OffsetBase,
    pub enable_touch_price: bool,
    pub ticks_from_touch: f64,
    pub enable_postable_price: bool,
    pub ticks_from_postable: f64,
}

pub struct TargetOrderManager {
    quote_book: Arc<Book>,
    reference_book: Arc<Book>,
    settings: LadderSettings,
    ask_rungs: Vec<Rung>,
    bid_rungs: Vec<Rung>,
    /// Sizes rounded once at construction.
    ask_sizes: Vec<f64>,
    bid_sizes: Vec<f64>,
    price_rounder: PriceRounder,
    touch_shifter: TouchPriceShifter,
    postable_shifter: PostablePriceShifter,
    /// Scratch buffer reused across refreshes.
    prices: Vec<f64>,
    ask_targets: BTreeMap<i64, TargetOrder>,
    bid_targets: BTreeMap<i64, TargetOrder>,
    ask_dirty: bool,
    bid_dirty: bool,
}

impl TargetOrderManager {
    pub fn new(
        quote_book: Arc<Book>,
        reference_book: Arc<Book>,
        settings: LadderSettings,
        ask_rungs: Vec<Rung>,
        bid_rungs: Vec<Rung>,
    ) -> Result<Self> {
        let price_rounder =
            PriceRounder::new(settings.price_tick_size, settings.price_round_mode)?;
        let size_rounder =
            SizeRounder::new(settings.quantity_tick_size, settings.size_round_mode)?;
        let ask_sizes = ask_rungs.iter().map(|r| size_rounder.round(r.size)).collect();
        let bid_sizes = bid_rungs.iter().map(|r| size_rounder.round(r.size)).collect();
        let touch_shifter =
            TouchPriceShifter::new(settings.ticks_from_touch, settings.price_tick_size);
        let postable_shifter =
            PostablePriceShifter::new(settings.ticks_from_postable, settings.price_tick_size);
        Ok(Self {
            quote_book,
            reference_book,
            ask_rungs,
            bid_rungs,
            ask_sizes,
            bid_sizes,
            price_rounder,
            touch_shifter,
            postable_shifter,
            prices: Vec::new(),
            ask_targets: BTreeMap::new(),
            bid_targets: BTreeMap::new(),
            ask_dirty: true,
            bid_dirty: true,
            settings,
        })
    }

    #[inline]
    fn tick_key(&self, price: f64) -> i64 {
        (price / self.settings.price_tick_size).round() as i64
    }

    pub fn is_dirty(&self, side: Side) -> bool {
        match side {
            Side::Ask => self.ask_dirty,
            Side::Bid => self.bid_dirty,
        }
    }

    pub fn is_clean(&self, side: Side) -> bool {
        !self.is_dirty(side)
    }

    pub fn set_dirty(&mut self, side: Side) {
        match side {
            Side::Ask => self.ask_dirty = true,
            Side::Bid => self.bid_dirty = true,
        }
    }

    pub fn set_both_dirty(&mut self) {
        self.ask_dirty = true;
        self.bid_dirty = true;
    }

    fn set_clean(&mut self, side: Side) {
        match side {
            Side::Ask => self.ask_dirty = false,
            Side::Bid => self.bid_dirty = false,
        }
    }

    /// Recompute one side's targets. No-op while the side is clean.
    pub fn refresh(&mut self, side: Side, quote_mid_service: &QuoteMidService) {
        if self.is_clean(side) {
            return;
        }

        let ref_mid = self.reference_book.mid();
        let quote_mid = quote_mid_service.shift(ref_mid);
        let local_touch = match side {
            Side::Ask => self.quote_book.best_ask(),
            Side::Bid => self.quote_book.best_bid(),
        };
        let local_opposite = match side {
            Side::Ask => self.quote_book.best_bid(),
            Side::Bid => self.quote_book.best_ask(),
        };
        let reference_touch = match side {
            Side::Ask => self.reference_book.best_ask(),
            Side::Bid => self.reference_book.best_bid(),
        };

        let rungs = match side {
            Side::Ask => &self.ask_rungs,
            Side::Bid => &self.bid_rungs,
        };
        self.prices.clear();
        for rung in rungs {
            let base = match self.settings.offset_base {
                OffsetBase::Mid => quote_mid,
                OffsetBase::Touch => reference_touch,
            };
            let raw_price = base * side.add_away(1.0, rung.offset);
            self.prices.push(self.price_rounder.round(side, raw_price));
        }

        if self.settings.enable_touch_price {
            self.touch_shifter.shift(side, &mut self.prices, local_touch);
        }
        if self.settings.enable_postable_price {
            self.postable_shifter
                .shift(side, &mut self.prices, local_opposite);
        }

        let sizes = match side {
            Side::Ask => &self.ask_sizes,
            Side::Bid => &self.bid_sizes,
        };
        let mut targets = BTreeMap::new();
        for (price, size) in self.prices.iter().zip(sizes) {
            targets.insert(
                (*price / self.settings.price_tick_size).round() as i64,
                TargetOrder {
                    side,
                    price: *price,
                    size: *size,
                },
            );
        }
        match side {
            Side::Ask => self.ask_targets = targets,
            Side::Bid => self.bid_targets = targets,
        }
        self.set_clean(side);

        debug!(
            action = "refresh_target_orders",
            side = %side,
            ref_mid,
            quote_mid,
            count = self.target_count(side),
        );
    }

    pub fn target_count(&self, side: Side) -> usize {
        match side {
            Side::Ask => self.ask_targets.len(),
            Side::Bid => self.bid_targets.len(),
        }
    }

    /// Targets ordered innermost first.
    pub fn targets(&self, side: Side) -> Vec<TargetOrder> {
        match side {
            Side::Ask => self.ask_targets.values().copied().collect(),
            Side::Bid => self.bid_targets.values().rev().copied().collect(),
        }
    }

    /// Innermost target price, if any.
    pub fn best_target(&self, side: Side) -> Option<TargetOrder> {
        match side {
            Side::Ask => self.ask_targets.values().next().copied(),
            Side::Bid => self.bid_targets.values().next_back().copied(),
        }
    }

    /// The target at this price level, if one exists.
    pub fn target_at(&self, side: Side, price: f64) -> Option<TargetOrder> {
        let key = self.tick_key(price);
        match side {
            Side::Ask => self.ask_targets.get(&key).copied(),
            Side::Bid => self.bid_targets.get(&key).copied(),
        }
    }

    /// Whether a resting order at (price, size) matches some target,
    /// with one quantity tick of size tolerance.
    pub fn is_in_target_orders(&self, side: Side, price: f64, size: f64) -> bool {
        match self.target_at(side, price) {
            Some(target) => (target.size - size).abs() < self.settings.quantity_tick_size,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote_mid::QuoteMidSettings;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn books(ref_bid: f64, ref_ask: f64, local_bid: f64, local_ask: f64) -> (Arc<Book>, Arc<Book>) {
        let reference = Arc::new(Book::new("refx_perp_doge_usdt"));
        reference.set_best_bid(ref_bid);
        reference.set_best_ask(ref_ask);
        let quote = Arc::new(Book::new("quotex_perp_doge_usdt"));
        quote.set_best_bid(local_bid);
        quote.set_best_ask(local_ask);
        (quote, reference)
    }

    fn neutral_mid_service() -> QuoteMidService {
        QuoteMidService::new(QuoteMidSettings::default(), Arc::new(|| 0.0)).unwrap()
    }

    fn settings(tick: f64, touch: bool, postable: bool) -> LadderSettings {
        LadderSettings {
            price_tick_size: tick,
            quantity_tick_size: 0.1,
            price_round_mode: PriceRoundMode::Away,
            size_round_mode: SizeRoundMode::Floor,
            offset_base: OffsetBase::Mid,
            enable_touch_price: touch,
            ticks_from_touch: 1.0,
            enable_postable_price: postable,
            ticks_from_postable: 1.0,
        }
    }

    fn rungs(values: &[(f64, f64)]) -> Vec<Rung> {
        values
            .iter()
            .map(|(offset, size)| Rung {
                offset: *offset,
                size: *size,
            })
            .collect()
    }

    #[test]
    fn test_basic_two_sided_ladder() {
        // Reference 100.00/100.10, one rung per side at 0.1% of mid
        let (quote, reference) = books(100.0, 100.1, 100.0, 100.1);
        let mut ladder = TargetOrderManager::new(
            quote,
            reference,
            settings(0.01, true, false),
            rungs(&[(0.001, 1.0)]),
            rungs(&[(0.001, 1.0)]),
        )
        .unwrap();
        let mid_service = neutral_mid_service();

        ladder.refresh(Side::Ask, &mid_service);
        ladder.refresh(Side::Bid, &mid_service);

        // mid = 100.05; ask raw 100.15005 rounds up to 100.16? away mode:
        // ceil(10015.005)/100 = 100.16; bid raw 99.94995 floors to 99.94
        let ask = ladder.best_target(Side::Ask).unwrap();
        let bid = ladder.best_target(Side::Bid).unwrap();
        assert!(close(ask.price, 100.16), "ask {}", ask.price);
        assert!(close(bid.price, 99.94), "bid {}", bid.price);
        assert!(close(ask.size, 1.0));
        assert!(close(bid.size, 1.0));
    }

    #[test]
    fn test_refresh_is_noop_when_clean() {
        let (quote, reference) = books(100.0, 100.1, 100.0, 100.1);
        let mut ladder = TargetOrderManager::new(
            quote,
            Arc::clone(&reference),
            settings(0.01, false, false),
            rungs(&[(0.001, 1.0)]),
            rungs(&[(0.001, 1.0)]),
        )
        .unwrap();
        let mid_service = neutral_mid_service();

        ladder.refresh(Side::Ask, &mid_service);
        let before = ladder.best_target(Side::Ask).unwrap().price;

        // Book moves but the side stays clean
        reference.set_best_ask(101.0);
        reference.set_best_bid(100.9);
        ladder.refresh(Side::Ask, &mid_service);
        assert!(close(ladder.best_target(Side::Ask).unwrap().price, before));

        // Marked dirty: refresh recomputes
        ladder.set_dirty(Side::Ask);
        ladder.refresh(Side::Ask, &mid_service);
        assert!(!close(ladder.best_target(Side::Ask).unwrap().price, before));
    }

    #[test]
    fn test_touch_shift_scenario() {
        // Offsets 1/2/3 bp, mid 100.00, rounded-up raw prices land at
        // 100.01 / 100.02 / 100.03
        let (quote, reference) = books(99.995, 100.005, 99.995, 100.005);
        let mut ladder = TargetOrderManager::new(
            Arc::clone(&quote),
            reference,
            settings(0.01, true, false),
            rungs(&[(0.0001, 1.0), (0.0002, 1.0), (0.0003, 1.0)]),
            Vec::new(),
        )
        .unwrap();
        let mid_service = neutral_mid_service();

        // Local best ask 100.005: innermost 100.01 is already away
        ladder.refresh(Side::Ask, &mid_service);
        let prices: Vec<f64> = ladder.targets(Side::Ask).iter().map(|t| t.price).collect();
        assert!(close(prices[0], 100.01));
        assert!(close(prices[1], 100.02));
        assert!(close(prices[2], 100.03));

        // Local best ask 100.05: whole ladder pushed outward
        quote.set_best_ask(100.05);
        ladder.set_dirty(Side::Ask);
        ladder.refresh(Side::Ask, &mid_service);
        let prices: Vec<f64> = ladder.targets(Side::Ask).iter().map(|t| t.price).collect();
        assert!(close(prices[0], 100.06), "got {prices:?}");
        assert!(close(prices[1], 100.07));
        assert!(close(prices[2], 100.08));
    }

    #[test]
    fn test_postable_shift_keeps_orders_resting() {
        // Ask ladder at/below the local bid must move above it
        let (quote, reference) = books(100.0, 100.001, 100.1, 100.2);
        let mut ladder = TargetOrderManager::new(
            quote,
            reference,
            settings(0.01, false, true),
            rungs(&[(0.00001, 1.0)]),
            Vec::new(),
        )
        .unwrap();
        let mid_service = neutral_mid_service();
        ladder.refresh(Side::Ask, &mid_service);

        let ask = ladder.best_target(Side::Ask).unwrap();
        // Opposite best 100.1 plus (1 + ticks_from_postable) ticks
        assert!(ask.price > 100.1, "ask {} must rest", ask.price);
        assert!(close(ask.price, 100.12));
    }

    #[test]
    fn test_empty_ladder_config() {
        let (quote, reference) = books(100.0, 100.1, 100.0, 100.1);
        let mut ladder = TargetOrderManager::new(
            quote,
            reference,
            settings(0.01, true, true),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        let mid_service = neutral_mid_service();
        ladder.refresh(Side::Ask, &mid_service);
        ladder.refresh(Side::Bid, &mid_service);
        assert_eq!(ladder.target_count(Side::Ask), 0);
        assert_eq!(ladder.target_count(Side::Bid), 0);
        assert!(ladder.best_target(Side::Ask).is_none());
    }

    #[test]
    fn test_adjacent_targets_at_least_one_tick_apart() {
        let (quote, reference) = books(100.0, 100.001, 100.0, 100.001);
        // Tiny offsets collapse to the same rounded price without shifting
        let mut ladder = TargetOrderManager::new(
            quote,
            reference,
            settings(0.01, true, false),
            rungs(&[(0.00001, 1.0), (0.00002, 1.0), (0.00003, 1.0)]),
            rungs(&[(0.00001, 1.0), (0.00002, 1.0), (0.00003, 1.0)]),
        )
        .unwrap();
        let mid_service = neutral_mid_service();
        ladder.refresh(Side::Ask, &mid_service);
        ladder.refresh(Side::Bid, &mid_service);

        for side in [Side::Ask, Side::Bid] {
            let targets = ladder.targets(side);
            assert_eq!(targets.len(), 3);
            for window in targets.windows(2) {
                let gap = (window[1].price - window[0].price).abs();
                assert!(
                    gap >= 0.01 - 1e-9,
                    "{side} ladder spacing violated: {targets:?}"
                );
                assert!(
                    side.is_away(window[1].price, window[0].price),
                    "{side} ladder must widen outward"
                );
            }
        }
    }

    #[test]
    fn test_touch_offset_base_uses_reference_touch() {
        let (quote, reference) = books(100.0, 100.2, 100.0, 100.2);
        let mut settings = settings(0.01, false, false);
        settings.offset_base = OffsetBase::Touch;
        let mut ladder = TargetOrderManager::new(
            quote,
            reference,
            settings,
            rungs(&[(0.001, 1.0)]),
            rungs(&[(0.001, 1.0)]),
        )
        .unwrap();
        let mid_service = neutral_mid_service();
        ladder.refresh(Side::Ask, &mid_service);
        ladder.refresh(Side::Bid, &mid_service);

        // Ask anchored to reference ask 100.2, bid to reference bid 100.0
        let ask = ladder.best_target(Side::Ask).unwrap();
        let bid = ladder.best_target(Side::Bid).unwrap();
        assert!(close(ask.price, 100.31), "ask {}", ask.price);
        assert!(close(bid.price, 99.90), "bid {}", bid.price);
    }

    #[test]
    fn test_is_in_target_orders_with_size_tolerance() {
        let (quote, reference) = books(100.0, 100.1, 100.0, 100.1);
        let mut ladder = TargetOrderManager::new(
            quote,
            reference,
            settings(0.01, false, false),
            rungs(&[(0.001, 1.0)]),
            Vec::new(),
        )
        .unwrap();
        let mid_service = neutral_mid_service();
        ladder.refresh(Side::Ask, &mid_service);

        let ask = ladder.best_target(Side::Ask).unwrap();
        assert!(ladder.is_in_target_orders(Side::Ask, ask.price, 1.0));
        // Within one quantity tick
        assert!(ladder.is_in_target_orders(Side::Ask, ask.price, 1.05));
        // Off by more than a tick or at a different price
        assert!(!ladder.is_in_target_orders(Side::Ask, ask.price, 1.5));
        assert!(!ladder.is_in_target_orders(Side::Ask, ask.price + 0.01, 1.0));
        assert!(!ladder.is_in_target_orders(Side::Bid, ask.price, 1.0));
    }

    #[test]
    fn test_inventory_skews_ladder_downward() {
        let (quote, reference) = books(100.0, 100.1, 100.0, 100.1);
        let mut ladder = TargetOrderManager::new(
            quote,
            reference,
            settings(0.01, false, false),
            rungs(&[(0.001, 1.0)]),
            rungs(&[(0.001, 1.0)]),
        )
        .unwrap();
        let skewed = QuoteMidService::new(
            crate::quote_mid::QuoteMidSettings {
                use_position_shift: true,
                shift_ratio_per_position: 0.0001,
                ..Default::default()
            },
            Arc::new(|| 10.0),
        )
        .unwrap();

        ladder.refresh(Side::Ask, &skewed);
        let skewed_ask = ladder.best_target(Side::Ask).unwrap().price;

        let mut neutral_ladder = TargetOrderManager::new(
            books(100.0, 100.1, 100.0, 100.1).0,
            books(100.0, 100.1, 100.0, 100.1).1,
            settings(0.01, false, false),
            rungs(&[(0.001, 1.0)]),
            rungs(&[(0.001, 1.0)]),
        )
        .unwrap();
        let neutral = neutral_mid_service();
        neutral_ladder.refresh(Side::Ask, &neutral);
        let neutral_ask = neutral_ladder.best_target(Side::Ask).unwrap().price;

        // Long inventory pulls the ask ladder down toward the market
        assert!(skewed_ask < neutral_ask);
    }
}
