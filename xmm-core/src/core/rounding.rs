//! Tick rounding for prices and sizes
//!
//! Price rounding is side-aware: `Inner` rounds toward mid (asks round
//! down, bids round up), `Away` rounds away from mid, `Nearest` rounds
//! to the closest tick. Size rounding is directionless but never rounds
//! below one quantity tick, so a configured size always produces a
//! sendable order.

use anyhow::{bail, Result};

use super::types::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeRoundMode {
    Ceil,
    Floor,
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceRoundMode {
    Inner,
    Away,
    Nearest,
}

pub fn parse_size_round_mode(mode: &str) -> Result<SizeRoundMode> {
    match mode {
        "ceil" => Ok(SizeRoundMode::Ceil),
        "floor" => Ok(SizeRoundMode::Floor),
        "nearest" => Ok(SizeRoundMode::Nearest),
        other => bail!("invalid size round mode: {other}"),
    }
}

pub fn parse_price_round_mode(mode: &str) -> Result<PriceRoundMode> {
    match mode {
        "inner" => Ok(PriceRoundMode::Inner),
        "away" => Ok(PriceRoundMode::Away),
        "nearest" => Ok(PriceRoundMode::Nearest),
        other => bail!("invalid price round mode: {other}"),
    }
}

/// Tolerance in tick units; values within it of a grid line count as
/// on-grid, so decimal-string arithmetic does not jump a tick.
const GRID_EPSILON: f64 = 1e-9;

#[inline]
fn round_up(value: f64, tick: f64) -> f64 {
    (value / tick - GRID_EPSILON).ceil() * tick
}

#[inline]
fn round_down(value: f64, tick: f64) -> f64 {
    (value / tick + GRID_EPSILON).floor() * tick
}

#[inline]
fn round_nearest(value: f64, tick: f64) -> f64 {
    (value / tick).round() * tick
}

/// Rounds raw ladder prices onto the venue price grid.
#[derive(Debug, Clone, Copy)]
pub struct PriceRounder {
    tick_size: f64,
    mode: PriceRoundMode,
}

impl PriceRounder {
    pub fn new(tick_size: f64, mode: PriceRoundMode) -> Result<Self> {
        if tick_size <= 0.0 {
            bail!("price tick size must be positive, got {tick_size}");
        }
        Ok(Self { tick_size, mode })
    }

    #[inline]
    pub fn round(&self, side: Side, price: f64) -> f64 {
        match self.mode {
            PriceRoundMode::Inner => match side {
                Side::Bid => round_up(price, self.tick_size),
                Side::Ask => round_down(price, self.tick_size),
            },
            PriceRoundMode::Away => match side {
                Side::Bid => round_down(price, self.tick_size),
                Side::Ask => round_up(price, self.tick_size),
            },
            PriceRoundMode::Nearest => round_nearest(price, self.tick_size),
        }
    }

    #[inline]
    pub fn round_ask(&self, price: f64) -> f64 {
        self.round(Side::Ask, price)
    }

    #[inline]
    pub fn round_bid(&self, price: f64) -> f64 {
        self.round(Side::Bid, price)
    }

    #[inline]
    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }
}

/// Rounds order sizes onto the venue quantity grid, clamped to at least
/// one tick.
#[derive(Debug, Clone, Copy)]
pub struct SizeRounder {
    tick_size: f64,
    mode: SizeRoundMode,
}

impl SizeRounder {
    pub fn new(tick_size: f64, mode: SizeRoundMode) -> Result<Self> {
        if tick_size <= 0.0 {
            bail!("quantity tick size must be positive, got {tick_size}");
        }
        Ok(Self { tick_size, mode })
    }

    #[inline]
    pub fn round(&self, size: f64) -> f64 {
        let rounded = match self.mode {
            SizeRoundMode::Ceil => round_up(size, self.tick_size),
            SizeRoundMode::Floor => round_down(size, self.tick_size),
            SizeRoundMode::Nearest => round_nearest(size, self.tick_size),
        };
        rounded.max(self.tick_size)
    }

    #[inline]
    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }
}
