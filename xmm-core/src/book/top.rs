//! Top-of-book container
//!
//! Best bid/ask and the update timestamp are single 64-bit cells so the
//! dispatcher can read them without taking the depth lock; the parser
//! thread is the only writer. Instrument names follow the
//! `exchange_market_base_quote` convention and the accessors split on
//! underscores.

use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::level::LevelLadder;

/// Depth for one venue/instrument pair.
pub struct Book {
    instrument: String,
    best_bid: AtomicCell<f64>,
    best_ask: AtomicCell<f64>,
    timestamp_ns: AtomicU64,
    depth: Mutex<BookDepth>,
}

pub struct BookDepth {
    pub bids: LevelLadder,
    pub asks: LevelLadder,
}

impl Book {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            best_bid: AtomicCell::new(0.0),
            best_ask: AtomicCell::new(0.0),
            timestamp_ns: AtomicU64::new(0),
            depth: Mutex::new(BookDepth {
                bids: LevelLadder::bids(),
                asks: LevelLadder::asks(),
            }),
        }
    }

    #[inline]
    pub fn set_best_bid(&self, price: f64) {
        self.best_bid.store(price);
    }

    #[inline]
    pub fn set_best_ask(&self, price: f64) {
        self.best_ask.store(price);
    }

    #[inline]
    pub fn best_bid(&self) -> f64 {
        self.best_bid.load()
    }

    #[inline]
    pub fn best_ask(&self) -> f64 {
        self.best_ask.load()
    }

    #[inline]
    pub fn mid(&self) -> f64 {
        (self.best_bid() + self.best_ask()) / 2.0
    }

    /// Relative spread: (ask - bid) / mid.
    #[inline]
    pub fn spread(&self) -> f64 {
        let bid = self.best_bid();
        let ask = self.best_ask();
        let mid = (ask + bid) / 2.0;
        if mid == 0.0 {
            return 0.0;
        }
        (ask - bid) / mid
    }

    #[inline]
    pub fn set_timestamp_ns(&self, ts: u64) {
        self.timestamp_ns.store(ts, Ordering::Release);
    }

    #[inline]
    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns.load(Ordering::Acquire)
    }

    /// Book age relative to `now_ns`; zero on clock skew.
    pub fn age_ns(&self, now_ns: u64) -> u64 {
        now_ns.saturating_sub(self.timestamp_ns())
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn exchange_name(&self) -> &str {
        self.token(0)
    }

    pub fn market_type(&self) -> &str {
        self.token(1)
    }

    pub fn base_asset(&self) -> &str {
        self.token(2)
    }

    pub fn quote_asset(&self) -> &str {
        self.token(3)
    }

    fn token(&self, index: usize) -> &str {
        self.instrument.split('_').nth(index).unwrap_or("")
    }

    /// Depth access for the parser thread and depth-aware checks.
    pub fn with_depth<R>(&self, f: impl FnOnce(&mut BookDepth) -> R) -> R {
        f(&mut self.depth.lock())
    }

    /// Both sides sorted and within capacity.
    pub fn depth_is_well_formed(&self) -> bool {
        let depth = self.depth.lock();
        depth.bids.is_well_formed() && depth.asks.is_well_formed()
    }
}
