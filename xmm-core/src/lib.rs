//! xmm-core - engine infrastructure for a cross-exchange market maker
//!
//! The engine quotes a ladder of resting limit orders on one derivatives
//! exchange, derives target prices from a faster reference market, and
//! reflexively hedges filled inventory at a second exchange. Everything
//! that is not quoting policy lives in this crate.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ reference md │  │  quote md    │  │  hedge md    │   connector threads
//! │  (WsClient)  │  │  (WsClient)  │  │  (WsClient)  │   parse into Books
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        │ MarketUpdate    │                 │
//!        ▼                 ▼                 ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                EventProcessor (1 thread)            │
//! │  serializes market ticks, order updates, recon      │
//! │  results, heartbeats, ws disconnects                │
//! └──────┬──────────────────────────────────────┬───────┘
//!        │ reads books, order maps, positions   │
//!        ▼                                      ▼
//! ┌──────────────┐                      ┌──────────────┐
//! │ OrderManager │◄── acks / fills ─────│ OrderManager │
//! │   (quote)    │    (trade channels)  │   (hedge)    │
//! └──────┬───────┘                      └──────┬───────┘
//!        │ fills                               │ fills
//!        ▼                                      ▼
//! ┌──────────────┐                      ┌──────────────┐
//! │ PositionMgr  │── recon thread ──►   │ PositionMgr  │
//! └──────────────┘   (per venue)        └──────────────┘
//! ```
//!
//! ## Concurrency model
//!
//! All domain state mutation funnels through the event processor's
//! single consumer thread. Concurrent structures are confined to the
//! event queue itself, the atomic position cells, the books' top-of-book
//! cells, and the websocket state flags. Venue connectors and recon
//! loops each own a dedicated thread.

pub mod book;
pub mod config;
pub mod connector;
pub mod core;
pub mod event;
pub mod oms;
pub mod position;
pub mod risk;
pub mod utils;

pub use crate::core::{OrderStatus, RejectReason, Side, VenueRole, PRICE_EPSILON};
pub use book::Book;
pub use event::{Event, EventProcessor};
pub use oms::{OrderManager, OrderSnapshot};
pub use position::{PositionManager, ReconStatus};

pub use anyhow::{Error, Result};

/// Convenient imports for binaries and the strategy layer.
pub mod prelude {
    pub use crate::book::{Book, BookFreshnessChecker, BookSpreadChecker};
    pub use crate::config::{Config, LauncherConfig};
    pub use crate::core::{
        now_ns, OrderStatus, PriceRoundMode, PriceRounder, RejectReason, Side, SizeRoundMode,
        SizeRounder, VenueRole, PRICE_EPSILON,
    };
    pub use crate::event::{Event, EventProcessor};
    pub use crate::oms::{OrderManager, OrderRequest, OrderRouter, OrderSnapshot, OrderType};
    pub use crate::position::{PositionConfig, PositionManager, ReconStatus};
    pub use crate::risk::{CooldownTimer, TokenBucketRateLimiter};
    pub use crate::{Error, Result};
}
