//! xmm-strategy - quoting policy for the xmm market maker
//!
//! Computes the target-order ladder from the reference market, keeps
//! the resting quotes in sync with it, and hedges filled inventory on
//! the hedge venue. The mechanical layers (connectors, OMS, positions,
//! the event loop) live in `xmm-core`; this crate decides what the
//! quotes should be and wires everything together.

pub mod hedger;
pub mod ladder;
pub mod order_health;
pub mod quote_mid;
pub mod shift;
pub mod strategy;

pub use hedger::Hedger;
pub use ladder::{LadderSettings, OffsetBase, TargetOrder, TargetOrderManager};
pub use order_health::OrderHealthChecker;
pub use quote_mid::{PositionProvider, QuoteMidService, QuoteMidSettings};
pub use shift::{PostablePriceShifter, TouchPriceShifter};
pub use strategy::Strategy;
