//! Core domain types shared across the engine
//!
//! Everything in here is small, `Copy` where possible, and free of I/O:
//! the side algebra, order status and reject taxonomy, venue roles,
//! id generation, and tick rounding.

pub mod ids;
pub mod rounding;
pub mod types;

pub use ids::{next_client_order_id, next_request_id, now_ns};
pub use rounding::{
    parse_price_round_mode, parse_size_round_mode, PriceRoundMode, PriceRounder, SizeRoundMode,
    SizeRounder,
};
pub use types::{OrderStatus, RejectReason, Side, VenueRole, PRICE_EPSILON};
