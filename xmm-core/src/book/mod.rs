//! Per-venue order books
//!
//! One `Book` per (venue, instrument): lock-free top-of-book cells for
//! the dispatcher's hot reads, plus bounded sorted level arrays behind a
//! mutex for depth queries. Written only by the owning connector's
//! parser thread.

pub mod health;
pub mod level;

mod top;

pub use health::{BookFreshnessChecker, BookSpreadChecker};
pub use level::{LevelLadder, PriceLevel, MAX_LEVELS};
pub use top::{Book, BookDepth};
