//! Side algebra, order status machine, reject taxonomy
//!
//! The `Side` type carries the directional arithmetic the quoting and
//! hedging code is written in terms of. "Inner" always means closer to
//! mid, "away" means farther from mid, so bid and ask paths share one
//! implementation:
//!
//! ```text
//!            bid side                 ask side
//!   away <── 99.98  99.99 │ 100.01  100.02 ──► away
//!                   inner │ inner
//!                       (mid)
//! ```

use std::fmt;

/// Prices arrive as decimal strings and round identically, so two prices
/// closer than this are the same price level.
pub const PRICE_EPSILON: f64 = 1e-9;

/// Which venue an event originated from, by role in the strategy.
///
/// The reference venue feeds quote generation, the quote venue carries the
/// resting ladder, the hedge venue absorbs inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VenueRole {
    Reference = 0,
    Quote = 1,
    Hedge = 2,
}

impl fmt::Display for VenueRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VenueRole::Reference => write!(f, "reference"),
            VenueRole::Quote => write!(f, "quote"),
            VenueRole::Hedge => write!(f, "hedge"),
        }
    }
}

/// Order side with the inner/away price algebra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    Ask = 0,
    Bid = 1,
}

impl Side {
    /// Directional sign: +1 for asks (prices grow away from mid), -1 for bids.
    #[inline(always)]
    pub const fn sign(self) -> f64 {
        match self {
            Side::Ask => 1.0,
            Side::Bid => -1.0,
        }
    }

    #[inline(always)]
    pub const fn opposite(self) -> Side {
        match self {
            Side::Ask => Side::Bid,
            Side::Bid => Side::Ask,
        }
    }

    /// True when the order would be placed by a buy.
    #[inline(always)]
    pub const fn is_buy(self) -> bool {
        matches!(self, Side::Bid)
    }

    pub const fn from_buy(buy: bool) -> Side {
        if buy {
            Side::Bid
        } else {
            Side::Ask
        }
    }

    /// `check` is strictly closer to mid than `reference`.
    #[inline(always)]
    pub fn is_inner(self, check: f64, reference: f64) -> bool {
        match self {
            Side::Ask => check < reference,
            Side::Bid => check > reference,
        }
    }

    #[inline(always)]
    pub fn is_inner_or_equal(self, check: f64, reference: f64) -> bool {
        match self {
            Side::Ask => check <= reference,
            Side::Bid => check >= reference,
        }
    }

    /// `check` is strictly farther from mid than `reference`.
    #[inline(always)]
    pub fn is_away(self, check: f64, reference: f64) -> bool {
        match self {
            Side::Ask => check > reference,
            Side::Bid => check < reference,
        }
    }

    #[inline(always)]
    pub fn is_away_or_equal(self, check: f64, reference: f64) -> bool {
        match self {
            Side::Ask => check >= reference,
            Side::Bid => check <= reference,
        }
    }

    /// Move a price farther from mid by `offset`.
    #[inline(always)]
    pub fn add_away(self, base: f64, offset: f64) -> f64 {
        base + self.sign() * offset
    }

    /// Move a price closer to mid by `offset`.
    #[inline(always)]
    pub fn add_inner(self, base: f64, offset: f64) -> f64 {
        base - self.sign() * offset
    }

    /// The closer-to-mid of two prices.
    #[inline(always)]
    pub fn get_inner(self, first: f64, second: f64) -> f64 {
        match self {
            Side::Ask => first.min(second),
            Side::Bid => first.max(second),
        }
    }

    /// The farther-from-mid of two prices.
    #[inline(always)]
    pub fn get_away(self, first: f64, second: f64) -> f64 {
        match self {
            Side::Ask => first.max(second),
            Side::Bid => first.min(second),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Ask => write!(f, "ask"),
            Side::Bid => write!(f, "bid"),
        }
    }
}

/// Lifecycle status of one order.
///
/// INITIAL exists only between handler construction and the submit
/// attempt; every other state is driven by venue acks and the trade
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OrderStatus {
    Initial = 0,
    Pending = 1,
    Live = 2,
    PartiallyFilled = 3,
    Filled = 4,
    Canceled = 5,
    Rejected = 6,
}

impl OrderStatus {
    /// Terminal statuses feed the retention queues.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }

    /// Still able to produce fills.
    #[inline]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Live | OrderStatus::PartiallyFilled
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Initial => "INITIAL",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Live => "LIVE",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Universal reject taxonomy.
///
/// Venue-specific numeric codes are translated into this enum by the
/// per-venue mapping tables in `oms::reject`; everything downstream of
/// the order manager reasons only in these terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    None,

    // System / connection issues
    ThrottleHit,
    WsFailure,

    // Input validation
    InvalidInstrument,
    OrderSizeNotMultipleOfLotSize,
    OrderPriceNotInRange,
    PostOnlyWillTakeLiquidity,

    // Account / limits
    InsufficientFunds,
    ExceededNumberOfLiveOrders,

    // Order state
    OrderDoesNotExistOnExchOrderbook,
    OrderHasBeenFilledOrCancelled,
    OrderBeingProcessedCannotOperateOnIt,
    OrderNotModifiedNoChangeInPriceQty,

    // Service availability
    ServiceTemporarilyUnavailable,
    ApiOfflineOrUnavailable,
    ExchangeBusy,

    // Auth
    ApiKeyExpired,
    ApiKeyDoesNotMatchEnv,
    AccountBlocked,

    // Feature and restriction
    FeatureUnavailableInDemo,
    InstrumentBlocked,
    RestrictedJurisdiction,

    UnknownError,
}

impl RejectReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            RejectReason::None => "NONE",
            RejectReason::ThrottleHit => "THROTTLE_HIT",
            RejectReason::WsFailure => "WS_FAILURE",
            RejectReason::InvalidInstrument => "INVALID_INSTRUMENT",
            RejectReason::OrderSizeNotMultipleOfLotSize => "ORDER_SIZE_NOT_MULTIPLE_OF_LOT_SIZE",
            RejectReason::OrderPriceNotInRange => "ORDER_PRICE_NOT_IN_RANGE",
            RejectReason::PostOnlyWillTakeLiquidity => "POST_ONLY_WILL_TAKE_LIQUIDITY",
            RejectReason::InsufficientFunds => "INSUFFICIENT_FUNDS",
            RejectReason::ExceededNumberOfLiveOrders => "EXCEEDED_NUMBER_OF_LIVE_ORDERS",
            RejectReason::OrderDoesNotExistOnExchOrderbook => {
                "ORDER_DOES_NOT_EXIST_ON_EXCH_ORDERBOOK"
            }
            RejectReason::OrderHasBeenFilledOrCancelled => "ORDER_HAS_BEEN_FILLED_OR_CANCELLED",
            RejectReason::OrderBeingProcessedCannotOperateOnIt => {
                "ORDER_BEING_PROCESSED_CANNOT_OPERATE_ON_IT"
            }
            RejectReason::OrderNotModifiedNoChangeInPriceQty => {
                "ORDER_NOT_MODIFIED_NO_CHANGE_IN_PRICE_QTY"
            }
            RejectReason::ServiceTemporarilyUnavailable => "SERVICE_TEMPORARILY_UNAVAILABLE",
            RejectReason::ApiOfflineOrUnavailable => "API_OFFLINE_OR_UNAVAILABLE",
            RejectReason::ExchangeBusy => "EXCHANGE_BUSY",
            RejectReason::ApiKeyExpired => "API_KEY_EXPIRED",
            RejectReason::ApiKeyDoesNotMatchEnv => "API_KEY_DOES_NOT_MATCH_ENV",
            RejectReason::AccountBlocked => "ACCOUNT_BLOCKED",
            RejectReason::FeatureUnavailableInDemo => "FEATURE_UNAVAILABLE_IN_DEMO",
            RejectReason::InstrumentBlocked => "INSTRUMENT_BLOCKED",
            RejectReason::RestrictedJurisdiction => "RESTRICTED_JURISDICTION",
            RejectReason::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
