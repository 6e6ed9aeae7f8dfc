//! Order-flow safety gates: cooldown timer and token-bucket rate limiter

pub mod cooldown;
pub mod rate_limiter;

pub use cooldown::CooldownTimer;
pub use rate_limiter::TokenBucketRateLimiter;
