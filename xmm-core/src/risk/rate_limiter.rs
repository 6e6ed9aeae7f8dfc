//! Token-bucket rate limiter with a penalty cooldown
//!
//! `max_tokens` actions per `time_window`, refilled continuously in
//! whole tokens. Draining the bucket trips a cooldown during which all
//! consumes fail and refill is suspended; once it lapses the bucket
//! refills normally again.

use std::time::{Duration, Instant};

use anyhow::{bail, Result};

use super::cooldown::CooldownTimer;

#[derive(Debug, Clone)]
pub struct TokenBucketRateLimiter {
    max_tokens: u32,
    time_window: Duration,
    cooldown_timer: CooldownTimer,
    tokens: u32,
    last_refill_time: Instant,
}

impl TokenBucketRateLimiter {
    pub fn new(max_tokens: u32, time_window: Duration, cooldown_duration: Duration) -> Result<Self> {
        if max_tokens == 0 {
            bail!("max_tokens must be positive");
        }
        if time_window.is_zero() {
            bail!("time_window must be positive");
        }
        Ok(Self {
            max_tokens,
            time_window,
            cooldown_timer: CooldownTimer::new(cooldown_duration),
            tokens: max_tokens,
            last_refill_time: Instant::now(),
        })
    }

    pub fn try_consume(&mut self) -> bool {
        self.try_consume_at(Instant::now())
    }

    pub fn try_consume_at(&mut self, now: Instant) -> bool {
        if self.cooldown_timer.is_in_cooldown_at(now) {
            return false;
        }

        self.refill_tokens(now);

        if self.tokens >= 1 {
            self.tokens -= 1;
            return true;
        }

        self.on_rate_limit_hit(now);
        false
    }

    /// Externally observed throttle (a venue reject): empty the bucket
    /// and enter cooldown.
    pub fn on_rate_limit_hit(&mut self, now: Instant) {
        self.cooldown_timer.start_cooldown_at(now);
        self.tokens = 0;
    }

    pub fn remaining_tokens(&mut self) -> u32 {
        self.remaining_tokens_at(Instant::now())
    }

    pub fn remaining_tokens_at(&mut self, now: Instant) -> u32 {
        self.refill_tokens(now);
        self.tokens
    }

    pub fn is_in_cooldown(&self) -> bool {
        self.cooldown_timer.is_in_cooldown()
    }

    pub fn is_in_cooldown_at(&self, now: Instant) -> bool {
        self.cooldown_timer.is_in_cooldown_at(now)
    }

    pub fn remaining_cooldown_at(&self, now: Instant) -> Duration {
        self.cooldown_timer.remaining_at(now)
    }

    fn refill_tokens(&mut self, now: Instant) {
        if self.cooldown_timer.is_in_cooldown_at(now) {
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill_time);
        let tokens_to_add =
            elapsed.as_secs_f64() * self.max_tokens as f64 / self.time_window.as_secs_f64();
        if tokens_to_add >= 1.0 {
            self.tokens = self
                .max_tokens
                .min(self.tokens.saturating_add(tokens_to_add as u32));
            self.last_refill_time = now;
        }
    }
}
