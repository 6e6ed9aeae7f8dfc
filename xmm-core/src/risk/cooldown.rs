//! Duration-based gate
//!
//! `start_cooldown` arms the gate only when it is not already armed;
//! `restart_cooldown` re-arms unconditionally. Callers pass `Instant`s
//! explicitly where determinism matters (tests, the rate limiter).

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CooldownTimer {
    cooldown_duration: Duration,
    cooldown_end_time: Option<Instant>,
}

impl CooldownTimer {
    pub fn new(cooldown_duration: Duration) -> Self {
        Self {
            cooldown_duration,
            cooldown_end_time: None,
        }
    }

    pub fn is_in_cooldown(&self) -> bool {
        self.is_in_cooldown_at(Instant::now())
    }

    pub fn is_in_cooldown_at(&self, now: Instant) -> bool {
        matches!(self.cooldown_end_time, Some(end) if now < end)
    }

    pub fn start_cooldown(&mut self) {
        self.start_cooldown_at(Instant::now());
    }

    pub fn start_cooldown_at(&mut self, now: Instant) {
        if !self.is_in_cooldown_at(now) {
            self.cooldown_end_time = Some(now + self.cooldown_duration);
        }
    }

    pub fn restart_cooldown(&mut self) {
        self.restart_cooldown_at(Instant::now());
    }

    pub fn restart_cooldown_at(&mut self, now: Instant) {
        self.cooldown_end_time = Some(now + self.cooldown_duration);
    }

    pub fn remaining(&self) -> Duration {
        self.remaining_at(Instant::now())
    }

    pub fn remaining_at(&self, now: Instant) -> Duration {
        match self.cooldown_end_time {
            Some(end) if end > now => end - now,
            _ => Duration::ZERO,
        }
    }

    pub fn cooldown_end_time(&self) -> Option<Instant> {
        self.cooldown_end_time
    }
}
