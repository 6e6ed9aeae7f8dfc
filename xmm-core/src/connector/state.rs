//! Connection state and reconnect policy
//!
//! ```text
//!   Disconnected ── connect() ──► Connecting ── on_open ──► Open
//!      ▲                               │                     │
//!      │                               └── on_fail ──────────┤
//!      │                                                     ▼
//!      └──────────── schedule_reconnect ◄── on_close ──── Closing
//! ```
//!
//! The attempt counter increments on every close or failure and is
//! never reset by a successful open, so a connection that flaps
//! `retry_limit + 1` times over its lifetime gives up for good. An
//! attempt landing exactly on the limit still reconnects; only the
//! next one is refused.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WsState {
    Disconnected = 0,
    Connecting = 1,
    Open = 2,
    Closing = 3,
}

impl WsState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WsState::Connecting,
            2 => WsState::Open,
            3 => WsState::Closing,
            _ => WsState::Disconnected,
        }
    }
}

/// Lock-free state cell shared between the I/O thread and observers.
#[derive(Debug)]
pub struct WsStateCell(AtomicU8);

impl WsStateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(WsState::Disconnected as u8))
    }

    pub fn set(&self, state: WsState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub fn get(&self) -> WsState {
        WsState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.get() == WsState::Open
    }
}

impl Default for WsStateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Try again; emit `WsDisconnected(false)`.
    Reconnect,
    /// Retry budget exhausted; emit `WsDisconnected(true)` and stay down.
    GiveUp,
}

/// Linear reconnect budget for one channel.
#[derive(Debug)]
pub struct ReconnectPolicy {
    retry_limit: u32,
    attempts: AtomicU32,
}

impl ReconnectPolicy {
    pub fn new(retry_limit: u32) -> Self {
        Self {
            retry_limit,
            attempts: AtomicU32::new(0),
        }
    }

    /// Record one close/failure and decide what happens next.
    pub fn on_connection_lost(&self) -> ReconnectDecision {
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        if attempt > self.retry_limit {
            ReconnectDecision::GiveUp
        } else {
            ReconnectDecision::Reconnect
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }
}
