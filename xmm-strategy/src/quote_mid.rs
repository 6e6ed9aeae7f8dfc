//! Quote-mid derivation
//!
//! The quote mid is the reference price shifted by a constant ratio
//! and/or a position-proportional ratio. The position term leans the
//! ladder against inventory: long inventory shifts the mid down, which
//! tightens asks and backs bids away.

use std::sync::Arc;

use anyhow::{bail, Result};

use xmm_core::position::PositionManager;

/// Read-only view of a venue position.
pub trait PositionProvider: Send + Sync {
    fn get_position(&self) -> f64;
}

impl PositionProvider for PositionManager {
    fn get_position(&self) -> f64 {
        PositionManager::get_position(self)
    }
}

impl<F> PositionProvider for F
where
    F: Fn() -> f64 + Send + Sync,
{
    fn get_position(&self) -> f64 {
        self()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QuoteMidSettings {
    pub use_const_shift: bool,
    pub const_shift_ratio: f64,
    pub use_position_shift: bool,
    pub shift_ratio_per_position: f64,
}

pub struct QuoteMidService {
    settings: QuoteMidSettings,
    provider: Arc<dyn PositionProvider>,
}

impl QuoteMidService {
    pub fn new(settings: QuoteMidSettings, provider: Arc<dyn PositionProvider>) -> Result<Self> {
        if settings.use_position_shift && settings.shift_ratio_per_position < 0.0 {
            bail!(
                "shift_ratio_per_position must be non-negative, got {}",
                settings.shift_ratio_per_position
            );
        }
        Ok(Self { settings, provider })
    }

    pub fn shift(&self, reference_price: f64) -> f64 {
        let total_shift_ratio = self.const_shift_ratio() + self.position_shift_ratio();
        reference_price * (1.0 + total_shift_ratio)
    }

    pub fn const_shift_ratio(&self) -> f64 {
        if self.settings.use_const_shift {
            self.settings.const_shift_ratio
        } else {
            0.0
        }
    }

    pub fn position_shift_ratio(&self) -> f64 {
        if self.settings.use_position_shift {
            -self.provider.get_position() * self.settings.shift_ratio_per_position
        } else {
            0.0
        }
    }
}
