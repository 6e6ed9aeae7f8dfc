//! Position tracking and reconciliation against exchange ground truth

pub mod manager;
pub mod recon;

pub use manager::{PositionConfig, PositionManager};
pub use recon::{PositionSource, ReconOutcome, ReconSettings, ReconStatus, Reconciler};
