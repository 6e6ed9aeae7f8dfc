//! Gap classification between internal and exchange-reported position
//!
//! A gap below one quantity tick is noise. Between one tick and the
//! tolerable threshold it must persist unchanged for `max_mismatch_cnt`
//! consecutive observations before it is confirmed as a TolerableGap;
//! at or above the threshold the same confirmation yields an
//! IntolerableGap and trading stops. A gap that keeps changing while we
//! try to confirm it becomes Undetermined after `max_failure_query_cnt`
//! attempts. Query transport failures get their own counter and
//! terminal state.

use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::core::VenueRole;

/// Ground-truth position query, one call per recon cycle.
///
/// Implemented over the venue REST endpoint in production and by stubs
/// in tests.
pub trait PositionSource: Send {
    fn fetch_position(&self) -> Result<f64>;
}

impl<F> PositionSource for F
where
    F: Fn() -> Result<f64> + Send,
{
    fn fetch_position(&self) -> Result<f64> {
        self()
    }
}

impl PositionSource for Box<dyn PositionSource> {
    fn fetch_position(&self) -> Result<f64> {
        (**self).fetch_position()
    }
}

/// Outcome classification of one reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconStatus {
    NoGap,
    TolerableGap,
    IntolerableGap,
    UndeterminedGap,
    FailedQuery,
}

impl ReconStatus {
    /// Terminal statuses stop the recon loop and the strategy.
    pub const fn is_terminal(self) -> bool {
        matches!(self, ReconStatus::IntolerableGap | ReconStatus::FailedQuery)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ReconStatus::NoGap => "no_gap",
            ReconStatus::TolerableGap => "tolerable_gap",
            ReconStatus::IntolerableGap => "intolerable_gap",
            ReconStatus::UndeterminedGap => "undetermined_gap",
            ReconStatus::FailedQuery => "failed_query",
        }
    }
}

/// Tunables for one venue's reconciliation.
#[derive(Debug, Clone)]
pub struct ReconSettings {
    pub tick_size: f64,
    pub tolerable_threshold: f64,
    pub max_mismatch_cnt: u32,
    pub max_failure_query_cnt: u32,
    pub retry_interval_on_failure: Duration,
    pub normal_recon_interval: Duration,
    pub retry_interval_on_mismatch: Duration,
}

/// What one cycle decided.
#[derive(Debug, Clone, Copy)]
pub struct ReconOutcome {
    pub status: ReconStatus,
    /// Delay before the next cycle; `None` on terminal outcomes.
    pub next_delay: Option<Duration>,
    /// Exchange position to adopt internally, when the cycle resolved one.
    pub adopt_position: Option<f64>,
}

impl ReconOutcome {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Stateful gap classifier; one per venue, driven by the position
/// manager's recon loop.
pub struct Reconciler<S: PositionSource> {
    venue: VenueRole,
    settings: ReconSettings,
    source: S,
    /// Consecutive identical gap observations.
    mismatch_counter: u32,
    /// Consecutive query transport failures.
    fail_counter: u32,
    /// Consecutive changed-gap observations while trying to confirm.
    confirm_counter: u32,
    prev_gap: f64,
}

impl<S: PositionSource> Reconciler<S> {
    pub fn new(venue: VenueRole, settings: ReconSettings, source: S) -> Self {
        Self {
            venue,
            settings,
            source,
            mismatch_counter: 0,
            fail_counter: 0,
            confirm_counter: 0,
            prev_gap: 0.0,
        }
    }

    /// One warmup query, outside the counting state machine.
    pub fn fetch_position(&self) -> Result<f64> {
        self.source.fetch_position()
    }

    pub fn settings(&self) -> &ReconSettings {
        &self.settings
    }

    /// Run one reconciliation cycle against `internal_position`.
    pub fn reconcile(&mut self, internal_position: f64) -> ReconOutcome {
        let exchange_position = match self.source.fetch_position() {
            Ok(position) => position,
            Err(err) => {
                self.fail_counter += 1;
                if self.fail_counter >= self.settings.max_failure_query_cnt {
                    error!(
                        action = "position_recon",
                        venue = %self.venue,
                        result = "fail",
                        reason = "query_failed_exceeds_max_retry",
                        retry_count = self.fail_counter,
                        max_retry_count = self.settings.max_failure_query_cnt,
                        error = %err,
                    );
                    return ReconOutcome {
                        status: ReconStatus::FailedQuery,
                        next_delay: None,
                        adopt_position: None,
                    };
                }
                warn!(
                    action = "position_recon",
                    venue = %self.venue,
                    result = "fail",
                    reason = "query_failed",
                    retry_count = self.fail_counter,
                    max_retry_count = self.settings.max_failure_query_cnt,
                    error = %err,
                );
                return ReconOutcome {
                    status: ReconStatus::NoGap,
                    next_delay: Some(self.settings.retry_interval_on_failure),
                    adopt_position: None,
                };
            }
        };

        self.fail_counter = 0;
        let prev_gap = self.prev_gap;
        let gap = (exchange_position - internal_position).abs();
        self.prev_gap = gap;

        if gap < self.settings.tick_size {
            self.mismatch_counter = 0;
            self.confirm_counter = 0;
            return ReconOutcome {
                status: ReconStatus::NoGap,
                next_delay: Some(self.settings.normal_recon_interval),
                adopt_position: Some(exchange_position),
            };
        }

        // A gap is only confirmed once the same value repeats; a moving
        // gap restarts the count and burns a confirmation attempt.
        if (prev_gap - gap).abs() < f64::EPSILON {
            self.mismatch_counter += 1;
        } else {
            self.mismatch_counter = 1;
            self.confirm_counter += 1;
        }

        let within_threshold = gap < self.settings.tolerable_threshold;
        info!(
            action = "position_recon",
            venue = %self.venue,
            result = "pass",
            gap,
            exchange_position,
            internal_position,
            tolerable_threshold = self.settings.tolerable_threshold,
            gap_within_threshold = within_threshold,
            mismatch_count = self.mismatch_counter,
            max_mismatch_count = self.settings.max_mismatch_cnt,
        );

        if self.mismatch_counter >= self.settings.max_mismatch_cnt {
            self.mismatch_counter = 0;
            self.confirm_counter = 0;
            return if within_threshold {
                warn!(
                    action = "position_recon",
                    venue = %self.venue,
                    result = "fail",
                    reason = "confirmed_gap_within_threshold",
                    gap,
                );
                ReconOutcome {
                    status: ReconStatus::TolerableGap,
                    next_delay: Some(self.settings.normal_recon_interval),
                    adopt_position: Some(exchange_position),
                }
            } else {
                error!(
                    action = "position_recon",
                    venue = %self.venue,
                    result = "fail",
                    reason = "confirmed_gap_exceeds_threshold",
                    gap,
                );
                ReconOutcome {
                    status: ReconStatus::IntolerableGap,
                    next_delay: None,
                    adopt_position: None,
                }
            };
        }

        if self.confirm_counter >= self.settings.max_failure_query_cnt {
            error!(
                action = "position_recon",
                venue = %self.venue,
                result = "fail",
                reason = "failed_to_confirm_gap",
                gap,
                retry_count = self.confirm_counter,
                max_retry_count = self.settings.max_failure_query_cnt,
            );
            self.confirm_counter = 0;
            return ReconOutcome {
                status: ReconStatus::UndeterminedGap,
                next_delay: Some(self.settings.retry_interval_on_mismatch),
                adopt_position: None,
            };
        }

        ReconOutcome {
            status: ReconStatus::NoGap,
            next_delay: Some(self.settings.retry_interval_on_mismatch),
            adopt_position: None,
        }
    }
}
