//! Pending-operation tracking
//!
//! One tracker per operation kind (submission, modification,
//! cancellation) maps client order ids to the time the operation went
//! out, so the strategy can enumerate operations that have waited past
//! a threshold and take remediation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct PendingOpTracker {
    threshold: Duration,
    pending: HashMap<u64, Instant>,
}

impl PendingOpTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            pending: HashMap::new(),
        }
    }

    /// Returns false if the id was already tracked.
    pub fn add(&mut self, client_order_id: u64) -> bool {
        self.add_at(client_order_id, Instant::now())
    }

    pub fn add_at(&mut self, client_order_id: u64, at: Instant) -> bool {
        match self.pending.entry(client_order_id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(at);
                true
            }
        }
    }

    pub fn remove(&mut self, client_order_id: u64) -> bool {
        self.pending.remove(&client_order_id).is_some()
    }

    pub fn has(&self, client_order_id: u64) -> bool {
        self.pending.contains_key(&client_order_id)
    }

    /// Ids whose wait has reached the threshold.
    pub fn outdated(&self) -> Vec<u64> {
        self.outdated_at(Instant::now())
    }

    pub fn outdated_at(&self, now: Instant) -> Vec<u64> {
        self.pending
            .iter()
            .filter(|(_, added)| now.saturating_duration_since(**added) >= self.threshold)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn outdated_count(&self) -> usize {
        self.outdated().len()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
