//! Order map with bounded retention of completed orders
//!
//! One mutex-guarded structure owns the client-order-id map, the
//! request-id correlation map and the three terminal FIFOs, so queue
//! eviction has a single code path regardless of which thread drives
//! it.
//!
//! Invariants maintained here:
//! - a client order id appears in at most one terminal queue;
//! - after any push, no queue exceeds the retention limit and evicted
//!   ids are gone from the order map;
//! - a request-id correlation is removed on its first ack or reject.

use std::collections::{HashMap, VecDeque};

use tracing::warn;

use crate::core::OrderStatus;

use super::handler::{OrderHandler, OrderSnapshot};

/// Which terminal queue a completed order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionQueue {
    Canceled,
    Filled,
    Rejected,
}

pub struct OrderStore {
    orders: HashMap<u64, OrderHandler>,
    req_index: HashMap<u64, u64>,
    cancel_queue: VecDeque<u64>,
    filled_queue: VecDeque<u64>,
    rejected_queue: VecDeque<u64>,
    track_limit: usize,
}

impl OrderStore {
    pub fn new(track_limit: usize) -> Self {
        Self {
            orders: HashMap::new(),
            req_index: HashMap::new(),
            cancel_queue: VecDeque::new(),
            filled_queue: VecDeque::new(),
            rejected_queue: VecDeque::new(),
            track_limit,
        }
    }

    pub fn insert(&mut self, order: OrderHandler) {
        let id = order.client_order_id;
        debug_assert_ne!(id, 0, "orders are stored only after id assignment");
        self.orders.insert(id, order);
    }

    pub fn get(&self, client_order_id: u64) -> Option<&OrderHandler> {
        self.orders.get(&client_order_id)
    }

    pub fn get_mut(&mut self, client_order_id: u64) -> Option<&mut OrderHandler> {
        self.orders.get_mut(&client_order_id)
    }

    pub fn contains(&self, client_order_id: u64) -> bool {
        self.orders.contains_key(&client_order_id)
    }

    pub fn snapshot(&self, client_order_id: u64) -> Option<OrderSnapshot> {
        self.orders.get(&client_order_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Record a pending outbound operation for ack routing.
    pub fn correlate(&mut self, req_id: u64, client_order_id: u64) {
        if self.req_index.insert(req_id, client_order_id).is_some() {
            warn!(action = "correlate_request", req_id, result = "overwrote_existing");
        }
    }

    /// Resolve and remove a correlation; first ack or reject wins.
    pub fn take_correlation(&mut self, req_id: u64) -> Option<u64> {
        self.req_index.remove(&req_id)
    }

    pub fn pending_correlations(&self) -> usize {
        self.req_index.len()
    }

    /// Push a completed order onto its queue, then evict oldest entries
    /// past the retention limit.
    pub fn push_completed(&mut self, queue: CompletionQueue, client_order_id: u64) {
        debug_assert!(
            !self.in_any_queue(client_order_id),
            "order {client_order_id} already retained"
        );
        match queue {
            CompletionQueue::Canceled => self.cancel_queue.push_back(client_order_id),
            CompletionQueue::Filled => self.filled_queue.push_back(client_order_id),
            CompletionQueue::Rejected => self.rejected_queue.push_back(client_order_id),
        }
        self.maintain_order_limit();
    }

    /// Drop oldest retained ids (and their map entries) until every
    /// queue is back under the limit.
    pub fn maintain_order_limit(&mut self) {
        while self.cancel_queue.len() > self.track_limit {
            if let Some(id) = self.cancel_queue.pop_front() {
                self.orders.remove(&id);
            }
        }
        while self.rejected_queue.len() > self.track_limit {
            if let Some(id) = self.rejected_queue.pop_front() {
                self.orders.remove(&id);
            }
        }
        while self.filled_queue.len() > self.track_limit {
            if let Some(id) = self.filled_queue.pop_front() {
                self.orders.remove(&id);
            }
        }
    }

    pub fn orders_by_status(&self, status: OrderStatus) -> Vec<OrderSnapshot> {
        self.orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect()
    }

    pub fn active_orders(&self) -> Vec<OrderSnapshot> {
        self.orders
            .values()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect()
    }

    pub fn queue_len(&self, queue: CompletionQueue) -> usize {
        match queue {
            CompletionQueue::Canceled => self.cancel_queue.len(),
            CompletionQueue::Filled => self.filled_queue.len(),
            CompletionQueue::Rejected => self.rejected_queue.len(),
        }
    }

    pub fn in_any_queue(&self, client_order_id: u64) -> bool {
        self.cancel_queue.contains(&client_order_id)
            || self.filled_queue.contains(&client_order_id)
            || self.rejected_queue.contains(&client_order_id)
    }

    /// Number of queues holding this id; at most one by construction.
    pub fn queue_membership_count(&self, client_order_id: u64) -> usize {
        [
            &self.cancel_queue,
            &self.filled_queue,
            &self.rejected_queue,
        ]
        .iter()
        .filter(|q| q.contains(&client_order_id))
        .count()
    }
}
