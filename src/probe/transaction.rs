//! Transaction table and recent-window bookkeeping.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::probe::request::PendingRequest;
use crate::stun::TransactionId;

/// Concurrent map of transaction ID → pending request, plus the FIFO of the
/// most recently admitted IDs.
///
/// Evicting an ID from the window also removes it from the map, whatever its
/// outcome. A request evicted while still Pending can no longer be matched
/// and drops out of the windowed statistics for good.
#[derive(Debug)]
pub struct TransactionTable {
    entries: DashMap<TransactionId, Arc<PendingRequest>>,
    window: Mutex<VecDeque<TransactionId>>,
    capacity: usize,
}

impl TransactionTable {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: DashMap::new(),
            window: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a request so responses can find it. Returns false if the ID is taken.
    pub fn insert(&self, request: Arc<PendingRequest>) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.entries.entry(request.transaction_id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(request);
                true
            }
        }
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &TransactionId) -> Option<Arc<PendingRequest>> {
        self.entries.get(id).map(|r| r.value().clone())
    }

    pub fn remove(&self, id: &TransactionId) -> Option<Arc<PendingRequest>> {
        self.entries.remove(id).map(|(_, req)| req)
    }

    /// Push `id` onto the window, evicting the oldest entries past capacity.
    /// Returns how many were evicted, or `None` if `id` is no longer
    /// registered (the table was cleared after it was inserted).
    pub fn admit(&self, id: TransactionId) -> Option<usize> {
        let mut window = self.window();
        if !self.entries.contains_key(&id) {
            return None;
        }
        window.push_back(id);

        let mut evicted = 0;
        while window.len() > self.capacity {
            if let Some(old) = window.pop_front() {
                self.entries.remove(&old);
                evicted += 1;
            }
        }
        Some(evicted)
    }

    /// Requests currently resident in the window, newest first.
    pub fn resident(&self) -> Vec<Arc<PendingRequest>> {
        let window = self.window();
        window
            .iter()
            .rev()
            .filter_map(|id| self.entries.get(id).map(|r| r.value().clone()))
            .collect()
    }

    pub fn window_len(&self) -> usize {
        self.window().len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every registered request still Pending.
    pub fn pending(&self) -> Vec<Arc<PendingRequest>> {
        self.entries
            .iter()
            .filter(|r| r.value().is_pending())
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn clear(&self) {
        let mut window = self.window();
        window.clear();
        self.entries.clear();
    }

    fn window(&self) -> MutexGuard<'_, VecDeque<TransactionId>> {
        self.window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
