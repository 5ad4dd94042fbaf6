//! dedup.rs
//!
//! Seen-message cache. First sight of a DATA id wins; every repeat is dropped,
//! which is what keeps forwarding loops from amplifying.

use std::collections::{HashSet, VecDeque};

use mesh_common::MessageId;

#[derive(Debug, Default)]
pub struct DedupCache {
    seen: HashSet<MessageId>,
    /// Insertion order, only tracked when bounded.
    order: VecDeque<MessageId>,
    capacity: Option<usize>,
}

impl DedupCache {
    /// Unbounded cache: ids are remembered for the node's lifetime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounded cache evicting the oldest id once `capacity` is exceeded.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: Some(capacity.max(1)),
        }
    }

    /// Records `id` and returns true on first sight, false on any repeat.
    pub fn should_accept_and_forward(&mut self, id: &MessageId) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.clone());

        if let Some(cap) = self.capacity {
            self.order.push_back(id.clone());
            while self.order.len() > cap {
                if let Some(oldest) = self.order.pop_front() {
                    self.seen.remove(&oldest);
                }
            }
        }
        true
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
