//! Bounded memory of message ids already processed.

use std::collections::{HashSet, VecDeque};

use turnforge_protocol::MessageId;

/// FIFO-bounded set of seen [`MessageId`]s.
///
/// Once `capacity` ids are stored, inserting another forgets the oldest.
/// Every broadcast carries a fresh id, so an id only needs to be remembered
/// for as long as duplicates of it can still be in flight.
#[derive(Debug)]
pub struct SeenMessages {
    capacity: usize,
    order: VecDeque<MessageId>,
    ids: HashSet<MessageId>,
}

impl SeenMessages {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    /// Records `id`. Returns `false` if it was already known.
    pub fn insert(&mut self, id: MessageId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.clone());
        self.ids.insert(id);
        true
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Forgets everything. Called on session reset.
    pub fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
