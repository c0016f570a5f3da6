//! The replay log: accepted submissions, one per turn, in turn order.

use turnforge_protocol::{ReplayItem, ReplayPayload, SessionId};

/// Ordered record of accepted submissions for one session.
///
/// The authority accepts at most one submission per turn and only for the
/// current turn, so arrival order equals turn order: entry `i` is always
/// turn `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayLog {
    session_id: SessionId,
    items: Vec<ReplayItem>,
}

impl ReplayLog {
    /// Creates an empty log for `session_id`.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            items: Vec::new(),
        }
    }

    /// Appends the accepted submission for the next turn.
    pub(crate) fn record(&mut self, item: ReplayItem) {
        debug_assert_eq!(
            item.turn_index as usize,
            self.items.len(),
            "replay entries must arrive in turn order"
        );
        self.items.push(item);
    }

    /// The entry for `turn_index`, if that turn has been settled.
    pub fn get(&self, turn_index: u32) -> Option<&ReplayItem> {
        self.items.get(turn_index as usize)
    }

    /// All entries, ascending by turn index.
    pub fn items(&self) -> &[ReplayItem] {
        &self.items
    }

    /// Number of settled turns.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no turn has been settled.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// A copy of the log in wire form.
    pub fn snapshot(&self) -> ReplayPayload {
        ReplayPayload {
            session_id: self.session_id.clone(),
            items: self.items.clone(),
        }
    }
}
