use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use crate::lead_lists::LeadListCreatedMsg;

/// The "is this message mine" predicate: a worker only ever acts on the
/// message carrying its assigned correlation id.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    correlation_id: Uuid,
}

impl MessageFilter {
    pub fn new(correlation_id: Uuid) -> Self {
        Self { correlation_id }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn is_mine(&self, msg: &LeadListCreatedMsg) -> bool {
        msg.correlation_id == self.correlation_id
    }
}

/// Single-assignment completion flag.
///
/// `try_complete` succeeds exactly once. Once the match has been claimed,
/// every further delivery of the same correlation id (duplicate
/// redelivery, a race between polls) must be requeued with no side
/// effects.
#[derive(Debug, Default)]
pub struct CompletionGuard {
    completed: AtomicBool,
}

impl CompletionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim completion. Returns true for the first caller only.
    pub fn try_complete(&self) -> bool {
        self.completed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }
}
