//! Outcome idempotency guard: prevents recording the same outcome twice.
//!
//! Outcome ids are deterministic, so a re-run of settlement for the same
//! date derives the same ids. The guard remembers ids this process has
//! written; the store is the authority across processes.
//!
//! The guard keeps a bounded insertion-ordered set so memory stays
//! predictable in a long-running settlement worker.

use std::collections::{HashSet, VecDeque};

use spreadbook_types::{OutcomeId, Result, SpreadbookError};

/// Default number of outcome ids remembered.
pub const DEFAULT_GUARD_CAPACITY: usize = 100_000;

pub struct OutcomeGuard {
    recorded: HashSet<OutcomeId>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<OutcomeId>,
    max_size: usize,
}

impl OutcomeGuard {
    /// A guard remembering at most `max_size` ids (at least one).
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            recorded: HashSet::new(),
            order: VecDeque::new(),
            max_size,
        }
    }

    /// Mark an outcome as recorded.
    ///
    /// # Errors
    /// [`SpreadbookError::OutcomeAlreadyRecorded`] if `id` was already marked.
    pub fn mark_recorded(&mut self, id: OutcomeId) -> Result<()> {
        if self.recorded.contains(&id) {
            return Err(SpreadbookError::OutcomeAlreadyRecorded(id));
        }
        if self.recorded.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.recorded.remove(&oldest);
            }
        }
        self.recorded.insert(id);
        self.order.push_back(id);
        Ok(())
    }

    #[must_use]
    pub fn is_recorded(&self, id: &OutcomeId) -> bool {
        self.recorded.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }
}

impl Default for OutcomeGuard {
    fn default() -> Self {
        Self::new(DEFAULT_GUARD_CAPACITY)
    }
}
