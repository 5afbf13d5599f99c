//! Ledger aggregation: net every outcome's deltas per (league, user) before
//! any balance is touched.
//!
//! Partitions produce outcomes concurrently; their owed deltas are folded
//! here after the join, so each balance receives at most one additive
//! update per settlement pass.

use std::collections::HashMap;

use spreadbook_types::{LedgerDelta, LedgerKey, SignedAmount};

#[derive(Debug, Clone, Default)]
pub struct LedgerAggregator {
    totals: HashMap<LedgerKey, SignedAmount>,
}

impl LedgerAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, delta: LedgerDelta) {
        *self.totals.entry(delta.key).or_insert(0) += delta.amount;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// One delta per non-zero total, ordered by key.
    #[must_use]
    pub fn into_updates(self) -> Vec<LedgerDelta> {
        let mut updates: Vec<LedgerDelta> = self
            .totals
            .into_iter()
            .filter(|(_, amount)| *amount != 0)
            .map(|(key, amount)| LedgerDelta { key, amount })
            .collect();
        updates.sort_by(|a, b| a.key.cmp(&b.key));
        updates
    }
}

#[cfg(test)]
mod tests {
    use spreadbook_types::{DivisionId, UserId};

    use super::*;

    fn delta(league: &str, user: &str, amount: SignedAmount) -> LedgerDelta {
        LedgerDelta::new(DivisionId::new(league), UserId::new(user), amount)
    }

    #[test]
    fn nets_to_single_update() {
        // Wins 10 and 15, loss 5: one +20 update.
        let mut agg = LedgerAggregator::new();
        agg.add(delta("office", "sam", 10));
        agg.add(delta("office", "sam", 15));
        agg.add(delta("office", "sam", -5));
        let updates = agg.into_updates();
        assert_eq!(updates, vec![delta("office", "sam", 20)]);
    }

    #[test]
    fn zero_totals_are_dropped() {
        let mut agg = LedgerAggregator::new();
        agg.add(delta("office", "sam", 10));
        agg.add(delta("office", "sam", -10));
        agg.add(delta("office", "kim", -3));
        assert_eq!(agg.len(), 2);
        assert_eq!(agg.into_updates(), vec![delta("office", "kim", -3)]);
    }

    #[test]
    fn leagues_are_separate_scopes() {
        let mut agg = LedgerAggregator::new();
        agg.add(delta("office", "sam", 10));
        agg.add(delta("family", "sam", -10));
        let updates = agg.into_updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].key.league.as_str(), "family");
    }
}
