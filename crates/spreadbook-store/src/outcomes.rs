//! Outcome store: append-only settlement results.
//!
//! Besides the result itself, each outcome record carries one flag per
//! party that is set once that party's balance delta has been applied.
//! An outcome with an unset flag still owes that delta.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use spreadbook_types::{DivisionId, Outcome, OutcomeId, Party, Result, UserId};

use crate::context::OpContext;
use crate::keys;
use crate::records::{applied_attr, ledger_marks_from_record, outcome_from_record, outcome_record};
use crate::store::{Condition, Index, KeyedStore, Query, RecordKey, UpdateAction, WriteOp, query_all};

/// Which of an outcome's two balance deltas have been applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerMarks {
    pub winner: bool,
    pub loser: bool,
}

impl LedgerMarks {
    #[must_use]
    pub fn is_applied(self, party: Party) -> bool {
        match party {
            Party::Winner => self.winner,
            Party::Loser => self.loser,
        }
    }

    pub fn set(&mut self, party: Party) {
        match party {
            Party::Winner => self.winner = true,
            Party::Loser => self.loser = true,
        }
    }

    #[must_use]
    pub fn is_complete(self) -> bool {
        self.winner && self.loser
    }

    /// Parties whose delta is still owed.
    #[must_use]
    pub fn missing(self) -> Vec<Party> {
        Party::BOTH.into_iter().filter(|p| !self.is_applied(*p)).collect()
    }
}

#[derive(Clone)]
pub struct OutcomeStore {
    store: Arc<dyn KeyedStore>,
}

impl OutcomeStore {
    #[must_use]
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    /// Ledger marks of `outcome`, or `None` when it was never recorded.
    pub async fn marks(&self, ctx: &OpContext, outcome: &Outcome) -> Result<Option<LedgerMarks>> {
        let key = keys::outcome_key(outcome);
        ctx.run(self.store.get(&key))
            .await?
            .as_ref()
            .map(ledger_marks_from_record)
            .transpose()
    }

    /// Record that `party`'s balance delta of `outcome` was applied.
    ///
    /// # Errors
    /// [`spreadbook_types::SpreadbookError::ConditionFailed`] if the outcome
    /// was never written.
    pub async fn mark_applied(&self, ctx: &OpContext, outcome: &Outcome, party: Party) -> Result<()> {
        let actions = vec![UpdateAction::Set(applied_attr(party).into(), Value::Bool(true))];
        ctx.run(self.store.update(&keys::outcome_key(outcome), actions, Condition::Exists))
            .await?;
        Ok(())
    }

    pub fn put_op(outcome: &Outcome) -> Result<WriteOp> {
        Ok(WriteOp::Put(outcome_record(outcome)?))
    }

    #[must_use]
    pub fn key_of(outcome: &Outcome) -> RecordKey {
        keys::outcome_key(outcome)
    }

    pub async fn by_week(
        &self,
        ctx: &OpContext,
        division: &DivisionId,
        week: u32,
    ) -> Result<Vec<Outcome>> {
        let query = Query::partition(Index::Primary, keys::outcome_partition(division, week));
        query_all(self.store.as_ref(), ctx, query)
            .await?
            .iter()
            .map(outcome_from_record)
            .collect()
    }

    /// Outcomes `user` won or lost, from the winner and loser indexes.
    pub async fn by_user(&self, ctx: &OpContext, user: &UserId) -> Result<Vec<Outcome>> {
        let store = self.store.as_ref();
        let (won, lost) = tokio::try_join!(
            query_all(store, ctx, Query::partition(Index::Gsi1, keys::outcome_winner_partition(user))),
            query_all(store, ctx, Query::partition(Index::Gsi2, keys::outcome_loser_partition(user))),
        )?;
        let mut merged: BTreeMap<OutcomeId, Outcome> = BTreeMap::new();
        for record in won.iter().chain(lost.iter()) {
            let outcome = outcome_from_record(record)?;
            merged.insert(outcome.id, outcome);
        }
        Ok(merged.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use spreadbook_types::{Bet, Bid, Side};

    use super::*;
    use crate::memory::InMemoryStore;

    fn outcome(away: &str, home: &str, winner: Side, ms: i64) -> Outcome {
        let bid = Bid::dummy(away, Side::Away, 1, ms);
        let bet = Bet::pending(
            bid.event,
            bid.terms,
            UserId::new(away),
            UserId::new(home),
            10,
            bid.created_at,
        );
        Outcome::for_bet(&bet, winner, "401", 1)
    }

    #[tokio::test]
    async fn marks_and_lookups() {
        let inner = Arc::new(InMemoryStore::new());
        let store = OutcomeStore::new(inner.clone());
        let ctx = OpContext::background();
        let won = outcome("sam", "kim", Side::Away, 1);
        let lost = outcome("sam", "lee", Side::Home, 2);
        assert!(store.marks(&ctx, &won).await.unwrap().is_none());

        inner
            .batch_write(vec![
                OutcomeStore::put_op(&won).unwrap(),
                OutcomeStore::put_op(&lost).unwrap(),
            ])
            .await
            .unwrap();
        let marks = store.marks(&ctx, &won).await.unwrap().unwrap();
        assert_eq!(marks.missing(), Party::BOTH.to_vec());

        let sams = store.by_user(&ctx, &UserId::new("sam")).await.unwrap();
        assert_eq!(sams.len(), 2);
        let kims = store.by_user(&ctx, &UserId::new("kim")).await.unwrap();
        assert_eq!(kims.len(), 1);
        assert_eq!(kims[0].loser.as_str(), "kim");

        let week = store.by_week(&ctx, &DivisionId::new("test"), 1).await.unwrap();
        assert_eq!(week.len(), 2);
    }

    #[tokio::test]
    async fn mark_applied_is_per_party() {
        let inner = Arc::new(InMemoryStore::new());
        let store = OutcomeStore::new(inner.clone());
        let ctx = OpContext::background();
        let o = outcome("sam", "kim", Side::Away, 1);
        let err = store.mark_applied(&ctx, &o, Party::Winner).await.unwrap_err();
        assert!(matches!(err, spreadbook_types::SpreadbookError::ConditionFailed { .. }));

        inner.batch_write(vec![OutcomeStore::put_op(&o).unwrap()]).await.unwrap();
        store.mark_applied(&ctx, &o, Party::Loser).await.unwrap();
        let marks = store.marks(&ctx, &o).await.unwrap().unwrap();
        assert_eq!(marks.missing(), vec![Party::Winner]);
        assert!(!marks.is_complete());

        store.mark_applied(&ctx, &o, Party::Winner).await.unwrap();
        assert!(store.marks(&ctx, &o).await.unwrap().unwrap().is_complete());
        assert_eq!(store.by_user(&ctx, &UserId::new("sam")).await.unwrap()[0], o);
    }
}
