//! Bet store: matched wagers.
//!
//! Bets are written only through batch operations produced by matching;
//! settlement changes nothing but status, deferral count and the
//! deferred-index projection.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;
use spreadbook_types::{Bet, BetStatus, DivisionId, Result, UserId};

use crate::context::OpContext;
use crate::keys;
use crate::records::{bet_from_record, bet_record};
use crate::store::{
    Condition, Index, KeyedStore, Query, RecordKey, SortCondition, UpdateAction, WriteOp,
    query_all,
};

#[derive(Clone)]
pub struct BetStore {
    store: Arc<dyn KeyedStore>,
}

impl BetStore {
    #[must_use]
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    async fn collect(&self, ctx: &OpContext, query: Query) -> Result<Vec<Bet>> {
        query_all(self.store.as_ref(), ctx, query)
            .await?
            .iter()
            .map(bet_from_record)
            .collect()
    }

    pub async fn put(&self, ctx: &OpContext, bet: &Bet) -> Result<()> {
        let record = bet_record(bet)?;
        ctx.run(self.store.put(record, Condition::None)).await
    }

    pub fn put_op(bet: &Bet) -> Result<WriteOp> {
        Ok(WriteOp::Put(bet_record(bet)?))
    }

    /// Bets of one division and week.
    pub async fn by_week(&self, ctx: &OpContext, division: &DivisionId, week: u32) -> Result<Vec<Bet>> {
        self.collect(
            ctx,
            Query::partition(Index::Primary, keys::bet_partition(division, week)),
        )
        .await
    }

    /// Bets whose event is scheduled on `date`, any status.
    pub async fn by_event_date(&self, ctx: &OpContext, date: NaiveDate) -> Result<Vec<Bet>> {
        self.collect(
            ctx,
            Query::partition(Index::Gsi1, keys::BET_DATE_PARTITION)
                .sorted(SortCondition::BeginsWith(keys::bet_date_prefix(date))),
        )
        .await
    }

    /// Bets carrying the deferred marker.
    pub async fn deferred(&self, ctx: &OpContext) -> Result<Vec<Bet>> {
        self.collect(ctx, Query::partition(Index::Gsi4, keys::BET_DEFERRED_PARTITION))
            .await
    }

    /// Bets where `user` is on either side; the away and home indexes are
    /// queried concurrently.
    pub async fn by_user(&self, ctx: &OpContext, user: &UserId) -> Result<Vec<Bet>> {
        let partition = keys::bet_user_partition(user);
        let (away, home) = tokio::try_join!(
            self.collect(ctx, Query::partition(Index::Gsi2, partition.clone())),
            self.collect(ctx, Query::partition(Index::Gsi3, partition)),
        )?;
        let mut merged: BTreeMap<RecordKey, Bet> = BTreeMap::new();
        for bet in away.into_iter().chain(home) {
            merged.insert(keys::bet_key(&bet), bet);
        }
        let mut bets: Vec<Bet> = merged.into_values().collect();
        bets.sort_by_key(|b| b.created_at);
        Ok(bets)
    }

    /// Move `bet` to `status` with `deferrals`, maintaining the deferred
    /// index projection.
    pub async fn update_status(
        &self,
        ctx: &OpContext,
        bet: &Bet,
        status: BetStatus,
        deferrals: u32,
    ) -> Result<()> {
        let mut actions = vec![
            UpdateAction::Set("status".into(), Value::from(status.as_str())),
            UpdateAction::Set("deferrals".into(), Value::from(deferrals)),
        ];
        if status == BetStatus::Deferred {
            let sort = keys::bet_date_sort(bet);
            actions.push(UpdateAction::Set("gsi4pk".into(), Value::from(keys::BET_DEFERRED_PARTITION)));
            actions.push(UpdateAction::Set("gsi4sk".into(), Value::from(sort)));
        } else {
            actions.push(UpdateAction::Remove("gsi4pk".into()));
            actions.push(UpdateAction::Remove("gsi4sk".into()));
        }
        ctx.run(self.store.update(&keys::bet_key(bet), actions, Condition::Exists))
            .await
            .map(|_| ())
    }
}
