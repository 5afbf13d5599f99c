//! Bid store: resting one-sided stakes, partitioned per event.

use std::sync::Arc;

use spreadbook_types::{Bid, BidKey, EventKey, Result, UserId};

use crate::context::OpContext;
use crate::keys;
use crate::records::{bid_from_record, bid_record};
use crate::store::{Condition, Index, KeyedStore, Query, WriteOp, query_all};

#[derive(Clone)]
pub struct BidStore {
    store: Arc<dyn KeyedStore>,
}

impl BidStore {
    #[must_use]
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    /// Every resting bid on `event`, both sides.
    pub async fn by_event(&self, ctx: &OpContext, event: &EventKey) -> Result<Vec<Bid>> {
        let query = Query::partition(Index::Primary, keys::bid_partition(event));
        query_all(self.store.as_ref(), ctx, query)
            .await?
            .iter()
            .map(bid_from_record)
            .collect()
    }

    /// Every resting bid placed by `user`, across events.
    pub async fn by_user(&self, ctx: &OpContext, user: &UserId) -> Result<Vec<Bid>> {
        let query = Query::partition(Index::Gsi1, keys::bid_user_partition(user));
        query_all(self.store.as_ref(), ctx, query)
            .await?
            .iter()
            .map(bid_from_record)
            .collect()
    }

    pub async fn put(&self, ctx: &OpContext, bid: &Bid) -> Result<()> {
        let record = bid_record(bid)?;
        ctx.run(self.store.put(record, Condition::None)).await
    }

    pub async fn delete(&self, ctx: &OpContext, key: &BidKey) -> Result<()> {
        ctx.run(self.store.delete(&keys::bid_key(key), Condition::None)).await
    }

    /// Batch operation writing `bid` at its current amount.
    pub fn put_op(bid: &Bid) -> Result<WriteOp> {
        Ok(WriteOp::Put(bid_record(bid)?))
    }

    #[must_use]
    pub fn delete_op(key: &BidKey) -> WriteOp {
        WriteOp::Delete(keys::bid_key(key))
    }
}
