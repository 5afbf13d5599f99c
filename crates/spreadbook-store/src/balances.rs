//! Balance store: running per-(league, user) totals.
//!
//! Balances only ever move through additive updates, so concurrent
//! settlement runs commute without locking.

use std::sync::Arc;

use spreadbook_types::{LedgerKey, Result, SignedAmount};

use crate::context::OpContext;
use crate::keys;
use crate::store::{Condition, KeyedStore, UpdateAction};

const AMOUNT_ATTR: &str = "amount";

#[derive(Clone)]
pub struct BalanceStore {
    store: Arc<dyn KeyedStore>,
}

impl BalanceStore {
    #[must_use]
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    /// Add `amount` to the balance at `key`, returning the new balance.
    pub async fn add(&self, ctx: &OpContext, key: &LedgerKey, amount: SignedAmount) -> Result<SignedAmount> {
        let record = ctx
            .run(self.store.update(
                &keys::balance_key(key),
                vec![UpdateAction::Add(AMOUNT_ATTR.into(), amount)],
                Condition::None,
            ))
            .await?;
        record.i64_attr(AMOUNT_ATTR)
    }

    /// Current balance; zero when nothing was ever recorded.
    pub async fn balance(&self, ctx: &OpContext, key: &LedgerKey) -> Result<SignedAmount> {
        match ctx.run(self.store.get(&keys::balance_key(key))).await? {
            Some(record) => record.i64_attr(AMOUNT_ATTR),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use spreadbook_types::{DivisionId, UserId};

    use super::*;
    use crate::memory::InMemoryStore;

    #[tokio::test]
    async fn additive_updates() {
        let store = BalanceStore::new(Arc::new(InMemoryStore::new()));
        let ctx = OpContext::background();
        let key = LedgerKey {
            league: DivisionId::new("office"),
            user: UserId::new("sam"),
        };
        assert_eq!(store.balance(&ctx, &key).await.unwrap(), 0);
        assert_eq!(store.add(&ctx, &key, 20).await.unwrap(), 20);
        assert_eq!(store.add(&ctx, &key, -35).await.unwrap(), -15);
        assert_eq!(store.balance(&ctx, &key).await.unwrap(), -15);
    }
}
