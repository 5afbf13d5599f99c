//! In-memory [`KeyedStore`] used by tests and local runs.
//!
//! Mirrors the remote store's observable behavior: per-record conditional
//! writes, paged queries over projected indexes, and a batch size limit.
//! Failures can be injected to exercise partial-write paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use spreadbook_types::constants::{BATCH_WRITE_LIMIT, DEFAULT_QUERY_PAGE_SIZE};
use spreadbook_types::{Result, SpreadbookError, StoreConfig};

use crate::store::{
    Attributes, Condition, Continuation, KeyedStore, Page, Query, Record, RecordKey,
    UpdateAction, WriteOp,
};

type Table = BTreeMap<(String, String), Attributes>;

#[derive(Debug)]
pub struct InMemoryStore {
    table: Mutex<Table>,
    page_size: usize,
    batch_limit: usize,
    fail_batches: AtomicUsize,
    fail_updates: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_QUERY_PAGE_SIZE, BATCH_WRITE_LIMIT)
    }

    /// A store paging and batching the way `config` asks.
    #[must_use]
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::with_limits(config.query_page_size, config.batch_write_limit)
    }

    /// A store returning at most `page_size` records per query page.
    #[must_use]
    pub fn with_limits(page_size: usize, batch_limit: usize) -> Self {
        Self {
            table: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
            batch_limit,
            fail_batches: AtomicUsize::new(0),
            fail_updates: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` calls to `batch_write`.
    pub fn fail_next_batches(&self, n: usize) {
        self.fail_batches.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` calls to `update`.
    pub fn fail_next_updates(&self, n: usize) {
        self.fail_updates.store(n, Ordering::SeqCst);
    }

    /// Number of `batch_write` calls seen so far.
    #[must_use]
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Table>> {
        self.table
            .lock()
            .map_err(|_| SpreadbookError::Internal("in-memory store mutex poisoned".into()))
    }

    fn take_fault(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check(key: &RecordKey, current: Option<&Attributes>, condition: &Condition) -> Result<()> {
        let holds = match condition {
            Condition::None => true,
            Condition::Exists => current.is_some(),
            Condition::NotExists => current.is_none(),
            Condition::AbsentOrExpired { attr, now } => current
                .is_none_or(|attrs| attrs.get(attr).and_then(Value::as_i64).is_some_and(|t| t <= *now)),
            Condition::AttrEquals { attr, value } => {
                current.and_then(|attrs| attrs.get(attr)) == Some(value)
            }
        };
        if holds {
            Ok(())
        } else {
            Err(SpreadbookError::ConditionFailed {
                key: key.to_string(),
            })
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_position(sort: &str, key: &RecordKey) -> Result<Continuation> {
    Ok(Continuation(serde_json::to_string(&(sort, &key.pk, &key.sk))?))
}

fn decode_position(token: &Continuation) -> Result<(String, String, String)> {
    serde_json::from_str(&token.0).map_err(|e| SpreadbookError::Store(format!("bad continuation: {e}")))
}

#[async_trait]
impl KeyedStore for InMemoryStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>> {
        let table = self.lock()?;
        Ok(table
            .get(&(key.pk.clone(), key.sk.clone()))
            .map(|attrs| Record {
                key: key.clone(),
                attrs: attrs.clone(),
            }))
    }

    async fn query(&self, query: &Query) -> Result<Page> {
        let after = query.start.as_ref().map(decode_position).transpose()?;
        let mut hits: Vec<(String, Record)> = {
            let table = self.lock()?;
            table
                .iter()
                .map(|((pk, sk), attrs)| Record {
                    key: RecordKey::new(pk.clone(), sk.clone()),
                    attrs: attrs.clone(),
                })
                .filter(|r| r.partition_value(query.index) == Some(query.partition.as_str()))
                .filter_map(|r| {
                    let sort = r.sort_value(query.index)?.to_string();
                    query.sort.matches(&sort).then_some((sort, r))
                })
                .collect()
        };
        hits.sort_by(|(sa, ra), (sb, rb)| sa.cmp(sb).then_with(|| ra.key.cmp(&rb.key)));
        if let Some((sort, pk, sk)) = after {
            let pos = (sort, RecordKey::new(pk, sk));
            hits.retain(|(s, r)| (s.as_str(), &r.key) > (pos.0.as_str(), &pos.1));
        }

        let limit = query.limit.unwrap_or(self.page_size).clamp(1, self.page_size);
        let next = if hits.len() > limit {
            let (sort, record) = &hits[limit - 1];
            Some(encode_position(sort, &record.key)?)
        } else {
            None
        };
        hits.truncate(limit);
        Ok(Page {
            records: hits.into_iter().map(|(_, r)| r).collect(),
            next,
        })
    }

    async fn put(&self, record: Record, condition: Condition) -> Result<()> {
        let mut table = self.lock()?;
        let slot = (record.key.pk.clone(), record.key.sk.clone());
        Self::check(&record.key, table.get(&slot), &condition)?;
        table.insert(slot, record.attrs);
        Ok(())
    }

    async fn update(
        &self,
        key: &RecordKey,
        actions: Vec<UpdateAction>,
        condition: Condition,
    ) -> Result<Record> {
        if Self::take_fault(&self.fail_updates) {
            return Err(SpreadbookError::Store(format!("injected update failure for {key}")));
        }
        let mut table = self.lock()?;
        let slot = (key.pk.clone(), key.sk.clone());
        Self::check(key, table.get(&slot), &condition)?;

        let attrs = table.entry(slot).or_default();
        for action in actions {
            match action {
                UpdateAction::Set(name, value) => {
                    attrs.insert(name, value);
                }
                UpdateAction::Add(name, delta) => {
                    let current = attrs.get(&name).and_then(Value::as_i64).unwrap_or(0);
                    attrs.insert(name, Value::from(current + delta));
                }
                UpdateAction::Remove(name) => {
                    attrs.remove(&name);
                }
            }
        }
        Ok(Record {
            key: key.clone(),
            attrs: attrs.clone(),
        })
    }

    async fn delete(&self, key: &RecordKey, condition: Condition) -> Result<()> {
        let mut table = self.lock()?;
        let slot = (key.pk.clone(), key.sk.clone());
        Self::check(key, table.get(&slot), &condition)?;
        table.remove(&slot);
        Ok(())
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<()> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if ops.len() > self.batch_limit {
            return Err(SpreadbookError::BatchTooLarge {
                size: ops.len(),
                limit: self.batch_limit,
            });
        }
        if Self::take_fault(&self.fail_batches) {
            return Err(SpreadbookError::Store("injected batch failure".into()));
        }
        let mut table = self.lock()?;
        for op in ops {
            match op {
                WriteOp::Put(record) => {
                    table.insert((record.key.pk, record.key.sk), record.attrs);
                }
                WriteOp::Delete(key) => {
                    table.remove(&(key.pk, key.sk));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OpContext;
    use crate::store::{Index, SortCondition, query_all};

    fn rec(pk: &str, sk: &str) -> Record {
        Record::new(RecordKey::new(pk, sk))
    }

    #[tokio::test]
    async fn put_get_delete() {
        let store = InMemoryStore::new();
        store.put(rec("P", "1").with("v", 1), Condition::None).await.unwrap();
        let got = store.get(&RecordKey::new("P", "1")).await.unwrap().unwrap();
        assert_eq!(got.i64_attr("v").unwrap(), 1);
        store.delete(&RecordKey::new("P", "1"), Condition::None).await.unwrap();
        assert!(store.get(&RecordKey::new("P", "1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conditional_put() {
        let store = InMemoryStore::new();
        store.put(rec("P", "1"), Condition::NotExists).await.unwrap();
        let err = store.put(rec("P", "1"), Condition::NotExists).await.unwrap_err();
        assert!(matches!(err, SpreadbookError::ConditionFailed { .. }));
        store.put(rec("P", "1"), Condition::Exists).await.unwrap();
    }

    #[tokio::test]
    async fn absent_or_expired() {
        let store = InMemoryStore::new();
        let cond = |now| Condition::AbsentOrExpired { attr: "exp".into(), now };
        store.put(rec("L", "k").with("exp", 100), cond(0)).await.unwrap();
        assert!(store.put(rec("L", "k").with("exp", 200), cond(99)).await.is_err());
        store.put(rec("L", "k").with("exp", 200), cond(100)).await.unwrap();
    }

    #[tokio::test]
    async fn update_adds_and_creates() {
        let store = InMemoryStore::new();
        let key = RecordKey::new("L|office", "sam");
        store
            .update(&key, vec![UpdateAction::Add("amount".into(), 15)], Condition::None)
            .await
            .unwrap();
        let r = store
            .update(&key, vec![UpdateAction::Add("amount".into(), -5)], Condition::None)
            .await
            .unwrap();
        assert_eq!(r.i64_attr("amount").unwrap(), 10);
    }

    #[tokio::test]
    async fn attr_equals_guards_update() {
        let store = InMemoryStore::new();
        let key = RecordKey::new("LOCK", "k");
        store.put(rec("LOCK", "k").with("token", "t1"), Condition::None).await.unwrap();
        let guard = |t: &str| Condition::AttrEquals { attr: "token".into(), value: Value::from(t) };
        assert!(store.update(&key, vec![], guard("t2")).await.is_err());
        store.update(&key, vec![], guard("t1")).await.unwrap();
    }

    #[tokio::test]
    async fn attr_equals_guards_delete() {
        let store = InMemoryStore::new();
        let key = RecordKey::new("LOCK", "k");
        store.put(rec("LOCK", "k").with("token", "t2"), Condition::None).await.unwrap();
        let guard = |t: &str| Condition::AttrEquals { attr: "token".into(), value: Value::from(t) };
        let err = store.delete(&key, guard("t1")).await.unwrap_err();
        assert!(matches!(err, SpreadbookError::ConditionFailed { .. }));
        assert!(store.get(&key).await.unwrap().is_some());
        store.delete(&key, guard("t2")).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_limit_returns_one_record_per_page() {
        let store = InMemoryStore::new();
        for sk in ["a", "b"] {
            store.put(rec("P", sk), Condition::None).await.unwrap();
        }
        let page = store.query(&Query::partition(Index::Primary, "P").limit(0)).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert!(page.next.is_some());
        let empty = store.query(&Query::partition(Index::Primary, "none").limit(0)).await.unwrap();
        assert!(empty.records.is_empty());
        assert!(empty.next.is_none());
    }

    #[tokio::test]
    async fn paged_query_follows_continuation() {
        let store = InMemoryStore::with_limits(3, 25);
        for i in 0..10 {
            store
                .put(
                    rec("P", &format!("{i:02}")).indexed(Index::Gsi1, "G", format!("{:02}", 9 - i)),
                    Condition::None,
                )
                .await
                .unwrap();
        }
        store.put(rec("Q", "x"), Condition::None).await.unwrap();

        let first = store.query(&Query::partition(Index::Primary, "P")).await.unwrap();
        assert_eq!(first.records.len(), 3);
        assert!(first.next.is_some());

        let ctx = OpContext::background();
        let all = query_all(&store, &ctx, Query::partition(Index::Primary, "P")).await.unwrap();
        assert_eq!(all.len(), 10);
        assert_eq!(all[0].key.sk, "00");
        assert_eq!(all[9].key.sk, "09");

        let by_gsi = query_all(&store, &ctx, Query::partition(Index::Gsi1, "G")).await.unwrap();
        assert_eq!(by_gsi.len(), 10);
        assert_eq!(by_gsi[0].key.sk, "09", "gsi order follows gsi sort key");
    }

    #[tokio::test]
    async fn config_sets_page_and_batch_limits() {
        let config = StoreConfig {
            query_page_size: 2,
            batch_write_limit: 4,
            ..StoreConfig::default()
        };
        let store = InMemoryStore::from_config(&config);
        let ops = |n: usize| (0..n).map(|i| WriteOp::Put(rec("P", &i.to_string()))).collect::<Vec<_>>();
        assert!(store.batch_write(ops(5)).await.is_err());
        store.batch_write(ops(4)).await.unwrap();

        let page = store.query(&Query::partition(Index::Primary, "P")).await.unwrap();
        assert_eq!(page.records.len(), 2);
        let page = store.query(&Query::partition(Index::Primary, "P").limit(10)).await.unwrap();
        assert_eq!(page.records.len(), 2, "page size caps explicit limits");
        let all = query_all(&store, &OpContext::background(), Query::partition(Index::Primary, "P"))
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn sort_conditions_narrow_queries() {
        let store = InMemoryStore::new();
        for sk in ["20230910|a", "20230910|b", "20230911|a"] {
            store.put(rec("P", sk), Condition::None).await.unwrap();
        }
        let page = store
            .query(
                &Query::partition(Index::Primary, "P")
                    .sorted(SortCondition::BeginsWith("20230910|".into())),
            )
            .await
            .unwrap();
        assert_eq!(page.records.len(), 2);
    }

    #[tokio::test]
    async fn batch_limit_and_faults() {
        let store = InMemoryStore::with_limits(100, 2);
        let ops = |n: usize| (0..n).map(|i| WriteOp::Put(rec("P", &i.to_string()))).collect::<Vec<_>>();
        assert!(matches!(
            store.batch_write(ops(3)).await,
            Err(SpreadbookError::BatchTooLarge { size: 3, limit: 2 })
        ));
        store.fail_next_batches(1);
        assert!(store.batch_write(ops(2)).await.is_err());
        store.batch_write(ops(2)).await.unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.batch_calls(), 3);
    }
}
