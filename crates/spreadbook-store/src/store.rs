//! The keyed-store contract.
//!
//! A record lives under a `(pk, sk)` primary key and carries a flat JSON
//! attribute map. Up to four secondary indexes are projected from the
//! `gsiNpk` / `gsiNsk` attributes of each record. Queries address one
//! partition of one index, narrow it with a [`SortCondition`], and return
//! pages linked by an opaque [`Continuation`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use spreadbook_types::{Result, SpreadbookError};

use crate::context::OpContext;

/// Attribute map of one record.
pub type Attributes = Map<String, Value>;

/// Primary key of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RecordKey {
    pub pk: String,
    pub sk: String,
}

impl RecordKey {
    #[must_use]
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.pk, self.sk)
    }
}

/// One stored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: RecordKey,
    pub attrs: Attributes,
}

impl Record {
    #[must_use]
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            attrs: Attributes::new(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Project the record onto `index` under `(pk, sk)`.
    #[must_use]
    pub fn indexed(self, index: Index, pk: impl Into<String>, sk: impl Into<String>) -> Self {
        match index.attr_names() {
            Some((pk_attr, sk_attr)) => self.with(pk_attr, pk.into()).with(sk_attr, sk.into()),
            None => self,
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// String attribute, or a decode error naming the missing field.
    pub fn str_attr(&self, name: &str) -> Result<&str> {
        self.attrs
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(name))
    }

    /// Integer attribute, or a decode error naming the missing field.
    pub fn i64_attr(&self, name: &str) -> Result<i64> {
        self.attrs
            .get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| self.missing(name))
    }

    fn missing(&self, name: &str) -> SpreadbookError {
        SpreadbookError::RecordDecode {
            reason: format!("record {} has no usable '{name}' attribute", self.key),
        }
    }

    /// Sort value of this record within `index`.
    #[must_use]
    pub fn sort_value(&self, index: Index) -> Option<&str> {
        match index.attr_names() {
            None => Some(&self.key.sk),
            Some((_, sk_attr)) => self.attrs.get(sk_attr).and_then(Value::as_str),
        }
    }

    /// Partition value of this record within `index`.
    #[must_use]
    pub fn partition_value(&self, index: Index) -> Option<&str> {
        match index.attr_names() {
            None => Some(&self.key.pk),
            Some((pk_attr, _)) => self.attrs.get(pk_attr).and_then(Value::as_str),
        }
    }
}

/// Which index a query addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Index {
    Primary,
    Gsi1,
    Gsi2,
    Gsi3,
    Gsi4,
}

impl Index {
    /// `(partition attribute, sort attribute)` for secondary indexes.
    #[must_use]
    pub fn attr_names(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Primary => None,
            Self::Gsi1 => Some(("gsi1pk", "gsi1sk")),
            Self::Gsi2 => Some(("gsi2pk", "gsi2sk")),
            Self::Gsi3 => Some(("gsi3pk", "gsi3sk")),
            Self::Gsi4 => Some(("gsi4pk", "gsi4sk")),
        }
    }
}

/// Narrowing applied to the sort key within a partition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SortCondition {
    #[default]
    Any,
    Eq(String),
    BeginsWith(String),
    /// Inclusive on both ends.
    Between(String, String),
}

impl SortCondition {
    #[must_use]
    pub fn matches(&self, sort: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Eq(v) => sort == v,
            Self::BeginsWith(prefix) => sort.starts_with(prefix.as_str()),
            Self::Between(lo, hi) => sort >= lo.as_str() && sort <= hi.as_str(),
        }
    }
}

/// Opaque position returned with a non-final page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation(pub String);

/// A query against one partition of one index.
#[derive(Debug, Clone)]
pub struct Query {
    pub index: Index,
    pub partition: String,
    pub sort: SortCondition,
    pub limit: Option<usize>,
    pub start: Option<Continuation>,
}

impl Query {
    #[must_use]
    pub fn partition(index: Index, partition: impl Into<String>) -> Self {
        Self {
            index,
            partition: partition.into(),
            sort: SortCondition::Any,
            limit: None,
            start: None,
        }
    }

    #[must_use]
    pub fn sorted(mut self, sort: SortCondition) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,
    pub next: Option<Continuation>,
}

/// Precondition on a single-record write.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    None,
    Exists,
    NotExists,
    /// No record, or the record's numeric `attr` is `<= now`.
    AbsentOrExpired { attr: String, now: i64 },
    /// The record exists and `attr` equals `value`.
    AttrEquals { attr: String, value: Value },
}

/// One modification applied by [`KeyedStore::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    Set(String, Value),
    /// Add to a numeric attribute, treating a missing one as zero.
    Add(String, i64),
    Remove(String),
}

/// One operation in a batch write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put(Record),
    Delete(RecordKey),
}

impl WriteOp {
    #[must_use]
    pub fn key(&self) -> &RecordKey {
        match self {
            Self::Put(r) => &r.key,
            Self::Delete(k) => k,
        }
    }
}

/// Remote keyed store with secondary indexes.
///
/// Writes are atomic per record only. `batch_write` accepts at most the
/// store's batch limit and may fail as a whole.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    async fn get(&self, key: &RecordKey) -> Result<Option<Record>>;

    async fn query(&self, query: &Query) -> Result<Page>;

    /// Write `record`, failing with `ConditionFailed` if `condition` does
    /// not hold for the current record.
    async fn put(&self, record: Record, condition: Condition) -> Result<()>;

    /// Apply `actions` to the record at `key` (creating it if absent) and
    /// return the record as written.
    async fn update(
        &self,
        key: &RecordKey,
        actions: Vec<UpdateAction>,
        condition: Condition,
    ) -> Result<Record>;

    /// Remove the record at `key` if `condition` holds; deleting an absent
    /// record under [`Condition::None`] succeeds.
    async fn delete(&self, key: &RecordKey, condition: Condition) -> Result<()>;

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<()>;
}

/// Run `query` to exhaustion, following continuation tokens.
pub async fn query_all(
    store: &dyn KeyedStore,
    ctx: &OpContext,
    mut query: Query,
) -> Result<Vec<Record>> {
    let mut out = Vec::new();
    loop {
        let page = ctx.run(store.query(&query)).await?;
        out.extend(page.records);
        match page.next {
            Some(next) => query.start = Some(next),
            None => return Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_conditions() {
        assert!(SortCondition::Any.matches("x"));
        assert!(SortCondition::Eq("a".into()).matches("a"));
        assert!(!SortCondition::Eq("a".into()).matches("ab"));
        assert!(SortCondition::BeginsWith("20230910|".into()).matches("20230910|NFL"));
        assert!(!SortCondition::BeginsWith("20230910|".into()).matches("20230911|NFL"));
        let between = SortCondition::Between("b".into(), "d".into());
        assert!(between.matches("b"));
        assert!(between.matches("c"));
        assert!(between.matches("d"));
        assert!(!between.matches("e"));
    }

    #[test]
    fn index_projection() {
        let r = Record::new(RecordKey::new("P", "S")).indexed(Index::Gsi2, "G", "1");
        assert_eq!(r.partition_value(Index::Gsi2), Some("G"));
        assert_eq!(r.sort_value(Index::Gsi2), Some("1"));
        assert_eq!(r.partition_value(Index::Primary), Some("P"));
        assert_eq!(r.partition_value(Index::Gsi1), None);
    }

    #[test]
    fn missing_attribute_is_decode_error() {
        let r = Record::new(RecordKey::new("P", "S")).with("n", 3);
        assert_eq!(r.i64_attr("n").unwrap(), 3);
        let err = r.str_attr("name").unwrap_err();
        assert!(matches!(err, SpreadbookError::RecordDecode { .. }));
    }
}
