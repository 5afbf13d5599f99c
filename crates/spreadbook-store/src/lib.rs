//! # spreadbook-store
//!
//! Persistence plumbing for Spreadbook:
//!
//! - **Contract**: [`KeyedStore`], a keyed store with secondary indexes,
//!   conditional writes and paged queries, plus [`InMemoryStore`]
//! - **Context**: [`OpContext`] deadlines and cancellation for every call
//! - **Leases**: [`LeaseCoordinator`] serializing mutation of one event pool
//! - **Batching**: [`BatchWriter`] chunked concurrent writes with retry
//! - **Entities**: [`BidStore`], [`BetStore`], [`OutcomeStore`], [`BalanceStore`]
//!
//! Delimited key strings are produced only by [`keys`].

pub mod balances;
pub mod batch_writer;
pub mod bets;
pub mod bids;
pub mod context;
pub mod keys;
pub mod lease;
pub mod memory;
pub mod outcomes;
pub mod records;
pub mod store;

pub use balances::BalanceStore;
pub use batch_writer::{BatchWriter, FailedChunk, WriteReport};
pub use bets::BetStore;
pub use bids::BidStore;
pub use context::OpContext;
pub use lease::{InMemoryLeaseCoordinator, Lease, LeaseCoordinator, StoreLeaseCoordinator};
pub use memory::InMemoryStore;
pub use outcomes::{LedgerMarks, OutcomeStore};
pub use store::{
    Attributes, Condition, Continuation, Index, KeyedStore, Page, Query, Record, RecordKey,
    SortCondition, UpdateAction, WriteOp, query_all,
};
