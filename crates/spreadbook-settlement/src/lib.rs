//! # spreadbook-settlement
//!
//! **Settlement plane**: resolves matched bets against final scores and
//! moves league balances.
//!
//! ## Architecture
//!
//! 1. **ResultsFeed**: external source of scores, one call per partition
//! 2. **ScoreTable**: spread adjustment and the winner/push/defer decision
//! 3. **LedgerAggregator**: nets every delta per (league, user)
//! 4. **OutcomeGuard**: remembers outcomes recorded by this process
//! 5. **SettlementEngine**: runs one cycle end to end
//!
//! ## Invariants
//!
//! - An outcome id is derived from the event, both users and the bet's
//!   id, so a decision replays to the same record.
//! - Balances only move for recorded outcomes, and each applied delta is
//!   marked on its outcome so it is never applied twice by a rerun.
//! - A bet is RESOLVED only once both of its deltas are marked.
//! - Each (league, user) balance gets at most one update per cycle.
//! - Undecidable bets are deferred, then voided after the configured
//!   number of attempts.

pub mod engine;
pub mod feed;
pub mod idempotency;
pub mod ledger;
pub mod scores;

pub use engine::{
    BalanceFailure, MarkFailure, PartitionFailure, PartitionKey, SettlementEngine, SettlementReport,
    StatusFailure,
};
pub use feed::{EventStatus, FeedCompetitor, FeedEvent, KindTranslator, ResultsFeed, StaticFeed};
pub use idempotency::{OutcomeGuard, DEFAULT_GUARD_CAPACITY};
pub use ledger::LedgerAggregator;
pub use scores::{Decision, DeferReason, ScoreTable};
