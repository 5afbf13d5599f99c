//! # spreadbook-matchcore
//!
//! **Pure time-priority bid matcher for Spreadbook.**
//!
//! MatchCore turns an event's pool of one-sided bids into bilateral bets.
//! It has:
//!
//! - **Zero I/O**: callers load the pool and persist the resulting plan
//! - **Time priority**: earliest submission fills first, deterministic ties
//! - **Self-match prevention**: a user is never matched against themselves
//! - **Conservation**: every pass is checked before its plan is returned

pub mod book;
pub mod conservation;
pub mod matcher;
pub mod pool;
pub mod queue;

pub use book::{BidChanges, EventBook};
pub use conservation::{SideTotals, verify_conservation};
pub use matcher::{Fill, MatchPass, MatchPlan, match_incoming};
pub use pool::match_event_pool;
pub use queue::{QueuedBid, SideQueue};
