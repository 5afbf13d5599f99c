//! # spreadbook-ingress
//!
//! **Bid intake plane**: validation, leased matching, persistence and
//! market-close scheduling.
//!
//! ## Architecture
//!
//! Ingress sits between the API layer and the store:
//! 1. **BidValidator**: hard gate, rejects malformed or out-of-range bids
//! 2. **BidSubmissionService**: per-event lease, match pass, batch write
//! 3. **Scheduler**: one-shot jobs for deferred matching
//! 4. **MarketCloseMatcher**: crosses a whole pool when its job fires
//!
//! ## Bid Flow
//!
//! ```text
//! API → BidValidator.validate() → lease(event) → MatchPass → BatchWriter
//!     → release(event) → SubmissionReceipt
//! ```
//!
//! No bid or bet record of an event is written without that event's lease.

pub mod market_close;
pub mod scheduler;
pub mod submission;
pub mod validator;

pub use market_close::{MarketCloseJob, MarketCloseMatcher, MarketCloseReport};
pub use scheduler::{InMemoryScheduler, ScheduledJob, Scheduler};
pub use submission::{BidSubmissionService, EventFailure, Rejection, SubmissionReceipt};
pub use validator::BidValidator;
