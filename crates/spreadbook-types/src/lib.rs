//! # spreadbook-types
//!
//! Shared types, errors, and configuration for the **Spreadbook** pooled-wager
//! exchange.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`UserId`], [`DivisionId`], [`Kind`], [`OutcomeId`], [`Amount`]
//! - **Event model**: [`EventKey`], [`EventTerms`], [`Side`]
//! - **Bid model**: [`BidRequest`], [`Bid`], [`BidKey`]
//! - **Bet model**: [`Bet`], [`BetStatus`], [`BetPair`]
//! - **Settlement model**: [`Outcome`], [`LedgerKey`], [`LedgerDelta`], [`Spread`]
//! - **Time**: [`Clock`], [`SystemClock`]
//! - **Configuration**: [`SpreadbookConfig`] and its sections
//! - **Errors**: [`SpreadbookError`] with `SB_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod bet;
pub mod bid;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod ledger;
pub mod outcome;
pub mod spread;

// Re-export all primary types at crate root for ergonomic imports:
//   use spreadbook_types::{Bid, Bet, EventKey, Side, ...};

pub use bet::*;
pub use bid::*;
pub use clock::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use ledger::*;
pub use outcome::*;
pub use spread::*;

// Constants are accessed via `spreadbook_types::constants::FOO`
// (not re-exported to avoid name collisions).
