//! Key codec: the only place structured keys become delimiter-joined strings.
//!
//! Field order inside each key is fixed; changing it changes what the
//! prefix and range queries select.
//!
//! | Entity  | pk                               | sk                                       |
//! |---------|----------------------------------|------------------------------------------|
//! | bid     | `B|div|kind|date|away|home`      | `competitor|user|createdMs`              |
//! | bet     | `BET|div|week`                   | `kind|away|home|awayUser|homeUser|ms|id` |
//! | outcome | `OUT|div|week`                   | `id`                                     |
//! | balance | `L|league`                       | `user`                                   |
//! | lease   | `LOCK`                           | `BIDPOOL|div|kind|unix|away|home`        |

use chrono::NaiveDate;
use spreadbook_types::constants::{KEY_DELIMITER, RECORD_TTL_DAYS};
use spreadbook_types::{
    Bet, BidKey, DivisionId, EventKey, LedgerKey, Outcome, UserId,
};

use crate::store::RecordKey;

fn join(parts: &[&str]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(KEY_DELIMITER);
        }
        out.push_str(part);
    }
    out
}

/// Zero-padded millis so lexical order equals numeric order.
fn millis(ms: i64) -> String {
    format!("{ms:013}")
}

fn date_code(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

// ---------------------------------------------------------------------------
// Bids
// ---------------------------------------------------------------------------

/// Partition holding every bid on `event`.
#[must_use]
pub fn bid_partition(event: &EventKey) -> String {
    join(&[
        "B",
        event.division.as_str(),
        event.kind.as_str(),
        &event.scheduled_at.to_rfc3339(),
        &event.away,
        &event.home,
    ])
}

#[must_use]
pub fn bid_key(key: &BidKey) -> RecordKey {
    RecordKey::new(
        bid_partition(&key.event),
        join(&[
            key.event.competitor(key.chosen),
            key.user.as_str(),
            &millis(key.created_ms),
        ]),
    )
}

/// Per-user bid index partition.
#[must_use]
pub fn bid_user_partition(user: &UserId) -> String {
    join(&["BID", user.as_str()])
}

#[must_use]
pub fn bid_user_sort(key: &BidKey) -> String {
    join(&[&date_code(key.event.event_date()), &millis(key.created_ms)])
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

#[must_use]
pub fn bet_partition(division: &DivisionId, week: u32) -> String {
    join(&["BET", division.as_str(), &week.to_string()])
}

#[must_use]
pub fn bet_key(bet: &Bet) -> RecordKey {
    RecordKey::new(
        bet_partition(&bet.event.division, bet.terms.week),
        join(&[
            bet.event.kind.as_str(),
            &bet.event.away,
            &bet.event.home,
            bet.away_user.as_str(),
            bet.home_user.as_str(),
            &millis(bet.created_at.timestamp_millis()),
            &bet.id.to_string(),
        ]),
    )
}

/// Event-date index: one partition, sorted by date then bet key.
pub const BET_DATE_PARTITION: &str = "BET";

/// Deferred-bet index partition; only deferred bets are projected into it.
pub const BET_DEFERRED_PARTITION: &str = "BET_DEFERRED";

#[must_use]
pub fn bet_date_sort(bet: &Bet) -> String {
    join(&[&date_code(bet.event.event_date()), &bet_key(bet).sk])
}

/// Prefix selecting every bet on `date` in the event-date index.
#[must_use]
pub fn bet_date_prefix(date: NaiveDate) -> String {
    let mut prefix = date_code(date);
    prefix.push(KEY_DELIMITER);
    prefix
}

/// Per-user bet index partition (away-side and home-side indexes share it).
#[must_use]
pub fn bet_user_partition(user: &UserId) -> String {
    join(&["BET", user.as_str()])
}

#[must_use]
pub fn bet_user_sort(bet: &Bet) -> String {
    join(&[&millis(bet.created_at.timestamp_millis()), &bet.id.to_string()])
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[must_use]
pub fn outcome_partition(division: &DivisionId, week: u32) -> String {
    join(&["OUT", division.as_str(), &week.to_string()])
}

#[must_use]
pub fn outcome_key(outcome: &Outcome) -> RecordKey {
    RecordKey::new(
        outcome_partition(&outcome.division, outcome.week),
        outcome.id.to_string(),
    )
}

#[must_use]
pub fn outcome_winner_partition(user: &UserId) -> String {
    join(&["OUTW", user.as_str()])
}

#[must_use]
pub fn outcome_loser_partition(user: &UserId) -> String {
    join(&["OUTL", user.as_str()])
}

#[must_use]
pub fn outcome_user_sort(outcome: &Outcome) -> String {
    join(&[&outcome.event_id, &outcome.id.to_string()])
}

// ---------------------------------------------------------------------------
// Balances and leases
// ---------------------------------------------------------------------------

#[must_use]
pub fn balance_key(key: &LedgerKey) -> RecordKey {
    RecordKey::new(join(&["L", key.league.as_str()]), key.user.as_str())
}

pub const LEASE_PARTITION: &str = "LOCK";

/// Lease name guarding the bid pool of `event`.
#[must_use]
pub fn event_lease_name(event: &EventKey) -> String {
    join(&[
        "BIDPOOL",
        event.division.as_str(),
        event.kind.as_str(),
        &event.scheduled_at.timestamp().to_string(),
        &event.away,
        &event.home,
    ])
}

/// Scheduler rule name for the market-close job of `event`.
#[must_use]
pub fn market_close_rule(event: &EventKey) -> String {
    join(&["CLOSE", &event_lease_name(event)])
}

#[must_use]
pub fn lease_key(name: &str) -> RecordKey {
    RecordKey::new(LEASE_PARTITION, name)
}

/// Expiry (unix seconds) stamped on bid and bet records.
#[must_use]
pub fn record_ttl(event: &EventKey) -> i64 {
    (event.scheduled_at + chrono::Duration::days(RECORD_TTL_DAYS)).timestamp()
}
