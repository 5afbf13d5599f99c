//! Entity <-> record conversion.
//!
//! Each entity is flattened into a camelCase attribute map, then projected
//! onto the indexes it is queried by. Decoding ignores index attributes.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spreadbook_types::{
    Amount, Bet, BetId, BetStatus, Bid, DivisionId, EventKey, EventTerms, Kind, Outcome, OutcomeId,
    Party, Result, Side, SpreadbookError, UserId,
};

use crate::keys;
use crate::outcomes::LedgerMarks;
use crate::store::{Attributes, Index, Record};

fn to_attrs<T: Serialize>(item: &T) -> Result<Attributes> {
    match serde_json::to_value(item)? {
        Value::Object(map) => Ok(map),
        other => Err(SpreadbookError::Serialization(format!(
            "expected object, got {other}"
        ))),
    }
}

fn from_record<T: DeserializeOwned>(record: &Record) -> Result<T> {
    serde_json::from_value(Value::Object(record.attrs.clone())).map_err(|e| {
        SpreadbookError::RecordDecode {
            reason: format!("{}: {e}", record.key),
        }
    })
}

// ---------------------------------------------------------------------------
// Bid
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BidItem {
    division: String,
    kind: String,
    date: DateTime<Utc>,
    away_team: String,
    home_team: String,
    chosen: Side,
    amount: Amount,
    user: String,
    created_ms: i64,
    #[serde(default)]
    spread: String,
    #[serde(default)]
    week: u32,
    #[serde(default)]
    away_abbreviation: String,
    #[serde(default)]
    home_abbreviation: String,
    ttl: i64,
}

pub fn bid_record(bid: &Bid) -> Result<Record> {
    let key = bid.key();
    let item = BidItem {
        division: bid.event.division.0.clone(),
        kind: bid.event.kind.0.clone(),
        date: bid.event.scheduled_at,
        away_team: bid.event.away.clone(),
        home_team: bid.event.home.clone(),
        chosen: bid.chosen,
        amount: bid.amount,
        user: bid.user.0.clone(),
        created_ms: key.created_ms,
        spread: bid.terms.spread.clone(),
        week: bid.terms.week,
        away_abbreviation: bid.terms.away_abbreviation.clone(),
        home_abbreviation: bid.terms.home_abbreviation.clone(),
        ttl: keys::record_ttl(&bid.event),
    };
    Ok(Record {
        key: keys::bid_key(&key),
        attrs: to_attrs(&item)?,
    }
    .indexed(
        Index::Gsi1,
        keys::bid_user_partition(&bid.user),
        keys::bid_user_sort(&key),
    ))
}

pub fn bid_from_record(record: &Record) -> Result<Bid> {
    let item: BidItem = from_record(record)?;
    let created_at = DateTime::<Utc>::from_timestamp_millis(item.created_ms).ok_or_else(|| {
        SpreadbookError::RecordDecode {
            reason: format!("{}: bad createdMs {}", record.key, item.created_ms),
        }
    })?;
    Ok(Bid {
        event: EventKey::new(
            DivisionId(item.division),
            Kind(item.kind),
            item.date,
            item.away_team,
            item.home_team,
        ),
        terms: EventTerms {
            spread: item.spread,
            week: item.week,
            away_abbreviation: item.away_abbreviation,
            home_abbreviation: item.home_abbreviation,
        },
        chosen: item.chosen,
        amount: item.amount,
        user: UserId(item.user),
        created_at,
    })
}

// ---------------------------------------------------------------------------
// Bet
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BetItem {
    bet_id: String,
    division: String,
    kind: String,
    date: DateTime<Utc>,
    away_team: String,
    home_team: String,
    away_user: String,
    home_user: String,
    amount: Amount,
    status: BetStatus,
    #[serde(default)]
    deferrals: u32,
    created_ms: i64,
    #[serde(default)]
    spread: String,
    week: u32,
    #[serde(default)]
    away_abbreviation: String,
    #[serde(default)]
    home_abbreviation: String,
    ttl: i64,
}

pub fn bet_record(bet: &Bet) -> Result<Record> {
    let item = BetItem {
        bet_id: bet.id.to_string(),
        division: bet.event.division.0.clone(),
        kind: bet.event.kind.0.clone(),
        date: bet.event.scheduled_at,
        away_team: bet.event.away.clone(),
        home_team: bet.event.home.clone(),
        away_user: bet.away_user.0.clone(),
        home_user: bet.home_user.0.clone(),
        amount: bet.amount,
        status: bet.status,
        deferrals: bet.deferrals,
        created_ms: bet.created_at.timestamp_millis(),
        spread: bet.terms.spread.clone(),
        week: bet.terms.week,
        away_abbreviation: bet.terms.away_abbreviation.clone(),
        home_abbreviation: bet.terms.home_abbreviation.clone(),
        ttl: keys::record_ttl(&bet.event),
    };
    let sort = keys::bet_user_sort(bet);
    let mut record = Record {
        key: keys::bet_key(bet),
        attrs: to_attrs(&item)?,
    }
    .indexed(Index::Gsi1, keys::BET_DATE_PARTITION, keys::bet_date_sort(bet))
    .indexed(Index::Gsi2, keys::bet_user_partition(&bet.away_user), sort.clone())
    .indexed(Index::Gsi3, keys::bet_user_partition(&bet.home_user), sort);
    if bet.status == BetStatus::Deferred {
        record = record.indexed(
            Index::Gsi4,
            keys::BET_DEFERRED_PARTITION,
            keys::bet_date_sort(bet),
        );
    }
    Ok(record)
}

pub fn bet_from_record(record: &Record) -> Result<Bet> {
    let item: BetItem = from_record(record)?;
    let created_at = DateTime::<Utc>::from_timestamp_millis(item.created_ms).ok_or_else(|| {
        SpreadbookError::RecordDecode {
            reason: format!("{}: bad createdMs {}", record.key, item.created_ms),
        }
    })?;
    Ok(Bet {
        id: BetId::parse(&item.bet_id)?,
        event: EventKey::new(
            DivisionId(item.division),
            Kind(item.kind),
            item.date,
            item.away_team,
            item.home_team,
        ),
        terms: EventTerms {
            spread: item.spread,
            week: item.week,
            away_abbreviation: item.away_abbreviation,
            home_abbreviation: item.home_abbreviation,
        },
        away_user: UserId(item.away_user),
        home_user: UserId(item.home_user),
        amount: item.amount,
        status: item.status,
        deferrals: item.deferrals,
        created_at,
    })
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeItem {
    id: String,
    winner: String,
    loser: String,
    event_id: String,
    week: u32,
    amount: Amount,
    division: String,
    #[serde(default)]
    winner_applied: bool,
    #[serde(default)]
    loser_applied: bool,
}

pub fn outcome_record(outcome: &Outcome) -> Result<Record> {
    let item = OutcomeItem {
        id: outcome.id.to_string(),
        winner: outcome.winner.0.clone(),
        loser: outcome.loser.0.clone(),
        event_id: outcome.event_id.clone(),
        week: outcome.week,
        amount: outcome.amount,
        division: outcome.division.0.clone(),
        winner_applied: false,
        loser_applied: false,
    };
    let sort = keys::outcome_user_sort(outcome);
    Ok(Record {
        key: keys::outcome_key(outcome),
        attrs: to_attrs(&item)?,
    }
    .indexed(Index::Gsi1, keys::outcome_winner_partition(&outcome.winner), sort.clone())
    .indexed(Index::Gsi2, keys::outcome_loser_partition(&outcome.loser), sort))
}

pub fn outcome_from_record(record: &Record) -> Result<Outcome> {
    let item: OutcomeItem = from_record(record)?;
    Ok(Outcome {
        id: OutcomeId::parse(&item.id)?,
        winner: UserId(item.winner),
        loser: UserId(item.loser),
        event_id: item.event_id,
        week: item.week,
        amount: item.amount,
        division: DivisionId(item.division),
    })
}

pub fn ledger_marks_from_record(record: &Record) -> Result<LedgerMarks> {
    let item: OutcomeItem = from_record(record)?;
    Ok(LedgerMarks {
        winner: item.winner_applied,
        loser: item.loser_applied,
    })
}

/// Attribute flagging that `party`'s balance delta was applied.
#[must_use]
pub fn applied_attr(party: Party) -> &'static str {
    match party {
        Party::Winner => "winnerApplied",
        Party::Loser => "loserApplied",
    }
}
