//! Bid types: one-sided stakes on a competitor.
//!
//! A [`BidRequest`] is what the API layer hands in (untrusted, possibly
//! malformed). The validator turns it into a [`Bid`], which is what the
//! matcher and the bid store work with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Amount, EventKey, EventTerms, Side, UserId};

/// Raw bid as submitted by a client (JSON body element).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BidRequest {
    pub kind: String,
    pub away_team: String,
    pub home_team: String,
    pub chosen_competitor: String,
    #[serde(default)]
    pub spread: String,
    pub amount: i64,
    /// Scheduled event start.
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub week: u32,
    #[serde(default)]
    pub home_abbreviation: String,
    #[serde(default)]
    pub away_abbreviation: String,
    pub div: String,
}

/// An active one-sided stake resting in an event's pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub event: EventKey,
    pub terms: EventTerms,
    /// Competitor side this stake backs.
    pub chosen: Side,
    /// Unmatched stake. Decreases as the bid is matched.
    pub amount: Amount,
    pub user: UserId,
    /// Submission time; earlier bids have matching priority.
    pub created_at: DateTime<Utc>,
}

/// Identity of a bid within the store: event plus (side, user, submission time).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct BidKey {
    pub event: EventKey,
    pub chosen: Side,
    pub user: UserId,
    pub created_ms: i64,
}

impl Bid {
    #[must_use]
    pub fn key(&self) -> BidKey {
        BidKey {
            event: self.event.clone(),
            chosen: self.chosen,
            user: self.user.clone(),
            created_ms: self.created_at.timestamp_millis(),
        }
    }

    /// Name of the competitor this bid backs.
    #[must_use]
    pub fn chosen_competitor(&self) -> &str {
        self.event.competitor(self.chosen)
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.amount == 0
    }
}

impl std::fmt::Display for Bid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Bid[{} {} on {} x{}]",
            self.user,
            self.chosen,
            self.chosen_competitor(),
            self.amount
        )
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Bid {
    /// A bid on a fixed demo event, created `created_ms` after the epoch.
    pub fn dummy(user: &str, chosen: Side, amount: Amount, created_ms: i64) -> Self {
        Self {
            event: EventKey::dummy(),
            terms: EventTerms {
                spread: "AWY -3.0".to_string(),
                week: 1,
                away_abbreviation: "AWY".to_string(),
                home_abbreviation: "HOM".to_string(),
            },
            chosen,
            amount,
            user: UserId::new(user),
            created_at: DateTime::<Utc>::from_timestamp_millis(created_ms).unwrap_or_default(),
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl EventKey {
    /// Demo event: `Away Team @ Home Team`, NFL, division `test`.
    pub fn dummy() -> Self {
        Self::new(
            crate::DivisionId::new("test"),
            crate::Kind::new("NFL"),
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
            "Away Team",
            "Home Team",
        )
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl BidRequest {
    /// A valid request on [`EventKey::dummy`] backing `competitor`.
    pub fn dummy(competitor: &str, amount: i64) -> Self {
        let event = EventKey::dummy();
        Self {
            kind: event.kind.0.clone(),
            away_team: event.away.clone(),
            home_team: event.home.clone(),
            chosen_competitor: competitor.to_string(),
            spread: "AWY -3.0".to_string(),
            amount,
            date: event.scheduled_at,
            week: 1,
            home_abbreviation: "HOM".to_string(),
            away_abbreviation: "AWY".to_string(),
            div: event.division.0,
        }
    }
}
