//! Bet types: matched bilateral wagers between an away-side and a home-side user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Amount, BetId, EventKey, EventTerms, Side, UserId};

/// Lifecycle status of a bet. Only settlement moves a bet out of `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetStatus {
    /// Matched, awaiting the event result.
    Pending,
    /// Settled with a winner; an outcome was recorded.
    Resolved,
    /// Adjusted scores tied; stakes are returned, no ledger movement.
    Pushed,
    /// Result unavailable last cycle; retried next cycle.
    Deferred,
    /// Deferred too many times; stakes are returned, no ledger movement.
    Void,
}

impl BetStatus {
    /// Whether settlement should still look at this bet.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Deferred)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Resolved => "RESOLVED",
            Self::Pushed => "PUSHED",
            Self::Deferred => "DEFERRED",
            Self::Void => "VOID",
        }
    }

    /// Parse the persisted status string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RESOLVED" => Some(Self::Resolved),
            "PUSHED" => Some(Self::Pushed),
            "DEFERRED" => Some(Self::Deferred),
            "VOID" => Some(Self::Void),
            _ => None,
        }
    }
}

impl std::fmt::Display for BetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A matched wager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: BetId,
    pub event: EventKey,
    pub terms: EventTerms,
    pub away_user: UserId,
    pub home_user: UserId,
    pub amount: Amount,
    pub status: BetStatus,
    /// Settlement cycles this bet has been deferred.
    #[serde(default)]
    pub deferrals: u32,
    pub created_at: DateTime<Utc>,
}

impl Bet {
    /// A fresh pending bet with a newly minted id.
    #[must_use]
    pub fn pending(
        event: EventKey,
        terms: EventTerms,
        away_user: UserId,
        home_user: UserId,
        amount: Amount,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BetId::new(),
            event,
            terms,
            away_user,
            home_user,
            amount,
            status: BetStatus::Pending,
            deferrals: 0,
            created_at,
        }
    }

    /// User holding `side` of this bet.
    #[must_use]
    pub fn user_on(&self, side: Side) -> &UserId {
        match side {
            Side::Away => &self.away_user,
            Side::Home => &self.home_user,
        }
    }

    /// Merge key used to fold repeated matches between the same pair.
    #[must_use]
    pub fn pair(&self) -> BetPair {
        BetPair {
            away_user: self.away_user.clone(),
            home_user: self.home_user.clone(),
        }
    }
}

impl std::fmt::Display for Bet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Bet[{} ({}) vs {} ({}) x{} {}]",
            self.away_user, self.event.away, self.home_user, self.event.home, self.amount, self.status
        )
    }
}

/// (away user, home user) pair; within one event this identifies a bet
/// for merging purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct BetPair {
    pub away_user: UserId,
    pub home_user: UserId,
}

impl BetPair {
    /// Pair formed by an away-side user and a home-side user, given which
    /// side `first` is on.
    #[must_use]
    pub fn from_sides(first: &UserId, first_side: Side, second: &UserId) -> Self {
        match first_side {
            Side::Away => Self {
                away_user: first.clone(),
                home_user: second.clone(),
            },
            Side::Home => Self {
                away_user: second.clone(),
                home_user: first.clone(),
            },
        }
    }
}
