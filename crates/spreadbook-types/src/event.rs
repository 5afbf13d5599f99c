//! Event identity: which game a bid or bet refers to.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{DivisionId, Kind};

/// Which competitor a stake backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Side {
    Away,
    Home,
}

impl Side {
    /// The other side of the event.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Away => Self::Home,
            Self::Home => Self::Away,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Away => write!(f, "AWAY"),
            Self::Home => write!(f, "HOME"),
        }
    }
}

/// Identity of one scheduled event within a division.
///
/// Two bids refer to the same pool exactly when their `EventKey`s are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct EventKey {
    pub division: DivisionId,
    pub kind: Kind,
    /// Scheduled start, truncated to whole seconds.
    pub scheduled_at: DateTime<Utc>,
    pub away: String,
    pub home: String,
}

impl EventKey {
    #[must_use]
    pub fn new(
        division: DivisionId,
        kind: Kind,
        scheduled_at: DateTime<Utc>,
        away: impl Into<String>,
        home: impl Into<String>,
    ) -> Self {
        Self {
            division,
            kind,
            scheduled_at: scheduled_at.with_nanosecond(0).unwrap_or(scheduled_at),
            away: away.into(),
            home: home.into(),
        }
    }

    /// Name of the competitor on `side`.
    #[must_use]
    pub fn competitor(&self, side: Side) -> &str {
        match side {
            Side::Away => &self.away,
            Side::Home => &self.home,
        }
    }

    /// Which side a competitor name belongs to, if any.
    #[must_use]
    pub fn side_of(&self, competitor: &str) -> Option<Side> {
        if competitor == self.away {
            Some(Side::Away)
        } else if competitor == self.home {
            Some(Side::Home)
        } else {
            None
        }
    }

    /// Calendar date (UTC) of the event, used by settlement windows.
    #[must_use]
    pub fn event_date(&self) -> NaiveDate {
        self.scheduled_at.date_naive()
    }

    /// Whether the event has started at `now`.
    #[must_use]
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.scheduled_at
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} {} @ {} ({})",
            self.division,
            self.kind,
            self.away,
            self.home,
            self.scheduled_at.to_rfc3339()
        )
    }
}

/// Market terms quoted with an event listing and copied onto bids and bets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EventTerms {
    /// Quoted spread, e.g. `"KC -3.5"`. May be empty or `"EVEN"`.
    pub spread: String,
    /// Season week number.
    pub week: u32,
    pub away_abbreviation: String,
    pub home_abbreviation: String,
}
