//! Per-partition score table and the spread-adjusted decision for a bet.
//!
//! ## Decision Rules
//!
//! 1. No feed event for the bet's competitors: defer.
//! 2. Event not final, or a score missing: defer.
//! 3. Add the bet's quoted spread to the named competitor's score.
//! 4. Higher adjusted score wins; equal scores push.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use spreadbook_types::{Bet, Side, Spread};
use tracing::warn;

use crate::feed::FeedEvent;

/// Why a bet could not be decided this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferReason {
    /// The feed has no event for these competitors.
    Missing,
    /// The event exists but is not final.
    NotFinal,
    /// The partition's feed call failed or timed out.
    FeedUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Winner {
        side: Side,
        event_id: String,
        week: u32,
    },
    Push {
        event_id: String,
    },
    Defer(DeferReason),
}

/// Feed events of one partition, keyed by (away name, home name).
#[derive(Debug, Clone, Default)]
pub struct ScoreTable {
    events: HashMap<(String, String), FeedEvent>,
}

impl ScoreTable {
    #[must_use]
    pub fn from_events(events: Vec<FeedEvent>) -> Self {
        let events = events
            .into_iter()
            .map(|e| ((e.away().name.clone(), e.home().name.clone()), e))
            .collect();
        Self { events }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn decide(&self, bet: &Bet) -> Decision {
        let key = (bet.event.away.clone(), bet.event.home.clone());
        let Some(event) = self.events.get(&key) else {
            return Decision::Defer(DeferReason::Missing);
        };
        if !event.is_final() {
            return Decision::Defer(DeferReason::NotFinal);
        }
        let (Some(away), Some(home)) = (event.away().score, event.home().score) else {
            return Decision::Defer(DeferReason::NotFinal);
        };

        let (away, home) = adjusted(bet, event, away, home);
        let week = if event.week > 0 { event.week } else { bet.terms.week };
        match away.cmp(&home) {
            std::cmp::Ordering::Greater => Decision::Winner {
                side: Side::Away,
                event_id: event.id.clone(),
                week,
            },
            std::cmp::Ordering::Less => Decision::Winner {
                side: Side::Home,
                event_id: event.id.clone(),
                week,
            },
            std::cmp::Ordering::Equal => Decision::Push {
                event_id: event.id.clone(),
            },
        }
    }
}

/// Scores after the bet's quoted spread. The quote's abbreviation is
/// matched against the feed's abbreviations, then the bet's own.
fn adjusted(bet: &Bet, event: &FeedEvent, away: Decimal, home: Decimal) -> (Decimal, Decimal) {
    let Some(spread) = Spread::parse(&bet.terms.spread) else {
        return (away, home);
    };
    let feed_abbr = (event.away().abbreviation.as_str(), event.home().abbreviation.as_str());
    let bet_abbr = (
        bet.terms.away_abbreviation.as_str(),
        bet.terms.home_abbreviation.as_str(),
    );
    let (away_abbr, home_abbr) = if spread.side(feed_abbr.0, feed_abbr.1).is_some() {
        feed_abbr
    } else if spread.side(bet_abbr.0, bet_abbr.1).is_some() {
        bet_abbr
    } else {
        warn!(event = %event.id, spread = %spread, "spread names neither competitor, scores unadjusted");
        return (away, home);
    };
    spread.adjust(away_abbr, home_abbr, away, home)
}
