//! Outcome records: the resolved winner/loser of one matched bet.

use serde::{Deserialize, Serialize};

use crate::{Amount, Bet, DivisionId, LedgerDelta, OutcomeId, Side, UserId};

/// Append-only record produced by settlement for one decided bet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: OutcomeId,
    pub winner: UserId,
    pub loser: UserId,
    /// Results-feed event id the bet was resolved against.
    pub event_id: String,
    pub week: u32,
    pub amount: Amount,
    pub division: DivisionId,
}

impl Outcome {
    /// Outcome of `bet` when the competitor on `winning_side` covered.
    #[must_use]
    pub fn for_bet(bet: &Bet, winning_side: Side, event_id: &str, week: u32) -> Self {
        let winner = bet.user_on(winning_side).clone();
        let loser = bet.user_on(winning_side.opposite()).clone();
        let id = OutcomeId::derive(
            event_id,
            winner.as_str(),
            loser.as_str(),
            &bet.id.to_string(),
        );
        Self {
            id,
            winner,
            loser,
            event_id: event_id.to_string(),
            week,
            amount: bet.amount,
            division: bet.event.division.clone(),
        }
    }

    /// The ledger signal owed to `party`: `+amount` to the winner and
    /// `-amount` to the loser, scoped to the outcome's division.
    #[must_use]
    pub fn delta(&self, party: Party) -> LedgerDelta {
        let amount = i64::try_from(self.amount).unwrap_or(i64::MAX);
        match party {
            Party::Winner => LedgerDelta::new(self.division.clone(), self.winner.clone(), amount),
            Party::Loser => LedgerDelta::new(self.division.clone(), self.loser.clone(), -amount),
        }
    }
}

/// One side of a decided outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Winner,
    Loser,
}

impl Party {
    pub const BOTH: [Party; 2] = [Party::Winner, Party::Loser];
}
