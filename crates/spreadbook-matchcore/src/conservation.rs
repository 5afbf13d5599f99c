//! Amount conservation checker for matching passes.
//!
//! Invariant checked after every pass:
//! ```text
//! ∀ side: entered(side) - remaining(side) == Σ bet.amount
//! ```
//! where `entered` is the stake loaded from the store plus the stake
//! submitted in the pass. Nothing matched may be zero, and nothing written
//! back may carry a zero amount.

use spreadbook_types::{Amount, Bet, Result, Side, SpreadbookError};

use crate::BidChanges;

/// Stake per side of one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideTotals {
    pub away: Amount,
    pub home: Amount,
}

impl SideTotals {
    #[must_use]
    pub fn get(&self, side: Side) -> Amount {
        match side {
            Side::Away => self.away,
            Side::Home => self.home,
        }
    }

    pub fn add(&mut self, side: Side, amount: Amount) {
        match side {
            Side::Away => self.away += amount,
            Side::Home => self.home += amount,
        }
    }
}

/// Verify that every unit of stake removed from either side ended up in a
/// bet, and that no zero-amount artifact is about to be persisted.
///
/// # Errors
/// [`SpreadbookError::ConservationViolation`] describing the first mismatch.
pub fn verify_conservation(
    entered: SideTotals,
    remaining: SideTotals,
    bets: &[Bet],
    changes: &BidChanges,
) -> Result<()> {
    let violation = |reason: String| Err(SpreadbookError::ConservationViolation { reason });

    if let Some(bet) = bets.iter().find(|b| b.amount == 0) {
        return violation(format!("zero-amount bet {bet}"));
    }
    if let Some(bid) = changes
        .updates
        .iter()
        .chain(changes.inserts.iter())
        .find(|b| b.is_exhausted())
    {
        return violation(format!("zero-amount bid written back: {bid}"));
    }

    let matched: Amount = bets.iter().map(|b| b.amount).sum();
    for side in [Side::Away, Side::Home] {
        let Some(removed) = entered.get(side).checked_sub(remaining.get(side)) else {
            return violation(format!(
                "{side} grew during matching: entered {} remaining {}",
                entered.get(side),
                remaining.get(side)
            ));
        };
        if removed != matched {
            return violation(format!(
                "{side} removed {removed} but bets total {matched}"
            ));
        }
    }
    Ok(())
}
