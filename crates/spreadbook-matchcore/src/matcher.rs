//! Pure time-priority matcher for incoming bids.
//!
//! ```text
//! MatchPass::new(EventBook) -> match_incoming(Bid)* -> finish() -> MatchPlan
//! ```
//!
//! No I/O happens here. The caller loads the book while holding the event's
//! lease and persists the resulting [`MatchPlan`] before releasing it.
//!
//! ## Algorithm
//!
//! 1. Walk the opposing side in priority order.
//! 2. At each resting bid, fill `min(incoming remaining, resting amount)`.
//! 3. Fold the fill into the pass's bet for that (away user, home user) pair.
//! 4. Stop when the incoming bid is exhausted or the opposing side is.
//! 5. Any remainder rests in the book as a new bid.
//!
//! ## Self-Match Prevention
//!
//! A resting bid owned by the incoming bid's user is skipped; the walk
//! continues with the next resting bid.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use spreadbook_types::{
    Amount, Bet, BetPair, Bid, EventKey, EventTerms, Result, Side, UserId,
};
use tracing::debug;

use crate::book::{BidChanges, EventBook};
use crate::conservation::{SideTotals, verify_conservation};
use crate::queue::SideQueue;

/// Everything a matching pass wants persisted.
#[derive(Debug, Clone)]
pub struct MatchPlan {
    pub event: EventKey,
    /// New bets, one per (away user, home user) pair.
    pub bets: Vec<Bet>,
    /// Net bid deletes, updates and inserts.
    pub changes: BidChanges,
    /// Total stake matched (per side).
    pub matched: Amount,
}

impl MatchPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bets.is_empty() && self.changes.is_empty()
    }
}

/// Result of matching one incoming bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fill {
    pub matched: Amount,
    pub resting: Amount,
}

/// One matching pass over an event book.
#[derive(Debug)]
pub struct MatchPass {
    pub(crate) book: EventBook,
    now: DateTime<Utc>,
    entered: SideTotals,
    bets: Vec<Bet>,
    bet_index: HashMap<BetPair, usize>,
}

impl MatchPass {
    /// Start a pass. Bets created by the pass are stamped with `now`.
    #[must_use]
    pub fn new(book: EventBook, now: DateTime<Utc>) -> Self {
        let entered = SideTotals {
            away: book.total(Side::Away),
            home: book.total(Side::Home),
        };
        Self {
            book,
            now,
            entered,
            bets: Vec::new(),
            bet_index: HashMap::new(),
        }
    }

    #[must_use]
    pub fn book(&self) -> &EventBook {
        &self.book
    }

    /// Match `incoming` against the opposing side and rest any remainder.
    ///
    /// # Errors
    /// [`spreadbook_types::SpreadbookError::EventMismatch`] if the bid is for
    /// a different event than the book.
    pub fn match_incoming(&mut self, incoming: Bid) -> Result<Fill> {
        self.book.check_event(&incoming)?;
        self.entered.add(incoming.chosen, incoming.amount);

        let mut remaining = incoming.amount;
        let opposing = self.book.queue_mut(incoming.chosen.opposite());
        let fills = fill_against(opposing, &incoming.user, &mut remaining);
        opposing.prune();

        for (maker, amount) in fills {
            self.record(incoming.chosen, &incoming.user, &maker, amount, &incoming.terms);
        }

        let fill = Fill {
            matched: incoming.amount - remaining,
            resting: remaining,
        };
        if remaining > 0 {
            let mut rest = incoming;
            rest.amount = remaining;
            self.book.rest(rest)?;
        }
        Ok(fill)
    }

    /// Fold a fill into the pass's bets.
    pub(crate) fn record(
        &mut self,
        taker_side: Side,
        taker: &UserId,
        maker: &UserId,
        amount: Amount,
        terms: &EventTerms,
    ) {
        let pair = BetPair::from_sides(taker, taker_side, maker);
        if let Some(&idx) = self.bet_index.get(&pair) {
            self.bets[idx].amount += amount;
            return;
        }
        let bet = Bet::pending(
            self.book.event.clone(),
            terms.clone(),
            pair.away_user.clone(),
            pair.home_user.clone(),
            amount,
            self.now,
        );
        self.bet_index.insert(pair, self.bets.len());
        self.bets.push(bet);
    }

    /// Diff the book, verify conservation and hand back the plan.
    ///
    /// # Errors
    /// [`spreadbook_types::SpreadbookError::ConservationViolation`] if the
    /// pass lost or created stake.
    pub fn finish(self) -> Result<MatchPlan> {
        let changes = self.book.changes();
        let remaining = SideTotals {
            away: self.book.total(Side::Away),
            home: self.book.total(Side::Home),
        };
        verify_conservation(self.entered, remaining, &self.bets, &changes)?;

        let matched = self.bets.iter().map(|b| b.amount).sum();
        debug!(
            event = %self.book.event,
            bets = self.bets.len(),
            matched,
            deletes = changes.deletes.len(),
            updates = changes.updates.len(),
            inserts = changes.inserts.len(),
            "match pass finished"
        );
        Ok(MatchPlan {
            event: self.book.event,
            bets: self.bets,
            changes,
            matched,
        })
    }
}

/// Walk `opposing` in priority order filling up to `remaining`, skipping
/// bids owned by `taker`. Returns `(maker, amount)` per fill.
pub(crate) fn fill_against(
    opposing: &mut SideQueue,
    taker: &UserId,
    remaining: &mut Amount,
) -> Vec<(UserId, Amount)> {
    let mut fills = Vec::new();
    for maker in opposing.iter_mut() {
        if *remaining == 0 {
            break;
        }
        if maker.is_exhausted() || maker.user == *taker {
            continue;
        }
        let amount = (*remaining).min(maker.amount);
        maker.amount -= amount;
        *remaining -= amount;
        fills.push((maker.user.clone(), amount));
    }
    fills
}

/// Match a single incoming bid against `book` in one pass.
///
/// # Errors
/// See [`MatchPass::match_incoming`] and [`MatchPass::finish`].
pub fn match_incoming(book: EventBook, incoming: Bid, now: DateTime<Utc>) -> Result<MatchPlan> {
    let mut pass = MatchPass::new(book, now);
    pass.match_incoming(incoming)?;
    pass.finish()
}
