//! Market-close matching: cross an entire event pool at once.
//!
//! Used when bids only rest during the open market and the pool is crossed
//! when the event starts. The away queue is walked in priority order and
//! each away bid fills against the home queue in priority order, with the
//! same self-match rule and bet merging as incoming matching.

use chrono::{DateTime, Utc};
use spreadbook_types::{Amount, Result, Side};

use crate::book::EventBook;
use crate::matcher::{MatchPass, MatchPlan, fill_against};

impl MatchPass {
    /// Cross every resting away bid against the home side. Returns the
    /// stake matched.
    pub fn cross_pool(&mut self) -> Amount {
        let mut fills = Vec::new();
        {
            let (away, home) = self.book.queues_mut();
            for taker in away.iter_mut() {
                let mut remaining = taker.amount;
                for (maker, amount) in fill_against(home, &taker.user, &mut remaining) {
                    fills.push((taker.user.clone(), maker, amount, taker.terms.clone()));
                }
                taker.amount = remaining;
            }
            away.prune();
            home.prune();
        }

        let mut matched = 0;
        for (taker, maker, amount, terms) in fills {
            self.record(Side::Away, &taker, &maker, amount, &terms);
            matched += amount;
        }
        matched
    }
}

/// Cross the whole pool of one event.
///
/// # Errors
/// See [`MatchPass::finish`].
pub fn match_event_pool(book: EventBook, now: DateTime<Utc>) -> Result<MatchPlan> {
    let mut pass = MatchPass::new(book, now);
    pass.cross_pool();
    pass.finish()
}

#[cfg(test)]
mod tests {
    use spreadbook_types::{Bid, EventKey};

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn pool(bids: Vec<Bid>) -> EventBook {
        EventBook::load(EventKey::dummy(), bids).unwrap()
    }

    #[test]
    fn crosses_both_queues_in_priority_order() {
        let book = pool(vec![
            Bid::dummy("a1", Side::Away, 30, 1),
            Bid::dummy("a2", Side::Away, 30, 2),
            Bid::dummy("h1", Side::Home, 40, 3),
            Bid::dummy("h2", Side::Home, 40, 4),
        ]);
        let plan = match_event_pool(book, now()).unwrap();
        let bets: Vec<_> = plan
            .bets
            .iter()
            .map(|b| (b.away_user.as_str(), b.home_user.as_str(), b.amount))
            .collect();
        assert_eq!(bets, [("a1", "h1", 30), ("a2", "h1", 10), ("a2", "h2", 20)]);
        assert_eq!(plan.matched, 60);
        // Every away bid and h1 consumed, h2 left with 20.
        assert_eq!(plan.changes.deletes.len(), 3);
        assert_eq!(plan.changes.updates.len(), 1);
        assert_eq!(plan.changes.updates[0].amount, 20);
        assert!(plan.changes.inserts.is_empty());
    }

    #[test]
    fn skips_self_and_returns_to_skipped_bid() {
        let book = pool(vec![
            Bid::dummy("x", Side::Away, 10, 1),
            Bid::dummy("y", Side::Away, 10, 2),
            Bid::dummy("x", Side::Home, 10, 3),
            Bid::dummy("z", Side::Home, 10, 4),
        ]);
        let plan = match_event_pool(book, now()).unwrap();
        let bets: Vec<_> = plan
            .bets
            .iter()
            .map(|b| (b.away_user.as_str(), b.home_user.as_str(), b.amount))
            .collect();
        assert_eq!(bets, [("x", "z", 10), ("y", "x", 10)]);
        assert_eq!(plan.changes.deletes.len(), 4);
    }

    #[test]
    fn merges_repeated_pairs() {
        let book = pool(vec![
            Bid::dummy("a", Side::Away, 10, 1),
            Bid::dummy("a", Side::Away, 10, 2),
            Bid::dummy("h", Side::Home, 25, 3),
        ]);
        let plan = match_event_pool(book, now()).unwrap();
        assert_eq!(plan.bets.len(), 1);
        assert_eq!(plan.bets[0].amount, 20);
        assert_eq!(plan.changes.updates[0].amount, 5);
    }

    #[test]
    fn one_sided_pool_is_untouched() {
        let book = pool(vec![Bid::dummy("a", Side::Away, 10, 1)]);
        let plan = match_event_pool(book, now()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.matched, 0);
    }
}
