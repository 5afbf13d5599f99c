//! One side of an event's bid pool.
//!
//! Bids backing the same competitor are kept in time priority: earliest
//! submission first, ties broken by user and then by insertion order so the
//! walk is deterministic for identical timestamps.

use spreadbook_types::{Amount, Bid, BidKey, Side};

/// A bid plus the insertion sequence used as the final tie-breaker.
#[derive(Debug, Clone)]
pub struct QueuedBid {
    pub bid: Bid,
    pub seq: u64,
}

impl QueuedBid {
    fn priority_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bid
            .created_at
            .cmp(&other.bid.created_at)
            .then_with(|| self.bid.user.cmp(&other.bid.user))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// All resting bids on one competitor, front = highest priority.
#[derive(Debug, Clone)]
pub struct SideQueue {
    pub side: Side,
    entries: Vec<QueuedBid>,
}

impl SideQueue {
    /// Create an empty queue for `side`.
    #[must_use]
    pub fn new(side: Side) -> Self {
        Self {
            side,
            entries: Vec::new(),
        }
    }

    /// Insert at its priority position. Entries that compare equal keep
    /// insertion order.
    pub fn insert(&mut self, bid: Bid, seq: u64) {
        let entry = QueuedBid { bid, seq };
        let pos = self
            .entries
            .partition_point(|e| e.priority_cmp(&entry) != std::cmp::Ordering::Greater);
        self.entries.insert(pos, entry);
    }

    /// Find a resting bid by identity.
    pub fn get_mut(&mut self, key: &BidKey) -> Option<&mut Bid> {
        self.entries
            .iter_mut()
            .map(|e| &mut e.bid)
            .find(|b| b.user == key.user && b.created_at.timestamp_millis() == key.created_ms)
    }

    /// Bids in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Bid> {
        self.entries.iter().map(|e| &e.bid)
    }

    /// Bids in priority order, mutable.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Bid> {
        self.entries.iter_mut().map(|e| &mut e.bid)
    }

    /// Highest-priority bid.
    #[must_use]
    pub fn front(&self) -> Option<&Bid> {
        self.entries.first().map(|e| &e.bid)
    }

    /// Drop bids whose amount reached zero.
    pub fn prune(&mut self) {
        self.entries.retain(|e| !e.bid.is_exhausted());
    }

    /// Total unmatched stake on this side.
    #[must_use]
    pub fn total(&self) -> Amount {
        self.entries.iter().map(|e| e.bid.amount).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use spreadbook_types::{Bid, Side};

    use super::*;

    #[test]
    fn orders_by_submission_time() {
        let mut q = SideQueue::new(Side::Home);
        q.insert(Bid::dummy("late", Side::Home, 10, 3_000), 0);
        q.insert(Bid::dummy("early", Side::Home, 10, 1_000), 1);
        q.insert(Bid::dummy("mid", Side::Home, 10, 2_000), 2);
        let users: Vec<_> = q.iter().map(|b| b.user.as_str().to_string()).collect();
        assert_eq!(users, ["early", "mid", "late"]);
    }

    #[test]
    fn ties_break_on_user_then_insertion() {
        let mut q = SideQueue::new(Side::Away);
        q.insert(Bid::dummy("zed", Side::Away, 1, 1_000), 0);
        q.insert(Bid::dummy("amy", Side::Away, 2, 1_000), 1);
        q.insert(Bid::dummy("amy", Side::Away, 3, 1_000), 2);
        let amounts: Vec<_> = q.iter().map(|b| (b.user.as_str().to_string(), b.amount)).collect();
        assert_eq!(
            amounts,
            [("amy".to_string(), 2), ("amy".to_string(), 3), ("zed".to_string(), 1)]
        );
    }

    #[test]
    fn total_and_prune() {
        let mut q = SideQueue::new(Side::Away);
        q.insert(Bid::dummy("a", Side::Away, 5, 1), 0);
        q.insert(Bid::dummy("b", Side::Away, 7, 2), 1);
        assert_eq!(q.total(), 12);
        q.iter_mut().next().unwrap().amount = 0;
        q.prune();
        assert_eq!(q.len(), 1);
        assert_eq!(q.front().unwrap().user.as_str(), "b");
    }

    #[test]
    fn lookup_by_key() {
        let mut q = SideQueue::new(Side::Home);
        let bid = Bid::dummy("a", Side::Home, 5, 42);
        let key = bid.key();
        q.insert(bid, 0);
        q.get_mut(&key).unwrap().amount = 1;
        assert_eq!(q.total(), 1);
    }

    #[test]
    fn empty_queue() {
        let q = SideQueue::new(Side::Home);
        assert!(q.is_empty());
        assert_eq!(q.total(), 0);
        assert!(q.front().is_none());
    }
}
