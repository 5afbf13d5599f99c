//! In-memory view of one event's bid pool.
//!
//! The book is loaded from the bid store while the event's lease is held,
//! mutated by matching, and then diffed against what was loaded so only the
//! bids that actually changed are written back.

use std::collections::HashMap;

use spreadbook_types::{Amount, Bid, BidKey, EventKey, Result, Side, SpreadbookError};

use crate::queue::SideQueue;

/// Net bid changes a matching pass must persist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BidChanges {
    /// Loaded bids fully consumed.
    pub deletes: Vec<BidKey>,
    /// Loaded bids partially consumed (new amount).
    pub updates: Vec<Bid>,
    /// New resting bids.
    pub inserts: Vec<Bid>,
}

impl BidChanges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.inserts.is_empty()
    }

    /// Number of store operations these changes translate to.
    #[must_use]
    pub fn op_count(&self) -> usize {
        self.deletes.len() + self.updates.len() + self.inserts.len()
    }
}

/// Both sides of one event's pool.
#[derive(Debug, Clone)]
pub struct EventBook {
    pub event: EventKey,
    away: SideQueue,
    home: SideQueue,
    /// Amounts as loaded, keyed by bid identity.
    loaded: HashMap<BidKey, Amount>,
    next_seq: u64,
}

impl EventBook {
    /// Create an empty book.
    #[must_use]
    pub fn new(event: EventKey) -> Self {
        Self {
            event,
            away: SideQueue::new(Side::Away),
            home: SideQueue::new(Side::Home),
            loaded: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Build the book from the persisted bids of `event`.
    ///
    /// # Errors
    /// [`SpreadbookError::EventMismatch`] if any bid belongs to another event.
    pub fn load(event: EventKey, bids: Vec<Bid>) -> Result<Self> {
        let mut book = Self::new(event);
        for bid in bids {
            book.check_event(&bid)?;
            if bid.is_exhausted() {
                continue;
            }
            book.loaded.insert(bid.key(), bid.amount);
            book.push(bid);
        }
        Ok(book)
    }

    /// Add a resting bid. A bid with the same identity as one already in the
    /// book is folded into it.
    ///
    /// # Errors
    /// [`SpreadbookError::EventMismatch`] if the bid is for another event.
    pub fn rest(&mut self, bid: Bid) -> Result<()> {
        self.check_event(&bid)?;
        if bid.is_exhausted() {
            return Ok(());
        }
        let key = bid.key();
        if let Some(existing) = self.queue_mut(bid.chosen).get_mut(&key) {
            existing.amount += bid.amount;
            return Ok(());
        }
        self.push(bid);
        Ok(())
    }

    fn push(&mut self, bid: Bid) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue_mut(bid.chosen).insert(bid, seq);
    }

    pub(crate) fn check_event(&self, bid: &Bid) -> Result<()> {
        if bid.event == self.event {
            Ok(())
        } else {
            Err(SpreadbookError::EventMismatch {
                expected: self.event.to_string(),
                actual: bid.event.to_string(),
            })
        }
    }

    #[must_use]
    pub fn queue(&self, side: Side) -> &SideQueue {
        match side {
            Side::Away => &self.away,
            Side::Home => &self.home,
        }
    }

    pub fn queue_mut(&mut self, side: Side) -> &mut SideQueue {
        match side {
            Side::Away => &mut self.away,
            Side::Home => &mut self.home,
        }
    }

    /// Both queues at once, `(away, home)`.
    pub fn queues_mut(&mut self) -> (&mut SideQueue, &mut SideQueue) {
        (&mut self.away, &mut self.home)
    }

    /// Unmatched stake on `side`.
    #[must_use]
    pub fn total(&self, side: Side) -> Amount {
        self.queue(side).total()
    }

    /// Number of resting bids across both sides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.away.len() + self.home.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.away.is_empty() && self.home.is_empty()
    }

    /// Compare the current book against what was loaded.
    #[must_use]
    pub fn changes(&self) -> BidChanges {
        let mut changes = BidChanges::default();
        let mut current: HashMap<BidKey, &Bid> = HashMap::new();
        for bid in self.away.iter().chain(self.home.iter()) {
            if !bid.is_exhausted() {
                current.insert(bid.key(), bid);
            }
        }

        for bid in self.away.iter().chain(self.home.iter()) {
            if bid.is_exhausted() {
                continue;
            }
            match self.loaded.get(&bid.key()) {
                Some(&amount) if amount == bid.amount => {}
                Some(_) => changes.updates.push(bid.clone()),
                None => changes.inserts.push(bid.clone()),
            }
        }

        let mut deletes: Vec<BidKey> = self
            .loaded
            .keys()
            .filter(|k| !current.contains_key(*k))
            .cloned()
            .collect();
        deletes.sort();
        changes.deletes = deletes;
        changes
    }
}
