//! Identifiers used throughout Spreadbook.
//!
//! Users, divisions and kinds are opaque strings supplied by the outside
//! world (identity claim, league name, sport code). Bet ids are minted when a
//! match creates the bet; outcome ids are derived deterministically from the
//! bet id so settlement can be replayed safely.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stake amount in a currency-agnostic unit. Always positive once persisted.
pub type Amount = u64;

/// Signed ledger amount (positive = credit, negative = debit).
pub type SignedAmount = i64;

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// Opaque identity of a participant, taken from the caller's bearer claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// DivisionId
// ---------------------------------------------------------------------------

/// A division (league) grouping users that share a ledger scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DivisionId(pub String);

impl DivisionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DivisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Competition category (e.g. `NFL`, `CFB`) used to group events for the feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(pub String);

impl Kind {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// BetId
// ---------------------------------------------------------------------------

/// Unique identifier of a matched bet (UUID v7, time-ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BetId(pub Uuid);

impl BetId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::SpreadbookError::RecordDecode {
                reason: format!("bad bet id '{s}': {e}"),
            })
    }
}

impl Default for BetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// OutcomeId
// ---------------------------------------------------------------------------

/// Identifier of a settlement outcome.
///
/// Derived from the feed event id, the winner, the loser and the bet id,
/// so re-running settlement for the same date yields the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OutcomeId(pub Uuid);

impl OutcomeId {
    /// Deterministic `OutcomeId` for one resolved bet.
    #[must_use]
    pub fn derive(event_id: &str, winner: &str, loser: &str, bet_id: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(b"spreadbook:outcome_id:v1:");
        for part in [event_id, winner, loser, bet_id] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse the hyphenated string form used at the persistence boundary.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::SpreadbookError::RecordDecode {
                reason: format!("bad outcome id '{s}': {e}"),
            })
    }
}

impl fmt::Display for OutcomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
