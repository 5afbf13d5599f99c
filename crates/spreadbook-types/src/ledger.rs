//! Ledger types: signed per-(league, user) balance movements.

use serde::{Deserialize, Serialize};

use crate::{DivisionId, SignedAmount, UserId};

/// Scope of one running balance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LedgerKey {
    pub league: DivisionId,
    pub user: UserId,
}

/// A signed amount to add to one balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
    pub key: LedgerKey,
    pub amount: SignedAmount,
}

impl LedgerDelta {
    #[must_use]
    pub fn new(league: DivisionId, user: UserId, amount: SignedAmount) -> Self {
        Self {
            key: LedgerKey { league, user },
            amount,
        }
    }
}

impl std::fmt::Display for LedgerDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} {:+}", self.key.league, self.key.user, self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shows_sign() {
        let d = LedgerDelta::new(DivisionId::new("office"), UserId::new("sam"), -5);
        assert_eq!(d.to_string(), "office/sam -5");
        let d = LedgerDelta::new(DivisionId::new("office"), UserId::new("sam"), 20);
        assert_eq!(d.to_string(), "office/sam +20");
    }
}
