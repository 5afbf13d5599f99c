//! Configuration types for a Spreadbook deployment.
//!
//! Every section is `#[serde(default)]`, so a config file only needs the
//! values it overrides:
//!
//! ```json
//! { "lease": { "max_wait_ms": 5000 }, "bidding": { "matching_mode": "at_market_close" } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{constants, Result, SpreadbookError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadbookConfig {
    pub store: StoreConfig,
    pub lease: LeaseConfig,
    pub bidding: BiddingConfig,
    pub settlement: SettlementConfig,
}

impl SpreadbookConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| SpreadbookError::Configuration(format!("parse: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SpreadbookError::Configuration(format!("read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Reject values the services cannot run with.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(SpreadbookError::Configuration(msg));

        if self.store.batch_write_limit == 0
            || self.store.batch_write_limit > constants::BATCH_WRITE_LIMIT
        {
            return bad(format!(
                "store.batch_write_limit must be in 1..={}",
                constants::BATCH_WRITE_LIMIT
            ));
        }
        if self.store.query_page_size == 0 {
            return bad("store.query_page_size must be positive".into());
        }
        if self.lease.ttl_ms == 0 {
            return bad("lease.ttl_ms must be positive".into());
        }
        if self.lease.retry_backoff_ms == 0 {
            return bad("lease.retry_backoff_ms must be positive".into());
        }
        if self.bidding.min_amount == 0 || self.bidding.min_amount > self.bidding.max_amount {
            return bad(format!(
                "bidding amount window [{}, {}] is empty or includes zero",
                self.bidding.min_amount, self.bidding.max_amount
            ));
        }
        if self.bidding.max_bids_per_submission == 0 {
            return bad("bidding.max_bids_per_submission must be positive".into());
        }
        if self.settlement.resolve_lag_hours < 0 {
            return bad("settlement.resolve_lag_hours must not be negative".into());
        }
        if self.settlement.feed_timeout_ms == 0 || self.settlement.run_timeout_ms == 0 {
            return bad("settlement timeouts must be positive".into());
        }
        Ok(())
    }
}

/// Keyed-store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub batch_write_limit: usize,
    /// Most records a single query page returns.
    pub query_page_size: usize,
    /// Extra rounds for batch chunks that failed.
    pub write_retry_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            batch_write_limit: constants::BATCH_WRITE_LIMIT,
            query_page_size: constants::DEFAULT_QUERY_PAGE_SIZE,
            write_retry_attempts: constants::DEFAULT_WRITE_RETRY_ATTEMPTS,
        }
    }
}

/// Event-pool lease settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    pub ttl_ms: u64,
    pub retry_backoff_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_ms: constants::DEFAULT_LEASE_TTL_MS,
            retry_backoff_ms: constants::DEFAULT_LEASE_RETRY_BACKOFF_MS,
            max_wait_ms: constants::DEFAULT_LEASE_MAX_WAIT_MS,
        }
    }
}

/// When submitted bids are crossed against the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingMode {
    /// Match each bid as it arrives.
    #[default]
    Immediate,
    /// Rest bids and cross the whole pool once when the event starts.
    AtMarketClose,
}

/// Bid intake settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiddingConfig {
    pub min_amount: u64,
    pub max_amount: u64,
    pub max_bids_per_submission: usize,
    pub reject_started_events: bool,
    pub matching_mode: MatchingMode,
}

impl Default for BiddingConfig {
    fn default() -> Self {
        Self {
            min_amount: constants::DEFAULT_MIN_BID_AMOUNT,
            max_amount: constants::DEFAULT_MAX_BID_AMOUNT,
            max_bids_per_submission: constants::DEFAULT_MAX_BIDS_PER_SUBMISSION,
            reject_started_events: true,
            matching_mode: MatchingMode::Immediate,
        }
    }
}

/// Where a kind's results live in the feed's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPath {
    pub sport: String,
    pub league: String,
}

impl FeedPath {
    #[must_use]
    pub fn new(sport: impl Into<String>, league: impl Into<String>) -> Self {
        Self {
            sport: sport.into(),
            league: league.into(),
        }
    }
}

/// Settlement cycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    pub resolve_lag_hours: i64,
    pub feed_timeout_ms: u64,
    pub run_timeout_ms: u64,
    pub max_deferrals: u32,
    /// Kind code to feed path, consulted before the built-in mapping.
    pub kind_overrides: BTreeMap<String, FeedPath>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            resolve_lag_hours: constants::DEFAULT_RESOLVE_LAG_HOURS,
            feed_timeout_ms: constants::DEFAULT_FEED_TIMEOUT_MS,
            run_timeout_ms: constants::DEFAULT_SETTLEMENT_TIMEOUT_MS,
            max_deferrals: constants::DEFAULT_MAX_DEFERRALS,
            kind_overrides: BTreeMap::new(),
        }
    }
}
