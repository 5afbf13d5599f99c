//! System-wide constants for the Spreadbook exchange.

/// Smallest stake a single bid may carry.
pub const DEFAULT_MIN_BID_AMOUNT: u64 = 1;

/// Largest stake a single bid may carry.
pub const DEFAULT_MAX_BID_AMOUNT: u64 = 100;

/// Maximum bids accepted in one submission.
pub const DEFAULT_MAX_BIDS_PER_SUBMISSION: usize = 50;

/// Maximum operations per store batch write request.
pub const BATCH_WRITE_LIMIT: usize = 25;

/// Default page size returned by one store query call.
pub const DEFAULT_QUERY_PAGE_SIZE: usize = 100;

/// Default lease time-to-live in milliseconds.
pub const DEFAULT_LEASE_TTL_MS: u64 = 60_000;

/// Default backoff between lease acquisition attempts in milliseconds.
pub const DEFAULT_LEASE_RETRY_BACKOFF_MS: u64 = 2_000;

/// Default maximum time spent waiting for a lease in milliseconds.
pub const DEFAULT_LEASE_MAX_WAIT_MS: u64 = 30_000;

/// Renew the lease before persisting if fewer than this many milliseconds remain.
pub const LEASE_RENEW_THRESHOLD_MS: u64 = 5_000;

/// Hours subtracted from "now" to pick the settlement date.
pub const DEFAULT_RESOLVE_LAG_HOURS: i64 = 5;

/// Default results feed call timeout in milliseconds.
pub const DEFAULT_FEED_TIMEOUT_MS: u64 = 10_000;

/// Default overall settlement run timeout in milliseconds.
pub const DEFAULT_SETTLEMENT_TIMEOUT_MS: u64 = 120_000;

/// Settlement cycles a bet may be deferred before it is voided.
pub const DEFAULT_MAX_DEFERRALS: u32 = 3;

/// Extra attempts made for failed batch-write chunks.
pub const DEFAULT_WRITE_RETRY_ATTEMPTS: u32 = 2;

/// Backoff between batch-write retry rounds in milliseconds.
pub const WRITE_RETRY_BACKOFF_MS: u64 = 200;

/// Bet and bid records expire this many days after the event.
pub const RECORD_TTL_DAYS: i64 = 1;

/// Delimiter reserved by the persistence key codec.
pub const KEY_DELIMITER: char = '|';

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Spreadbook";
