//! Named mutual-exclusion leases with expiry.
//!
//! All mutation of one event's bid pool happens while the caller holds that
//! event's lease. A lease that is not released (crashed holder) becomes
//! free once it expires. Each acquisition carries a fresh token, and
//! renewal is conditional on the token still being the stored one.
//!
//! ```text
//! acquire(key) ──(conflict)──> sleep(backoff) ──> retry ... ──> LeaseTimeout
//!      │
//!      └──> Lease { token, expires_at } ──> renew()* ──> release()
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use spreadbook_types::{Clock, LeaseConfig, Result, SpreadbookError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::OpContext;
use crate::keys;
use crate::store::{Condition, KeyedStore, Record, UpdateAction};

const EXPIRES_ATTR: &str = "expiresMs";
const TOKEN_ATTR: &str = "token";

/// A held lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub key: String,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Time left at `now`; zero once expired.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[async_trait]
pub trait LeaseCoordinator: Send + Sync {
    fn config(&self) -> &LeaseConfig;

    fn clock(&self) -> &dyn Clock;

    /// One attempt. `Ok(None)` means someone else holds an unexpired lease.
    async fn try_acquire(&self, key: &str) -> Result<Option<Lease>>;

    /// Extend the lease.
    ///
    /// # Errors
    /// [`SpreadbookError::LeaseLost`] if another holder took the key.
    async fn renew(&self, lease: &Lease) -> Result<Lease>;

    /// Give the key back. A no-op once another holder has taken it over.
    async fn release(&self, lease: Lease) -> Result<()>;

    /// Retry [`LeaseCoordinator::try_acquire`] every `retry_backoff_ms`
    /// until it succeeds, `max_wait_ms` elapses, or `ctx` ends.
    async fn acquire(&self, ctx: &OpContext, key: &str) -> Result<Lease> {
        let cfg = self.config().clone();
        let started = tokio::time::Instant::now();
        let max_wait = Duration::from_millis(cfg.max_wait_ms);
        let backoff = Duration::from_millis(cfg.retry_backoff_ms);
        let mut attempts = 0u32;
        loop {
            ctx.check()?;
            attempts += 1;
            if let Some(lease) = ctx.run(self.try_acquire(key)).await? {
                debug!(key, attempts, "lease acquired");
                return Ok(lease);
            }
            let waited = started.elapsed();
            if waited >= max_wait {
                let waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
                warn!(key, attempts, waited_ms, "lease wait exhausted");
                return Err(SpreadbookError::LeaseTimeout {
                    key: key.to_string(),
                    waited_ms,
                });
            }
            debug!(key, attempts, "lease contended, backing off");
            ctx.sleep(backoff.min(max_wait - waited)).await?;
        }
    }

    /// Renew if fewer than `threshold` remains, otherwise return the lease
    /// unchanged.
    async fn ensure_fresh(&self, lease: Lease, threshold: Duration) -> Result<Lease> {
        if lease.remaining(self.clock().now()) > threshold {
            return Ok(lease);
        }
        self.renew(&lease).await
    }
}

fn expiry(clock: &dyn Clock, ttl_ms: u64) -> DateTime<Utc> {
    clock.now() + chrono::Duration::milliseconds(i64::try_from(ttl_ms).unwrap_or(i64::MAX))
}

// ---------------------------------------------------------------------------
// Store-backed coordinator
// ---------------------------------------------------------------------------

/// Leases stored as `LOCK / <key>` records, acquired with an
/// absent-or-expired conditional put.
pub struct StoreLeaseCoordinator {
    store: Arc<dyn KeyedStore>,
    clock: Arc<dyn Clock>,
    config: LeaseConfig,
}

impl StoreLeaseCoordinator {
    #[must_use]
    pub fn new(store: Arc<dyn KeyedStore>, clock: Arc<dyn Clock>, config: LeaseConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }
}

#[async_trait]
impl LeaseCoordinator for StoreLeaseCoordinator {
    fn config(&self) -> &LeaseConfig {
        &self.config
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    async fn try_acquire(&self, key: &str) -> Result<Option<Lease>> {
        let now = self.clock.now();
        let lease = Lease {
            key: key.to_string(),
            token: Uuid::now_v7(),
            expires_at: expiry(self.clock.as_ref(), self.config.ttl_ms),
        };
        let record = Record::new(keys::lease_key(key))
            .with(TOKEN_ATTR, lease.token.to_string())
            .with(EXPIRES_ATTR, lease.expires_at.timestamp_millis())
            .with("ttl", lease.expires_at.timestamp());
        let condition = Condition::AbsentOrExpired {
            attr: EXPIRES_ATTR.to_string(),
            now: now.timestamp_millis(),
        };
        match self.store.put(record, condition).await {
            Ok(()) => Ok(Some(lease)),
            Err(SpreadbookError::ConditionFailed { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn renew(&self, lease: &Lease) -> Result<Lease> {
        let expires_at = expiry(self.clock.as_ref(), self.config.ttl_ms);
        let actions = vec![
            UpdateAction::Set(EXPIRES_ATTR.into(), Value::from(expires_at.timestamp_millis())),
            UpdateAction::Set("ttl".into(), Value::from(expires_at.timestamp())),
        ];
        let condition = Condition::AttrEquals {
            attr: TOKEN_ATTR.into(),
            value: Value::from(lease.token.to_string()),
        };
        match self
            .store
            .update(&keys::lease_key(&lease.key), actions, condition)
            .await
        {
            Ok(_) => {
                debug!(key = %lease.key, "lease renewed");
                Ok(Lease {
                    expires_at,
                    ..lease.clone()
                })
            }
            Err(SpreadbookError::ConditionFailed { .. }) => {
                warn!(key = %lease.key, "lease lost before renewal");
                Err(SpreadbookError::LeaseLost {
                    key: lease.key.clone(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn release(&self, lease: Lease) -> Result<()> {
        let condition = Condition::AttrEquals {
            attr: TOKEN_ATTR.into(),
            value: Value::from(lease.token.to_string()),
        };
        match self.store.delete(&keys::lease_key(&lease.key), condition).await {
            Ok(()) => debug!(key = %lease.key, "lease released"),
            Err(SpreadbookError::ConditionFailed { .. }) => {
                debug!(key = %lease.key, "lease already taken over, nothing to release");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory coordinator
// ---------------------------------------------------------------------------

/// Process-local leases; same semantics as the store-backed coordinator.
pub struct InMemoryLeaseCoordinator {
    held: Mutex<HashMap<String, (Uuid, DateTime<Utc>)>>,
    clock: Arc<dyn Clock>,
    config: LeaseConfig,
}

impl InMemoryLeaseCoordinator {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, config: LeaseConfig) -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            clock,
            config,
        }
    }

    fn held(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (Uuid, DateTime<Utc>)>>> {
        self.held
            .lock()
            .map_err(|_| SpreadbookError::Internal("lease table mutex poisoned".into()))
    }
}

#[async_trait]
impl LeaseCoordinator for InMemoryLeaseCoordinator {
    fn config(&self) -> &LeaseConfig {
        &self.config
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    async fn try_acquire(&self, key: &str) -> Result<Option<Lease>> {
        let now = self.clock.now();
        let mut held = self.held()?;
        if held.get(key).is_some_and(|(_, exp)| *exp > now) {
            return Ok(None);
        }
        let lease = Lease {
            key: key.to_string(),
            token: Uuid::now_v7(),
            expires_at: expiry(self.clock.as_ref(), self.config.ttl_ms),
        };
        held.insert(key.to_string(), (lease.token, lease.expires_at));
        Ok(Some(lease))
    }

    async fn renew(&self, lease: &Lease) -> Result<Lease> {
        let mut held = self.held()?;
        match held.get_mut(&lease.key) {
            Some((token, exp)) if *token == lease.token => {
                *exp = expiry(self.clock.as_ref(), self.config.ttl_ms);
                Ok(Lease {
                    expires_at: *exp,
                    ..lease.clone()
                })
            }
            _ => Err(SpreadbookError::LeaseLost {
                key: lease.key.clone(),
            }),
        }
    }

    async fn release(&self, lease: Lease) -> Result<()> {
        let mut held = self.held()?;
        if held.get(&lease.key).is_some_and(|(token, _)| *token == lease.token) {
            held.remove(&lease.key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use spreadbook_types::ManualClock;

    use super::*;
    use crate::memory::InMemoryStore;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::at(
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        ))
    }

    fn config(max_wait_ms: u64) -> LeaseConfig {
        LeaseConfig {
            ttl_ms: 60_000,
            retry_backoff_ms: 100,
            max_wait_ms,
        }
    }

    fn coordinators(clock: Arc<ManualClock>, max_wait_ms: u64) -> Vec<Box<dyn LeaseCoordinator>> {
        vec![
            Box::new(StoreLeaseCoordinator::new(
                Arc::new(InMemoryStore::new()),
                clock.clone(),
                config(max_wait_ms),
            )),
            Box::new(InMemoryLeaseCoordinator::new(clock, config(max_wait_ms))),
        ]
    }

    #[tokio::test]
    async fn second_holder_is_refused_until_release() {
        for coord in coordinators(clock(), 1_000) {
            let lease = coord.try_acquire("k").await.unwrap().unwrap();
            assert!(coord.try_acquire("k").await.unwrap().is_none());
            assert!(coord.try_acquire("other").await.unwrap().is_some());
            coord.release(lease).await.unwrap();
            assert!(coord.try_acquire("k").await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let clock = clock();
        for coord in coordinators(clock.clone(), 1_000) {
            let first = coord.try_acquire("k").await.unwrap().unwrap();
            clock.advance(chrono::Duration::seconds(61));
            let second = coord.try_acquire("k").await.unwrap().unwrap();
            assert_ne!(first.token, second.token);
            let err = coord.renew(&first).await.unwrap_err();
            assert!(matches!(err, SpreadbookError::LeaseLost { .. }));
            coord.renew(&second).await.unwrap();
        }
    }

    #[tokio::test]
    async fn stale_release_leaves_successor_lease() {
        let clock = clock();
        for coord in coordinators(clock.clone(), 1_000) {
            let first = coord.try_acquire("k").await.unwrap().unwrap();
            clock.advance(chrono::Duration::seconds(61));
            let second = coord.try_acquire("k").await.unwrap().unwrap();
            coord.release(first).await.unwrap();
            assert!(coord.try_acquire("k").await.unwrap().is_none(), "successor still holds k");
            coord.renew(&second).await.unwrap();
            coord.release(second).await.unwrap();
            assert!(coord.try_acquire("k").await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn renew_extends_expiry() {
        let clock = clock();
        for coord in coordinators(clock.clone(), 1_000) {
            let lease = coord.try_acquire("k").await.unwrap().unwrap();
            clock.advance(chrono::Duration::seconds(30));
            let renewed = coord.renew(&lease).await.unwrap();
            assert!(renewed.expires_at > lease.expires_at);
            assert_eq!(renewed.token, lease.token);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn contention_times_out() {
        for coord in coordinators(clock(), 500) {
            let ctx = OpContext::background();
            let _held = coord.try_acquire("k").await.unwrap().unwrap();
            let err = coord.acquire(&ctx, "k").await.unwrap_err();
            match err {
                SpreadbookError::LeaseTimeout { key, waited_ms } => {
                    assert_eq!(key, "k");
                    assert!(waited_ms >= 500);
                }
                other => panic!("expected LeaseTimeout, got {other}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_stops_on_deadline() {
        for coord in coordinators(clock(), 60_000) {
            let _held = coord.try_acquire("k").await.unwrap().unwrap();
            let ctx = OpContext::with_timeout(Duration::from_millis(250));
            let err = coord.acquire(&ctx, "k").await.unwrap_err();
            assert!(matches!(err, SpreadbookError::DeadlineExceeded), "{err}");
        }
    }

    #[tokio::test]
    async fn acquire_succeeds_after_release() {
        let coord = Arc::new(InMemoryLeaseCoordinator::new(clock(), config(5_000)));
        let held = coord.try_acquire("k").await.unwrap().unwrap();
        let waiter = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move { coord.acquire(&OpContext::background(), "k").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        coord.release(held).await.unwrap();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn ensure_fresh_only_renews_near_expiry() {
        let clock = clock();
        let coord = InMemoryLeaseCoordinator::new(clock.clone(), config(1_000));
        let lease = coord.try_acquire("k").await.unwrap().unwrap();
        let same = coord
            .ensure_fresh(lease.clone(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(same, lease);
        clock.advance(chrono::Duration::seconds(58));
        let renewed = coord
            .ensure_fresh(lease.clone(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(renewed.expires_at > lease.expires_at);
    }
}
