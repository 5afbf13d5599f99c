//! Market-close matching: cross each event's whole pool once at start time.
//!
//! Used with `MatchingMode::AtMarketClose`. Submission only rests bids and
//! registers a [`MarketCloseJob`]; when the job fires the handler takes each
//! event's lease, crosses the away queue against the home queue and
//! persists the resulting bets and bid changes. The scheduler rule is
//! removed once every event in the job went through.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spreadbook_matchcore::match_event_pool;
use spreadbook_store::{keys, KeyedStore, Lease, LeaseCoordinator, OpContext, WriteReport};
use spreadbook_types::{Bet, Clock, EventKey, Result, SpreadbookConfig};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::scheduler::Scheduler;
use crate::submission::{EventFailure, PoolAccess};

/// Payload of a market-close scheduler rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCloseJob {
    pub rule_name: String,
    pub events: Vec<EventKey>,
}

impl MarketCloseJob {
    /// Job closing a single event's market.
    #[must_use]
    pub fn for_event(event: &EventKey) -> Self {
        Self {
            rule_name: keys::market_close_rule(event),
            events: vec![event.clone()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MarketCloseReport {
    pub rule_name: String,
    pub bets: Vec<Bet>,
    pub writes: WriteReport,
    pub event_errors: Vec<EventFailure>,
    /// Whether the scheduler rule was removed.
    pub rule_removed: bool,
}

pub struct MarketCloseMatcher {
    pool: PoolAccess,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
}

impl MarketCloseMatcher {
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyedStore>,
        leases: Arc<dyn LeaseCoordinator>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
        config: &SpreadbookConfig,
    ) -> Self {
        Self {
            pool: PoolAccess::new(store, leases, config),
            scheduler,
            clock,
        }
    }

    /// Cross every event pool named by `job`.
    ///
    /// Event failures are reported and leave the rule in place so the job
    /// can run again.
    pub async fn handle(self: &Arc<Self>, ctx: &OpContext, job: MarketCloseJob) -> Result<MarketCloseReport> {
        let mut report = MarketCloseReport {
            rule_name: job.rule_name.clone(),
            ..MarketCloseReport::default()
        };

        let mut tasks = JoinSet::new();
        for event in job.events {
            let matcher = Arc::clone(self);
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let result = matcher.close_event(&ctx, &event).await;
                (event, result)
            });
        }

        let mut aborted = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok((bets, writes)))) => {
                    report.bets.extend(bets);
                    report.writes.absorb(writes);
                }
                Ok((event, Err(e))) => {
                    error!(event = %event, error = %e, "market close failed");
                    report.event_errors.push(EventFailure {
                        event: event.to_string(),
                        bids: Vec::new(),
                        code: e.code(),
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    error!(error = %e, "market close task aborted");
                    aborted += 1;
                }
            }
        }

        if report.event_errors.is_empty() && aborted == 0 && report.writes.is_complete() {
            self.scheduler.cancel(&job.rule_name).await?;
            report.rule_removed = true;
        } else {
            warn!(rule = %job.rule_name, "market close incomplete, rule kept");
        }

        info!(
            rule = %report.rule_name,
            bets = report.bets.len(),
            failed_events = report.event_errors.len(),
            "market close handled"
        );
        Ok(report)
    }

    async fn close_event(&self, ctx: &OpContext, event: &EventKey) -> Result<(Vec<Bet>, WriteReport)> {
        let lease = self.pool.acquire(ctx, event).await?;
        let result = self.close_locked(ctx, &lease, event).await;
        self.pool.release(lease).await;
        result
    }

    async fn close_locked(
        &self,
        ctx: &OpContext,
        lease: &Lease,
        event: &EventKey,
    ) -> Result<(Vec<Bet>, WriteReport)> {
        let book = self.pool.load(ctx, event).await?;
        let plan = match_event_pool(book, self.clock.now())?;
        if plan.is_empty() {
            return Ok((Vec::new(), WriteReport::default()));
        }
        let writes = self.pool.persist(ctx, lease, &plan).await?;
        info!(event = %event, bets = plan.bets.len(), matched = plan.matched, "pool crossed");
        Ok((plan.bets, writes))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use spreadbook_store::{BetStore, BidStore, InMemoryLeaseCoordinator, InMemoryStore};
    use spreadbook_types::{Bid, LeaseConfig, ManualClock, Side};

    use super::*;
    use crate::scheduler::{InMemoryScheduler, ScheduledJob};

    #[tokio::test]
    async fn crosses_pool_and_removes_rule() {
        let clock = Arc::new(ManualClock::at(
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let store = Arc::new(InMemoryStore::new());
        let leases = Arc::new(InMemoryLeaseCoordinator::new(clock.clone(), LeaseConfig::default()));
        let scheduler = Arc::new(InMemoryScheduler::new());
        let ctx = OpContext::background();

        let bids = BidStore::new(store.clone());
        bids.put(&ctx, &Bid::dummy("a1", Side::Away, 30, 1)).await.unwrap();
        bids.put(&ctx, &Bid::dummy("h1", Side::Home, 20, 2)).await.unwrap();
        bids.put(&ctx, &Bid::dummy("h2", Side::Home, 20, 3)).await.unwrap();

        let job = MarketCloseJob::for_event(&EventKey::dummy());
        scheduler
            .schedule(ScheduledJob {
                rule_name: job.rule_name.clone(),
                fire_at: clock.now(),
                payload: serde_json::to_value(&job).unwrap(),
            })
            .await
            .unwrap();

        let matcher = Arc::new(MarketCloseMatcher::new(
            store.clone(),
            leases,
            scheduler.clone(),
            clock,
            &SpreadbookConfig::default(),
        ));
        let report = matcher.handle(&ctx, job).await.unwrap();

        assert_eq!(report.bets.len(), 2);
        let total: u64 = report.bets.iter().map(|b| b.amount).sum();
        assert_eq!(total, 30);
        assert!(report.rule_removed);
        assert!(scheduler.jobs().unwrap().is_empty());

        let left = bids.by_event(&ctx, &EventKey::dummy()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].user.as_str(), "h2");
        assert_eq!(left[0].amount, 10);

        let stored = BetStore::new(store)
            .by_week(&ctx, &EventKey::dummy().division, 1)
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn empty_pool_is_a_noop() {
        let clock = Arc::new(ManualClock::at(DateTime::<Utc>::from_timestamp(0, 0).unwrap()));
        let store = Arc::new(InMemoryStore::new());
        let leases = Arc::new(InMemoryLeaseCoordinator::new(clock.clone(), LeaseConfig::default()));
        let matcher = Arc::new(MarketCloseMatcher::new(
            store.clone(),
            leases,
            Arc::new(InMemoryScheduler::new()),
            clock,
            &SpreadbookConfig::default(),
        ));
        let report = matcher
            .handle(&OpContext::background(), MarketCloseJob::for_event(&EventKey::dummy()))
            .await
            .unwrap();
        assert!(report.bets.is_empty());
        assert!(report.rule_removed);
        assert_eq!(store.batch_calls(), 0);
    }
}
