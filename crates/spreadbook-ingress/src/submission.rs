//! Bid submission: validate, group by event, match under the event lease,
//! persist, release.
//!
//! ## Flow
//!
//! ```text
//! submit(user, [BidRequest])
//!   ├─ validate each request ─────────────> rejected[i]
//!   └─ group valid bids by event
//!        └─ one task per event (JoinSet)
//!             acquire lease -> load book -> match (or rest) -> renew if stale
//!             -> batch write with retry -> release lease
//! ```
//!
//! Events are independent: a lease timeout or store failure on one event
//! is reported for that event while the others proceed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use spreadbook_matchcore::{EventBook, MatchPass, MatchPlan};
use spreadbook_store::{
    keys, BatchWriter, BetStore, BidStore, KeyedStore, Lease, LeaseCoordinator, OpContext,
    WriteOp, WriteReport,
};
use spreadbook_types::constants::LEASE_RENEW_THRESHOLD_MS;
use spreadbook_types::{
    Bet, Bid, BidRequest, Clock, EventKey, MatchingMode, Result, SpreadbookConfig,
    SpreadbookError, UserId,
};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::market_close::MarketCloseJob;
use crate::scheduler::{ScheduledJob, Scheduler};
use crate::validator::BidValidator;

/// A request that failed validation.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    /// Position in the submitted list.
    pub index: usize,
    pub code: String,
    pub error: String,
}

/// An event whose bids could not be processed.
#[derive(Debug, Clone, Serialize)]
pub struct EventFailure {
    pub event: String,
    /// Positions of the affected requests.
    pub bids: Vec<usize>,
    pub code: String,
    pub error: String,
}

/// What a submission did.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub user: UserId,
    /// Bets created across every event in the submission.
    pub bets: Vec<Bet>,
    /// The submitter's unmatched remainders now resting in their pools.
    pub resting: Vec<Bid>,
    pub rejected: Vec<Rejection>,
    pub event_errors: Vec<EventFailure>,
    pub writes: WriteReport,
    /// Market-close rules registered for deferred matching.
    pub scheduled: Vec<String>,
}

impl SubmissionReceipt {
    fn new(user: UserId) -> Self {
        Self {
            user,
            bets: Vec::new(),
            resting: Vec::new(),
            rejected: Vec::new(),
            event_errors: Vec::new(),
            writes: WriteReport::default(),
            scheduled: Vec::new(),
        }
    }

    /// True when every request was accepted and fully persisted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.event_errors.is_empty() && self.writes.is_complete()
    }
}

/// Result of processing one event's bids.
#[derive(Debug, Default)]
struct EventResult {
    bets: Vec<Bet>,
    resting: Vec<Bid>,
    writes: WriteReport,
    scheduled: Option<String>,
}

// ---------------------------------------------------------------------------
// Shared pool access
// ---------------------------------------------------------------------------

/// Lease, load and persist steps shared by submission and market close.
#[derive(Clone)]
pub(crate) struct PoolAccess {
    pub(crate) bids: BidStore,
    pub(crate) leases: Arc<dyn LeaseCoordinator>,
    pub(crate) writer: BatchWriter,
    pub(crate) retry_attempts: u32,
}

impl PoolAccess {
    pub(crate) fn new(
        store: Arc<dyn KeyedStore>,
        leases: Arc<dyn LeaseCoordinator>,
        config: &SpreadbookConfig,
    ) -> Self {
        Self {
            bids: BidStore::new(Arc::clone(&store)),
            leases,
            writer: BatchWriter::new(store, config.store.batch_write_limit),
            retry_attempts: config.store.write_retry_attempts,
        }
    }

    pub(crate) async fn acquire(&self, ctx: &OpContext, event: &EventKey) -> Result<Lease> {
        self.leases.acquire(ctx, &keys::event_lease_name(event)).await
    }

    /// Release errors are logged; the lease expires on its own regardless.
    pub(crate) async fn release(&self, lease: Lease) {
        let key = lease.key.clone();
        if let Err(e) = self.leases.release(lease).await {
            warn!(key = %key, error = %e, "lease release failed");
        }
    }

    pub(crate) async fn load(&self, ctx: &OpContext, event: &EventKey) -> Result<EventBook> {
        let bids = self.bids.by_event(ctx, event).await?;
        EventBook::load(event.clone(), bids)
    }

    /// Renew a stale lease, then write the plan.
    pub(crate) async fn persist(
        &self,
        ctx: &OpContext,
        lease: &Lease,
        plan: &MatchPlan,
    ) -> Result<WriteReport> {
        self.leases
            .ensure_fresh(lease.clone(), Duration::from_millis(LEASE_RENEW_THRESHOLD_MS))
            .await?;
        let ops = plan_ops(plan)?;
        let report = self
            .writer
            .write_with_retry(ctx, ops, self.retry_attempts)
            .await;
        if !report.is_complete() {
            error!(
                event = %plan.event,
                failed_ops = report.failed_ops(),
                total_ops = report.total_ops,
                "match plan partially persisted"
            );
        }
        Ok(report)
    }
}

/// Bets first, then bid deletes, then bid updates and inserts as puts.
pub(crate) fn plan_ops(plan: &MatchPlan) -> Result<Vec<WriteOp>> {
    let mut ops = Vec::with_capacity(plan.bets.len() + plan.changes.op_count());
    for bet in &plan.bets {
        ops.push(BetStore::put_op(bet)?);
    }
    ops.extend(plan.changes.deletes.iter().map(BidStore::delete_op));
    for bid in plan.changes.updates.iter().chain(&plan.changes.inserts) {
        ops.push(BidStore::put_op(bid)?);
    }
    Ok(ops)
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct BidSubmissionService {
    validator: BidValidator,
    pool: PoolAccess,
    scheduler: Option<Arc<dyn Scheduler>>,
    clock: Arc<dyn Clock>,
    mode: MatchingMode,
}

impl BidSubmissionService {
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyedStore>,
        leases: Arc<dyn LeaseCoordinator>,
        clock: Arc<dyn Clock>,
        config: &SpreadbookConfig,
    ) -> Self {
        Self {
            validator: BidValidator::new(&config.bidding, Arc::clone(&clock)),
            pool: PoolAccess::new(store, leases, config),
            scheduler: None,
            clock,
            mode: config.bidding.matching_mode,
        }
    }

    /// Scheduler used to register market-close jobs.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub fn mode(&self) -> MatchingMode {
        self.mode
    }

    /// Process one caller's bids.
    ///
    /// Per-bid validation failures and per-event failures are reported in
    /// the receipt.
    ///
    /// # Errors
    /// [`SpreadbookError::SubmissionTooLarge`] when the list exceeds the
    /// configured maximum; nothing is processed in that case.
    pub async fn submit(
        self: &Arc<Self>,
        ctx: &OpContext,
        user: UserId,
        requests: Vec<BidRequest>,
    ) -> Result<SubmissionReceipt> {
        self.validator.check_submission(requests.len())?;
        let mut receipt = SubmissionReceipt::new(user.clone());

        let mut by_event: BTreeMap<EventKey, Vec<(usize, Bid)>> = BTreeMap::new();
        for (index, request) in requests.iter().enumerate() {
            match self.validator.validate(&user, request, self.clock.now()) {
                Ok(bid) => by_event.entry(bid.event.clone()).or_default().push((index, bid)),
                Err(e) => {
                    warn!(user = %user, index, error = %e, "bid rejected");
                    receipt.rejected.push(Rejection {
                        index,
                        code: e.code(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut pending: BTreeMap<EventKey, Vec<usize>> = by_event
            .iter()
            .map(|(event, bids)| (event.clone(), bids.iter().map(|(i, _)| *i).collect()))
            .collect();

        let mut tasks = JoinSet::new();
        for (event, bids) in by_event {
            let service = Arc::clone(self);
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let bids: Vec<Bid> = bids.into_iter().map(|(_, bid)| bid).collect();
                let result = service.submit_event(&ctx, &event, bids).await;
                (event, result)
            });
        }

        let mut aborted = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((event, result)) => {
                    let indexes = pending.remove(&event).unwrap_or_default();
                    match result {
                        Ok(done) => {
                            receipt.bets.extend(done.bets);
                            receipt.resting.extend(done.resting);
                            receipt.writes.absorb(done.writes);
                            receipt.scheduled.extend(done.scheduled);
                        }
                        Err(e) => {
                            error!(event = %event, error = %e, "event submission failed");
                            receipt.event_errors.push(EventFailure {
                                event: event.to_string(),
                                bids: indexes,
                                code: e.code(),
                                error: e.to_string(),
                            });
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "event submission task aborted");
                    aborted.push(e.to_string());
                }
            }
        }
        // Whatever is still pending belongs to an aborted task.
        for (event, indexes) in pending {
            let err = SpreadbookError::Internal(aborted.join("; "));
            receipt.event_errors.push(EventFailure {
                event: event.to_string(),
                bids: indexes,
                code: err.code(),
                error: err.to_string(),
            });
        }

        info!(
            user = %receipt.user,
            bets = receipt.bets.len(),
            resting = receipt.resting.len(),
            rejected = receipt.rejected.len(),
            failed_events = receipt.event_errors.len(),
            "submission processed"
        );
        Ok(receipt)
    }

    async fn submit_event(
        &self,
        ctx: &OpContext,
        event: &EventKey,
        bids: Vec<Bid>,
    ) -> Result<EventResult> {
        let lease = self.pool.acquire(ctx, event).await?;
        let result = self.submit_locked(ctx, &lease, event, bids).await;
        self.pool.release(lease).await;
        result
    }

    async fn submit_locked(
        &self,
        ctx: &OpContext,
        lease: &Lease,
        event: &EventKey,
        bids: Vec<Bid>,
    ) -> Result<EventResult> {
        let mut book = self.pool.load(ctx, event).await?;
        let mut resting = Vec::new();

        let plan = match self.mode {
            MatchingMode::Immediate => {
                let mut pass = MatchPass::new(book, self.clock.now());
                for bid in bids {
                    let fill = pass.match_incoming(bid.clone())?;
                    if fill.resting > 0 {
                        resting.push(Bid {
                            amount: fill.resting,
                            ..bid
                        });
                    }
                }
                pass.finish()?
            }
            MatchingMode::AtMarketClose => {
                for bid in bids {
                    book.rest(bid.clone())?;
                    resting.push(bid);
                }
                MatchPlan {
                    event: event.clone(),
                    bets: Vec::new(),
                    changes: book.changes(),
                    matched: 0,
                }
            }
        };

        let writes = self.pool.persist(ctx, lease, &plan).await?;
        info!(
            event = %event,
            bets = plan.bets.len(),
            matched = plan.matched,
            ops = writes.total_ops,
            "event bids processed"
        );

        let scheduled = match self.mode {
            MatchingMode::AtMarketClose if writes.is_complete() => {
                self.schedule_close(event).await
            }
            _ => None,
        };

        Ok(EventResult {
            bets: plan.bets,
            resting,
            writes,
            scheduled,
        })
    }

    /// Register the event's market-close job. Failures are logged and the
    /// rule is left out of the receipt.
    async fn schedule_close(&self, event: &EventKey) -> Option<String> {
        let Some(scheduler) = &self.scheduler else {
            warn!(event = %event, "no scheduler configured, pool will not be crossed");
            return None;
        };
        let job = MarketCloseJob::for_event(event);
        let payload = match serde_json::to_value(&job) {
            Ok(payload) => payload,
            Err(e) => {
                error!(event = %event, error = %e, "market-close payload encode failed");
                return None;
            }
        };
        let scheduled = ScheduledJob {
            rule_name: job.rule_name.clone(),
            fire_at: event.scheduled_at,
            payload,
        };
        match scheduler.schedule(scheduled).await {
            Ok(()) => Some(job.rule_name),
            Err(e) => {
                error!(event = %event, error = %e, "market-close scheduling failed");
                None
            }
        }
    }
}
