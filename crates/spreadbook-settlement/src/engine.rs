//! Settlement engine: one cycle of resolving open bets for a date.
//!
//! ## Cycle
//!
//! ```text
//! load open bets (event date + deferred index)
//!   └─ partition by (kind, event date)
//!        └─ one task per partition (JoinSet): fetch feed -> score table -> decide
//! join ─> outcomes (batch write) ─> net ledger ─> balance updates ─> bet statuses
//! ```
//!
//! A bet's ledger deltas are applied only after its outcome is written.
//! Every applied delta is marked on the outcome record, and a bet becomes
//! RESOLVED only once both of its deltas are marked. A bet whose outcome or
//! deltas did not land is held open in the deferred index; the next cycle
//! finds the recorded outcome and applies only the unmarked deltas.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use spreadbook_store::{
    keys, BalanceStore, BatchWriter, BetStore, KeyedStore, LedgerMarks, OpContext, OutcomeStore,
    RecordKey, WriteReport,
};
use spreadbook_types::constants::WRITE_RETRY_BACKOFF_MS;
use spreadbook_types::{
    Bet, BetStatus, Clock, FeedPath, Kind, LedgerDelta, LedgerKey, Outcome, OutcomeId, Party,
    Result, SettlementConfig, SignedAmount, SpreadbookConfig, SpreadbookError,
};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::feed::{KindTranslator, ResultsFeed};
use crate::idempotency::OutcomeGuard;
use crate::ledger::LedgerAggregator;
use crate::scores::{Decision, DeferReason, ScoreTable};

/// Bets resolved together: one kind, one event date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub kind: Kind,
    pub date: NaiveDate,
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.kind, self.date)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionFailure {
    pub partition: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceFailure {
    pub key: LedgerKey,
    pub amount: SignedAmount,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkFailure {
    pub outcome: OutcomeId,
    pub party: Party,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusFailure {
    pub bet: String,
    pub status: BetStatus,
    pub error: String,
}

/// What one settlement cycle did.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub resolved_date: NaiveDate,
    pub bets_loaded: usize,
    pub partitions: usize,
    pub failed_partitions: Vec<PartitionFailure>,
    /// Bets moved to RESOLVED, including those whose outcome already existed.
    pub resolved: usize,
    pub pushed: usize,
    pub deferred: usize,
    pub voided: usize,
    /// Winning decisions whose outcome was already recorded.
    pub already_recorded: usize,
    /// Recorded outcomes that still owed at least one balance delta.
    pub replayed: usize,
    /// Decided bets kept open because their outcome or deltas did not land.
    pub held_open: usize,
    pub outcomes_written: usize,
    pub balance_updates: Vec<LedgerDelta>,
    pub balance_failures: Vec<BalanceFailure>,
    pub mark_failures: Vec<MarkFailure>,
    pub status_failures: Vec<StatusFailure>,
    pub writes: WriteReport,
}

impl SettlementReport {
    fn new(resolved_date: NaiveDate) -> Self {
        Self {
            resolved_date,
            bets_loaded: 0,
            partitions: 0,
            failed_partitions: Vec::new(),
            resolved: 0,
            pushed: 0,
            deferred: 0,
            voided: 0,
            already_recorded: 0,
            replayed: 0,
            held_open: 0,
            outcomes_written: 0,
            balance_updates: Vec::new(),
            balance_failures: Vec::new(),
            mark_failures: Vec::new(),
            status_failures: Vec::new(),
            writes: WriteReport::default(),
        }
    }

    /// True when nothing failed to persist and every partition answered.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed_partitions.is_empty()
            && self.balance_failures.is_empty()
            && self.mark_failures.is_empty()
            && self.status_failures.is_empty()
            && self.writes.is_complete()
    }
}

/// Output of one partition task.
struct PartitionResult {
    key: PartitionKey,
    feed_error: Option<String>,
    decided: Vec<(Bet, Decision)>,
}

/// A recorded outcome whose bet waits on its balance deltas.
struct Settling {
    outcome: Outcome,
    bet: Bet,
    marks: LedgerMarks,
}

pub struct SettlementEngine {
    bets: BetStore,
    outcomes: OutcomeStore,
    balances: BalanceStore,
    writer: BatchWriter,
    feed: Arc<dyn ResultsFeed>,
    translator: KindTranslator,
    clock: Arc<dyn Clock>,
    config: SettlementConfig,
    retry_attempts: u32,
    guard: Mutex<OutcomeGuard>,
}

impl SettlementEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyedStore>,
        feed: Arc<dyn ResultsFeed>,
        clock: Arc<dyn Clock>,
        config: &SpreadbookConfig,
    ) -> Self {
        Self {
            bets: BetStore::new(Arc::clone(&store)),
            outcomes: OutcomeStore::new(Arc::clone(&store)),
            balances: BalanceStore::new(Arc::clone(&store)),
            writer: BatchWriter::new(store, config.store.batch_write_limit),
            feed,
            translator: KindTranslator::new(&config.settlement),
            clock,
            config: config.settlement.clone(),
            retry_attempts: config.store.write_retry_attempts,
            guard: Mutex::new(OutcomeGuard::default()),
        }
    }

    /// The date this cycle resolves: now minus the configured lag.
    #[must_use]
    pub fn resolved_date(&self) -> NaiveDate {
        (self.clock.now() - chrono::Duration::hours(self.config.resolve_lag_hours)).date_naive()
    }

    /// Run one scheduled cycle.
    pub async fn run(&self, ctx: &OpContext) -> Result<SettlementReport> {
        self.run_for_date(ctx, self.resolved_date()).await
    }

    /// Resolve open bets of `date` plus every deferred bet.
    ///
    /// # Errors
    /// Only when the open bets cannot be loaded or encoded; every later
    /// failure is reported in the [`SettlementReport`].
    pub async fn run_for_date(&self, ctx: &OpContext, date: NaiveDate) -> Result<SettlementReport> {
        let ctx = ctx.child(Duration::from_millis(self.config.run_timeout_ms));
        let mut report = SettlementReport::new(date);

        let open = self.load_open_bets(&ctx, date).await?;
        report.bets_loaded = open.len();
        if open.is_empty() {
            info!(date = %date, "no open bets");
            return Ok(report);
        }

        let mut partitions: BTreeMap<PartitionKey, Vec<Bet>> = BTreeMap::new();
        for bet in open {
            let key = PartitionKey {
                kind: bet.event.kind.clone(),
                date: bet.event.event_date(),
            };
            partitions.entry(key).or_default().push(bet);
        }
        report.partitions = partitions.len();

        let results = self.resolve_partitions(&ctx, partitions, &mut report).await;

        // Sort decisions into writes and status transitions.
        let mut pending_outcomes: Vec<(Outcome, Bet)> = Vec::new();
        let mut settling: Vec<Settling> = Vec::new();
        let mut transitions: Vec<(Bet, BetStatus, u32)> = Vec::new();
        for result in results {
            if let Some(error) = result.feed_error {
                report.failed_partitions.push(PartitionFailure {
                    partition: result.key.to_string(),
                    error,
                });
            }
            for (bet, decision) in result.decided {
                match decision {
                    Decision::Winner {
                        side,
                        event_id,
                        week,
                    } => {
                        let outcome = Outcome::for_bet(&bet, side, &event_id, week);
                        match self.recorded_marks(&ctx, &outcome).await? {
                            None => pending_outcomes.push((outcome, bet)),
                            Some(marks) => {
                                report.already_recorded += 1;
                                if !marks.is_complete() {
                                    report.replayed += 1;
                                }
                                settling.push(Settling { outcome, bet, marks });
                            }
                        }
                    }
                    Decision::Push { event_id } => {
                        info!(bet = %bet, event = %event_id, "push, stakes returned");
                        report.pushed += 1;
                        let deferrals = bet.deferrals;
                        transitions.push((bet, BetStatus::Pushed, deferrals));
                    }
                    Decision::Defer(reason) => {
                        transitions.push(self.defer(&mut report, bet, reason));
                    }
                }
            }
        }

        // Outcomes first; only those that landed owe balance deltas.
        let ops = pending_outcomes
            .iter()
            .map(|(outcome, _)| OutcomeStore::put_op(outcome))
            .collect::<Result<Vec<_>>>()?;
        report.writes = self
            .writer
            .write_with_retry(&ctx, ops, self.retry_attempts)
            .await;
        let failed: BTreeSet<RecordKey> = report.writes.failed_keys().into_iter().collect();
        for (outcome, bet) in pending_outcomes {
            if failed.contains(&OutcomeStore::key_of(&outcome)) {
                error!(outcome = %outcome.id, bet = %bet, "outcome not written, bet stays open");
                transitions.push(hold_open(&mut report, bet));
                continue;
            }
            report.outcomes_written += 1;
            settling.push(Settling {
                outcome,
                bet,
                marks: LedgerMarks::default(),
            });
        }

        self.settle_ledger(&ctx, &mut settling, &mut report).await;
        for s in settling {
            if s.marks.is_complete() {
                self.remember(s.outcome.id);
                report.resolved += 1;
                let deferrals = s.bet.deferrals;
                transitions.push((s.bet, BetStatus::Resolved, deferrals));
            } else {
                warn!(
                    outcome = %s.outcome.id,
                    bet = %s.bet,
                    missing = ?s.marks.missing(),
                    "ledger incomplete, bet stays open"
                );
                transitions.push(hold_open(&mut report, s.bet));
            }
        }

        self.apply_statuses(&ctx, transitions, &mut report).await;

        info!(
            date = %date,
            loaded = report.bets_loaded,
            resolved = report.resolved,
            pushed = report.pushed,
            deferred = report.deferred,
            voided = report.voided,
            outcomes = report.outcomes_written,
            replayed = report.replayed,
            held_open = report.held_open,
            balances = report.balance_updates.len(),
            clean = report.is_clean(),
            "settlement cycle finished"
        );
        Ok(report)
    }

    /// Open bets of `date` and every deferred bet, each once.
    async fn load_open_bets(&self, ctx: &OpContext, date: NaiveDate) -> Result<Vec<Bet>> {
        let (dated, deferred) = tokio::try_join!(
            self.bets.by_event_date(ctx, date),
            self.bets.deferred(ctx),
        )?;
        let mut unique: BTreeMap<RecordKey, Bet> = BTreeMap::new();
        for bet in dated.into_iter().chain(deferred) {
            if bet.status.is_open() {
                unique.insert(keys::bet_key(&bet), bet);
            }
        }
        Ok(unique.into_values().collect())
    }

    /// Fan out one fetch-and-decide task per partition and join them.
    async fn resolve_partitions(
        &self,
        ctx: &OpContext,
        partitions: BTreeMap<PartitionKey, Vec<Bet>>,
        report: &mut SettlementReport,
    ) -> Vec<PartitionResult> {
        let mut pending: BTreeSet<PartitionKey> = partitions.keys().cloned().collect();
        let feed_timeout = Duration::from_millis(self.config.feed_timeout_ms);

        let mut tasks = JoinSet::new();
        for (key, bets) in partitions {
            let path = self.translator.translate(&key.kind);
            let feed = Arc::clone(&self.feed);
            let fctx = ctx.child(feed_timeout);
            tasks.spawn(resolve_partition(feed, fctx, path, key, bets));
        }

        let mut results = Vec::with_capacity(pending.len());
        let mut aborted = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    pending.remove(&result.key);
                    results.push(result);
                }
                Err(e) => {
                    error!(error = %e, "settlement partition task aborted");
                    aborted.push(e.to_string());
                }
            }
        }
        // Bets of an aborted partition are left untouched for the next cycle.
        for key in pending {
            let err = SpreadbookError::SettlementTask {
                reason: aborted.join("; "),
            };
            report.failed_partitions.push(PartitionFailure {
                partition: key.to_string(),
                error: err.to_string(),
            });
        }
        results.sort_by(|a, b| a.key.cmp(&b.key));
        results
    }

    fn defer(&self, report: &mut SettlementReport, bet: Bet, reason: DeferReason) -> (Bet, BetStatus, u32) {
        if bet.deferrals >= self.config.max_deferrals {
            warn!(bet = %bet, ?reason, deferrals = bet.deferrals, "bet voided, stakes returned");
            report.voided += 1;
            let deferrals = bet.deferrals;
            (bet, BetStatus::Void, deferrals)
        } else {
            let deferrals = bet.deferrals + 1;
            warn!(bet = %bet, ?reason, deferrals, "bet deferred");
            report.deferred += 1;
            (bet, BetStatus::Deferred, deferrals)
        }
    }

    /// Marks of an already recorded outcome. An outcome this process
    /// settled in full is answered from the guard.
    async fn recorded_marks(&self, ctx: &OpContext, outcome: &Outcome) -> Result<Option<LedgerMarks>> {
        let remembered = self
            .guard
            .lock()
            .map_err(|_| SpreadbookError::Internal("outcome guard mutex poisoned".into()))?
            .is_recorded(&outcome.id);
        if remembered {
            return Ok(Some(LedgerMarks {
                winner: true,
                loser: true,
            }));
        }
        self.outcomes.marks(ctx, outcome).await
    }

    fn remember(&self, id: OutcomeId) {
        match self.guard.lock() {
            Ok(mut guard) => {
                if guard.is_recorded(&id) {
                    return;
                }
                if let Err(e) = guard.mark_recorded(id) {
                    warn!(error = %e, "outcome guard rejected id");
                }
            }
            Err(_) => error!("outcome guard mutex poisoned"),
        }
    }

    /// Net every owed delta of `settling`, apply the balances, then mark
    /// each delta whose balance landed on its outcome record.
    async fn settle_ledger(
        &self,
        ctx: &OpContext,
        settling: &mut [Settling],
        report: &mut SettlementReport,
    ) {
        let mut ledger = LedgerAggregator::new();
        let mut owed: BTreeMap<LedgerKey, Vec<(usize, Party)>> = BTreeMap::new();
        for (i, s) in settling.iter().enumerate() {
            for party in s.marks.missing() {
                let delta = s.outcome.delta(party);
                owed.entry(delta.key.clone()).or_default().push((i, party));
                ledger.add(delta);
            }
        }
        if owed.is_empty() {
            return;
        }

        let updates = ledger.into_updates();
        let netted: BTreeSet<LedgerKey> = updates.iter().map(|d| d.key.clone()).collect();
        let applied = self.apply_balances(ctx, updates, report).await;

        // A key that nets to zero needs no balance update.
        let to_mark: Vec<(usize, Party, Outcome)> = owed
            .into_iter()
            .filter(|(key, _)| applied.contains(key) || !netted.contains(key))
            .flat_map(|(_, parts)| parts)
            .map(|(i, party)| (i, party, settling[i].outcome.clone()))
            .collect();
        let outcomes = self.outcomes.clone();
        let mark = |(i, party, outcome): (usize, Party, Outcome)| {
            let outcomes = outcomes.clone();
            let ctx = ctx.clone();
            async move {
                let res = outcomes.mark_applied(&ctx, &outcome, party).await;
                ((i, party, outcome), res)
            }
        };
        let (marked, failed) =
            run_with_retry(ctx, "ledger mark", self.retry_attempts, to_mark, mark).await;
        for (i, party, _) in marked {
            settling[i].marks.set(party);
        }
        for ((_, party, outcome), e) in failed {
            error!(outcome = %outcome.id, ?party, error = %e, "ledger mark failed");
            report.mark_failures.push(MarkFailure {
                outcome: outcome.id,
                party,
                error: e.to_string(),
            });
        }
    }

    /// Apply `updates`, retrying failures; returns the keys that landed.
    async fn apply_balances(
        &self,
        ctx: &OpContext,
        updates: Vec<LedgerDelta>,
        report: &mut SettlementReport,
    ) -> BTreeSet<LedgerKey> {
        let balances = self.balances.clone();
        let add = |delta: LedgerDelta| {
            let balances = balances.clone();
            let ctx = ctx.clone();
            async move {
                let res = balances.add(&ctx, &delta.key, delta.amount).await.map(|_| ());
                (delta, res)
            }
        };
        let (applied, failed) =
            run_with_retry(ctx, "balance update", self.retry_attempts, updates, add).await;
        for (delta, e) in failed {
            error!(delta = %delta, error = %e, "balance update failed");
            report.balance_failures.push(BalanceFailure {
                key: delta.key,
                amount: delta.amount,
                error: e.to_string(),
            });
        }
        let keys = applied.iter().map(|d| d.key.clone()).collect();
        report.balance_updates.extend(applied);
        report.balance_updates.sort_by(|a, b| a.key.cmp(&b.key));
        keys
    }

    async fn apply_statuses(
        &self,
        ctx: &OpContext,
        transitions: Vec<(Bet, BetStatus, u32)>,
        report: &mut SettlementReport,
    ) {
        let mut tasks = JoinSet::new();
        for (bet, status, deferrals) in transitions {
            let bets = self.bets.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let res = bets.update_status(&ctx, &bet, status, deferrals).await;
                (bet, status, res)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, _, Ok(()))) => {}
                Ok((bet, status, Err(e))) => {
                    error!(bet = %bet, %status, error = %e, "bet status update failed");
                    report.status_failures.push(StatusFailure {
                        bet: bet.to_string(),
                        status,
                        error: e.to_string(),
                    });
                }
                Err(e) => error!(error = %e, "bet status task aborted"),
            }
        }
    }
}

/// Keep a decided bet open in the deferred index without spending one of
/// its deferrals.
fn hold_open(report: &mut SettlementReport, bet: Bet) -> (Bet, BetStatus, u32) {
    report.held_open += 1;
    let deferrals = bet.deferrals;
    (bet, BetStatus::Deferred, deferrals)
}

/// Run `op` over `items` concurrently, then re-run the failures up to
/// `attempts` more times with a fixed backoff. Returns the items that
/// succeeded and the last error of each that did not.
async fn run_with_retry<T, F, Fut>(
    ctx: &OpContext,
    what: &'static str,
    attempts: u32,
    items: Vec<T>,
    op: F,
) -> (Vec<T>, Vec<(T, SpreadbookError)>)
where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = (T, Result<()>)> + Send + 'static,
{
    let mut done = Vec::new();
    let mut failed = run_round(what, &op, items, &mut done).await;
    for attempt in 1..=attempts {
        if failed.is_empty() || ctx.check().is_err() {
            break;
        }
        if ctx
            .sleep(Duration::from_millis(WRITE_RETRY_BACKOFF_MS))
            .await
            .is_err()
        {
            break;
        }
        warn!(attempt, what, failed = failed.len(), "retrying failed writes");
        let retry = failed.into_iter().map(|(item, _)| item).collect();
        failed = run_round(what, &op, retry, &mut done).await;
    }
    (done, failed)
}

async fn run_round<T, F, Fut>(
    what: &'static str,
    op: &F,
    items: Vec<T>,
    done: &mut Vec<T>,
) -> Vec<(T, SpreadbookError)>
where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = (T, Result<()>)> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for item in items {
        tasks.spawn(op(item));
    }
    let mut failed = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((item, Ok(()))) => done.push(item),
            Ok((item, Err(e))) => failed.push((item, e)),
            Err(e) => error!(error = %e, what, "task aborted"),
        }
    }
    failed
}

/// Fetch one partition's results and decide each of its bets.
async fn resolve_partition(
    feed: Arc<dyn ResultsFeed>,
    ctx: OpContext,
    path: FeedPath,
    key: PartitionKey,
    bets: Vec<Bet>,
) -> PartitionResult {
    let fetched = ctx.run(feed.fetch(&path, key.date, key.date)).await;
    let (table, feed_error) = match fetched {
        Ok(events) => (Some(ScoreTable::from_events(events)), None),
        Err(e) => {
            warn!(partition = %key, sport = %path.sport, league = %path.league, error = %e, "feed fetch failed");
            (None, Some(e.to_string()))
        }
    };
    let decided = bets
        .into_iter()
        .map(|bet| {
            let decision = table
                .as_ref()
                .map_or(Decision::Defer(DeferReason::FeedUnavailable), |t| t.decide(&bet));
            (bet, decision)
        })
        .collect();
    PartitionResult {
        key,
        feed_error,
        decided,
    }
}
