//! End-to-end test: bids in, bets matched, scores settled, balances moved
//!
//! Bids go through the submission service; settlement then runs against a
//! static results feed with one healthy and one failing partition.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use spreadbook_ingress::BidSubmissionService;
use spreadbook_settlement::{EventStatus, FeedCompetitor, FeedEvent, SettlementEngine, StaticFeed};
use spreadbook_store::{BalanceStore, BetStore, InMemoryLeaseCoordinator, InMemoryStore, OpContext, OutcomeStore};
use spreadbook_types::*;
use tracing_subscriber::EnvFilter;

const KICKOFF: i64 = 1_700_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn kickoff() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(KICKOFF, 0).unwrap()
}

fn request(kind: &str, away: (&str, &str), home: (&str, &str), spread: &str, pick: &str, amount: i64) -> BidRequest {
    BidRequest {
        kind: kind.into(),
        away_team: away.0.into(),
        home_team: home.0.into(),
        chosen_competitor: pick.into(),
        spread: spread.into(),
        amount,
        date: kickoff(),
        week: 1,
        home_abbreviation: home.1.into(),
        away_abbreviation: away.1.into(),
        div: "test".into(),
    }
}

fn final_event(id: &str, away: (&str, &str, i64), home: (&str, &str, i64)) -> FeedEvent {
    FeedEvent {
        id: id.into(),
        competitors: [
            FeedCompetitor::new(away.0, away.1, Some(away.2)),
            FeedCompetitor::new(home.0, home.1, Some(home.2)),
        ],
        scheduled_at: kickoff(),
        status: EventStatus::Final,
        spread: String::new(),
        week: 1,
    }
}

const AWAY: (&str, &str) = ("Away Team", "AWY");
const HOME: (&str, &str) = ("Home Team", "HOM");
const NORTH: (&str, &str) = ("North", "NTH");
const SOUTH: (&str, &str) = ("South", "STH");
const EAST: (&str, &str) = ("East", "EST");
const WEST: (&str, &str) = ("West", "WST");
const GATORS: (&str, &str) = ("Gators", "FLA");
const UTES: (&str, &str) = ("Utes", "UTAH");

async fn submit(service: &Arc<BidSubmissionService>, user: &str, bids: Vec<BidRequest>) {
    let receipt = service
        .submit(&OpContext::background(), UserId::new(user), bids)
        .await
        .unwrap();
    assert!(receipt.is_clean(), "{receipt:?}");
}

fn ledger(user: &str) -> LedgerKey {
    LedgerKey {
        league: DivisionId::new("test"),
        user: UserId::new(user),
    }
}

#[tokio::test]
async fn bids_to_balances() {
    init_tracing();
    let store = Arc::new(InMemoryStore::from_config(&SpreadbookConfig::default().store));
    let ctx = OpContext::background();

    // ========================================================================
    // Phase 1: MATCH
    // ========================================================================
    let intake_clock = Arc::new(ManualClock::ticking(kickoff() - Duration::days(1), 1));
    let leases = Arc::new(InMemoryLeaseCoordinator::new(intake_clock.clone(), LeaseConfig::default()));
    let service = Arc::new(BidSubmissionService::new(
        store.clone(),
        leases,
        intake_clock,
        &SpreadbookConfig::default(),
    ));

    submit(
        &service,
        "alice",
        vec![
            request("NFL", AWAY, HOME, "AWY -3.0", "Away Team", 30),
            request("NFL", NORTH, SOUTH, "NTH +7", "South", 10),
        ],
    )
    .await;
    submit(
        &service,
        "bob",
        vec![
            request("NFL", AWAY, HOME, "AWY -3.0", "Home Team", 30),
            request("NFL", NORTH, SOUTH, "NTH +7", "North", 10),
        ],
    )
    .await;
    submit(&service, "carol", vec![request("NFL", EAST, WEST, "EST +3", "East", 5)]).await;
    submit(&service, "dave", vec![request("NFL", EAST, WEST, "EST +3", "West", 5)]).await;
    submit(&service, "erin", vec![request("CFB", GATORS, UTES, "UTAH -1", "Gators", 5)]).await;
    submit(&service, "frank", vec![request("CFB", GATORS, UTES, "UTAH -1", "Utes", 5)]).await;

    let bets = BetStore::new(store.clone())
        .by_event_date(&ctx, kickoff().date_naive())
        .await
        .unwrap();
    assert_eq!(bets.len(), 4);

    // ========================================================================
    // Phase 2: SETTLE (college feed down)
    // ========================================================================
    let nfl = FeedPath::new("football", "nfl");
    let cfb = FeedPath::new("football", "college-football");
    let feed = Arc::new(StaticFeed::new());
    // AWY -3.0: 20-19 becomes 17-19, home covers.
    feed.insert(&nfl, final_event("1", ("Away Team", "AWY", 20), ("Home Team", "HOM", 19)))
        .unwrap();
    // NTH +7: 10-20 becomes 17-20, home covers.
    feed.insert(&nfl, final_event("2", ("North", "NTH", 10), ("South", "STH", 20)))
        .unwrap();
    // EST +3: 17-20 becomes 20-20, push.
    feed.insert(&nfl, final_event("3", ("East", "EST", 17), ("West", "WST", 20)))
        .unwrap();
    feed.fail(&cfb).unwrap();

    let settle_clock = Arc::new(ManualClock::at(kickoff() + Duration::hours(6)));
    let engine = SettlementEngine::new(store.clone(), feed.clone(), settle_clock, &SpreadbookConfig::default());

    let report = engine.run(&ctx).await.unwrap();
    assert_eq!(report.bets_loaded, 4);
    assert_eq!(report.partitions, 2);
    assert_eq!(report.failed_partitions.len(), 1);
    assert!(report.failed_partitions[0].partition.starts_with("CFB@"));
    assert_eq!(report.resolved, 2);
    assert_eq!(report.pushed, 1);
    assert_eq!(report.deferred, 1);
    assert_eq!(report.outcomes_written, 2);

    // bob: +30 and -10 net into a single +20 update.
    assert_eq!(report.balance_updates.len(), 2);
    let bob_update = report
        .balance_updates
        .iter()
        .find(|d| d.key == ledger("bob"))
        .unwrap();
    assert_eq!(bob_update.amount, 20);

    let balances = BalanceStore::new(store.clone());
    assert_eq!(balances.balance(&ctx, &ledger("bob")).await.unwrap(), 20);
    assert_eq!(balances.balance(&ctx, &ledger("alice")).await.unwrap(), -20);
    assert_eq!(balances.balance(&ctx, &ledger("carol")).await.unwrap(), 0);

    let outcomes = OutcomeStore::new(store.clone());
    assert_eq!(outcomes.by_user(&ctx, &UserId::new("bob")).await.unwrap().len(), 2);
    assert!(outcomes.by_user(&ctx, &UserId::new("carol")).await.unwrap().is_empty());

    // ========================================================================
    // Phase 3: RECOVER
    // ========================================================================
    feed.recover(&cfb).unwrap();
    // UTAH -1: 24-20 becomes 24-19, away covers.
    feed.insert(&cfb, final_event("4", ("Gators", "FLA", 24), ("Utes", "UTAH", 20)))
        .unwrap();

    let report = engine.run(&ctx).await.unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.bets_loaded, 1, "only the deferred bet is still open");
    assert_eq!(report.resolved, 1);
    assert_eq!(balances.balance(&ctx, &ledger("erin")).await.unwrap(), 5);
    assert_eq!(balances.balance(&ctx, &ledger("frank")).await.unwrap(), -5);
    assert_eq!(balances.balance(&ctx, &ledger("bob")).await.unwrap(), 20);

    let report = engine.run(&ctx).await.unwrap();
    assert_eq!(report.bets_loaded, 0);

    let statuses: Vec<BetStatus> = BetStore::new(store)
        .by_event_date(&ctx, kickoff().date_naive())
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.status)
        .collect();
    assert_eq!(statuses.iter().filter(|s| **s == BetStatus::Resolved).count(), 3);
    assert_eq!(statuses.iter().filter(|s| **s == BetStatus::Pushed).count(), 1);
}

#[tokio::test]
async fn failed_outcome_write_keeps_bet_open() {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let ctx = OpContext::background();
    let bid = Bid::dummy("alice", Side::Away, 10, 1);
    BetStore::new(store.clone())
        .put(
            &ctx,
            &Bet::pending(
                bid.event,
                bid.terms,
                UserId::new("alice"),
                UserId::new("bob"),
                10,
                bid.created_at,
            ),
        )
        .await
        .unwrap();

    let feed = Arc::new(StaticFeed::new());
    feed.insert(
        &FeedPath::new("football", "nfl"),
        final_event("1", ("Away Team", "AWY", 30), ("Home Team", "HOM", 19)),
    )
    .unwrap();
    let mut config = SpreadbookConfig::default();
    config.store.write_retry_attempts = 0;
    let engine = SettlementEngine::new(
        store.clone(),
        feed,
        Arc::new(ManualClock::at(kickoff() + Duration::hours(6))),
        &config,
    );

    store.fail_next_batches(1);
    let report = engine.run(&ctx).await.unwrap();
    assert!(!report.writes.is_complete());
    assert_eq!(report.outcomes_written, 0);
    assert_eq!(report.held_open, 1);
    assert!(report.balance_updates.is_empty());
    let held = BetStore::new(store.clone()).deferred(&ctx).await.unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].deferrals, 0, "holding a bet open spends no deferral");

    let report = engine.run(&ctx).await.unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.outcomes_written, 1);
    assert_eq!(report.resolved, 1);
    let balances = BalanceStore::new(store.clone());
    assert_eq!(balances.balance(&ctx, &ledger("alice")).await.unwrap(), 10);
    assert_eq!(balances.balance(&ctx, &ledger("bob")).await.unwrap(), -10);
    assert!(BetStore::new(store).deferred(&ctx).await.unwrap().is_empty());
}
