//! Integration test: deferred matching at market close
//!
//! REST (submissions) → SCHEDULE (one rule per event) → FIRE → CROSS

use std::sync::Arc;

use chrono::{DateTime, Utc};
use spreadbook_ingress::{
    BidSubmissionService, InMemoryScheduler, MarketCloseJob, MarketCloseMatcher,
};
use spreadbook_store::{BetStore, BidStore, InMemoryLeaseCoordinator, InMemoryStore, OpContext};
use spreadbook_types::*;

#[tokio::test]
async fn pool_is_crossed_when_job_fires() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let clock = Arc::new(ManualClock::ticking(
        DateTime::<Utc>::from_timestamp(1_600_000_000, 0).unwrap(),
        1,
    ));
    let mut cfg = SpreadbookConfig::default();
    cfg.bidding.matching_mode = MatchingMode::AtMarketClose;
    let store = Arc::new(InMemoryStore::new());
    let leases = Arc::new(InMemoryLeaseCoordinator::new(clock.clone(), cfg.lease.clone()));
    let scheduler = Arc::new(InMemoryScheduler::new());
    let service = Arc::new(
        BidSubmissionService::new(store.clone(), leases.clone(), clock.clone(), &cfg)
            .with_scheduler(scheduler.clone()),
    );
    let ctx = OpContext::background();

    // ===================================================================
    // REST: nothing crosses before the market closes
    // ===================================================================
    for (user, side, amount) in [
        ("h1", "Home Team", 50),
        ("h2", "Home Team", 50),
        ("a1", "Away Team", 70),
        ("h1", "Away Team", 5),
    ] {
        let receipt = service
            .submit(&ctx, UserId::new(user), vec![BidRequest::dummy(side, amount)])
            .await
            .unwrap();
        assert!(receipt.bets.is_empty());
        assert!(receipt.is_clean());
    }
    let event = EventKey::dummy();
    let bids = BidStore::new(store.clone());
    assert_eq!(bids.by_event(&ctx, &event).await.unwrap().len(), 4);

    // ===================================================================
    // FIRE: the single registered rule is due at the event start
    // ===================================================================
    assert!(scheduler.due(clock.now()).unwrap().is_empty());
    let due = scheduler.due(event.scheduled_at).unwrap();
    assert_eq!(due.len(), 1);
    let job: MarketCloseJob = serde_json::from_value(due[0].payload.clone()).unwrap();

    let matcher = Arc::new(MarketCloseMatcher::new(
        store.clone(),
        leases,
        scheduler.clone(),
        clock,
        &cfg,
    ));
    let report = matcher.handle(&ctx, job).await.unwrap();
    assert!(report.rule_removed);
    assert!(scheduler.jobs().unwrap().is_empty());

    // ===================================================================
    // CROSS: time priority, no self-match, stake conserved
    // ===================================================================
    let bets = BetStore::new(store.clone())
        .by_week(&ctx, &event.division, 1)
        .await
        .unwrap();
    let pairs: Vec<(String, String, u64)> = {
        let mut v: Vec<_> = bets
            .iter()
            .map(|b| (b.away_user.0.clone(), b.home_user.0.clone(), b.amount))
            .collect();
        v.sort();
        v
    };
    assert_eq!(
        pairs,
        vec![
            ("a1".to_string(), "h1".to_string(), 50),
            ("a1".to_string(), "h2".to_string(), 20),
            ("h1".to_string(), "h2".to_string(), 5),
        ]
    );

    let left = bids.by_event(&ctx, &event).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].user.as_str(), "h2");
    assert_eq!(left[0].amount, 25);
}
