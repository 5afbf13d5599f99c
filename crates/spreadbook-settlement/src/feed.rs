//! Results feed contract and kind translation.
//!
//! The feed is an external, eventually consistent source of final scores.
//! Settlement asks it for one (sport, league) and a date range per
//! partition; events it does not know yet are deferred, never guessed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use spreadbook_types::{FeedPath, Kind, Result, SettlementConfig, SpreadbookError};

/// Lifecycle of a feed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Scheduled,
    InProgress,
    Final,
    Postponed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCompetitor {
    pub name: String,
    pub abbreviation: String,
    /// Raw score; absent until the event has started.
    pub score: Option<Decimal>,
}

impl FeedCompetitor {
    #[must_use]
    pub fn new(name: &str, abbreviation: &str, score: Option<i64>) -> Self {
        Self {
            name: name.to_string(),
            abbreviation: abbreviation.to_string(),
            score: score.map(Decimal::from),
        }
    }
}

/// One event as reported by the feed. Competitors are `[away, home]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEvent {
    pub id: String,
    pub competitors: [FeedCompetitor; 2],
    pub scheduled_at: DateTime<Utc>,
    pub status: EventStatus,
    /// Spread as currently quoted by the feed.
    #[serde(default)]
    pub spread: String,
    #[serde(default)]
    pub week: u32,
}

impl FeedEvent {
    #[must_use]
    pub fn away(&self) -> &FeedCompetitor {
        &self.competitors[0]
    }

    #[must_use]
    pub fn home(&self) -> &FeedCompetitor {
        &self.competitors[1]
    }

    #[must_use]
    pub fn is_final(&self) -> bool {
        self.status == EventStatus::Final
    }
}

#[async_trait]
pub trait ResultsFeed: Send + Sync {
    /// Events of `path` scheduled within `from..=to` (UTC dates).
    async fn fetch(&self, path: &FeedPath, from: NaiveDate, to: NaiveDate) -> Result<Vec<FeedEvent>>;
}

// ---------------------------------------------------------------------------
// Kind translation
// ---------------------------------------------------------------------------

/// Maps exchange kinds (`NFL`, `CFB`, ...) to feed paths.
#[derive(Debug, Clone, Default)]
pub struct KindTranslator {
    overrides: BTreeMap<String, FeedPath>,
}

impl KindTranslator {
    #[must_use]
    pub fn new(config: &SettlementConfig) -> Self {
        Self {
            overrides: config.kind_overrides.clone(),
        }
    }

    /// Configured overrides first, then `CFB` to college football, and
    /// everything else to the NFL.
    #[must_use]
    pub fn translate(&self, kind: &Kind) -> FeedPath {
        if let Some(path) = self.overrides.get(kind.as_str()) {
            return path.clone();
        }
        match kind.as_str() {
            "CFB" => FeedPath::new("football", "college-football"),
            _ => FeedPath::new("football", "nfl"),
        }
    }
}

// ---------------------------------------------------------------------------
// Static feed
// ---------------------------------------------------------------------------

/// Feed answering from a fixed event list. Used by tests and replays.
#[derive(Default)]
pub struct StaticFeed {
    events: Mutex<HashMap<(String, String), Vec<FeedEvent>>>,
    failing: Mutex<HashSet<(String, String)>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl StaticFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn path_key(path: &FeedPath) -> (String, String) {
        (path.sport.clone(), path.league.clone())
    }

    fn poisoned() -> SpreadbookError {
        SpreadbookError::Internal("static feed mutex poisoned".into())
    }

    /// Add or replace (by id) an event under `path`.
    pub fn insert(&self, path: &FeedPath, event: FeedEvent) -> Result<()> {
        let mut events = self.events.lock().map_err(|_| Self::poisoned())?;
        let list = events.entry(Self::path_key(path)).or_default();
        list.retain(|e| e.id != event.id);
        list.push(event);
        Ok(())
    }

    /// Make every fetch for `path` fail until [`StaticFeed::recover`].
    pub fn fail(&self, path: &FeedPath) -> Result<()> {
        self.failing
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(Self::path_key(path));
        Ok(())
    }

    pub fn recover(&self, path: &FeedPath) -> Result<()> {
        self.failing
            .lock()
            .map_err(|_| Self::poisoned())?
            .remove(&Self::path_key(path));
        Ok(())
    }

    /// Delay every answer by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) -> Result<()> {
        *self.delay.lock().map_err(|_| Self::poisoned())? = delay;
        Ok(())
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultsFeed for StaticFeed {
    async fn fetch(&self, path: &FeedPath, from: NaiveDate, to: NaiveDate) -> Result<Vec<FeedEvent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().map_err(|_| Self::poisoned())?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let key = Self::path_key(path);
        if self.failing.lock().map_err(|_| Self::poisoned())?.contains(&key) {
            return Err(SpreadbookError::Feed {
                kind: format!("{}/{}", path.sport, path.league),
                reason: "feed unavailable".into(),
            });
        }
        let events = self.events.lock().map_err(|_| Self::poisoned())?;
        Ok(events
            .get(&key)
            .map(|list| {
                list.iter()
                    .filter(|e| {
                        let date = e.scheduled_at.date_naive();
                        from <= date && date <= to
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, secs: i64) -> FeedEvent {
        FeedEvent {
            id: id.to_string(),
            competitors: [
                FeedCompetitor::new("Away Team", "AWY", Some(20)),
                FeedCompetitor::new("Home Team", "HOM", Some(19)),
            ],
            scheduled_at: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
            status: EventStatus::Final,
            spread: String::new(),
            week: 1,
        }
    }

    #[test]
    fn default_kind_mapping() {
        let t = KindTranslator::default();
        assert_eq!(
            t.translate(&Kind::new("CFB")),
            FeedPath::new("football", "college-football")
        );
        assert_eq!(t.translate(&Kind::new("NFL")), FeedPath::new("football", "nfl"));
        assert_eq!(t.translate(&Kind::new("XFL")), FeedPath::new("football", "nfl"));
    }

    #[test]
    fn overrides_win() {
        let mut cfg = SettlementConfig::default();
        cfg.kind_overrides
            .insert("NBA".into(), FeedPath::new("basketball", "nba"));
        let t = KindTranslator::new(&cfg);
        assert_eq!(t.translate(&Kind::new("NBA")), FeedPath::new("basketball", "nba"));
    }

    #[tokio::test]
    async fn static_feed_filters_by_date() {
        let feed = StaticFeed::new();
        let nfl = FeedPath::new("football", "nfl");
        feed.insert(&nfl, event("1", 1_700_000_000)).unwrap();
        feed.insert(&nfl, event("2", 1_700_200_000)).unwrap();
        let day = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap().date_naive();
        let got = feed.fetch(&nfl, day, day).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "1");
        assert!(got[0].is_final());
        assert_eq!(got[0].home().abbreviation, "HOM");

        feed.fail(&nfl).unwrap();
        assert!(matches!(
            feed.fetch(&nfl, day, day).await.unwrap_err(),
            SpreadbookError::Feed { .. }
        ));
        feed.recover(&nfl).unwrap();
        assert!(feed.fetch(&nfl, day, day).await.is_ok());
        assert_eq!(feed.calls(), 3);
    }

    #[test]
    fn feed_event_json() {
        let json = r#"{
            "id": "401",
            "competitors": [
                {"name": "Florida", "abbreviation": "FLA", "score": "24"},
                {"name": "Utah", "abbreviation": "UTAH", "score": null}
            ],
            "scheduled_at": "2023-08-31T20:00:00Z",
            "status": "in_progress"
        }"#;
        let ev: FeedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(ev.away().score, Some(Decimal::from(24)));
        assert_eq!(ev.home().score, None);
        assert_eq!(ev.status, EventStatus::InProgress);
        assert_eq!(ev.week, 0);
    }
}
