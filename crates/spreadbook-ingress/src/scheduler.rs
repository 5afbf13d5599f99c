//! One-shot job scheduling contract.
//!
//! A rule name identifies a job; scheduling the same name again replaces
//! the earlier registration. Jobs carry a JSON payload that the handler
//! decodes when the job fires.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spreadbook_types::{Result, SpreadbookError};
use tracing::debug;

/// A registered one-shot job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub rule_name: String,
    pub fire_at: DateTime<Utc>,
    pub payload: Value,
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Register (or replace) the job named `job.rule_name`.
    async fn schedule(&self, job: ScheduledJob) -> Result<()>;

    /// Remove the job; removing an unknown rule is not an error.
    async fn cancel(&self, rule_name: &str) -> Result<()>;
}

/// Process-local scheduler. Nothing fires on its own; callers poll
/// [`InMemoryScheduler::due`].
#[derive(Default)]
pub struct InMemoryScheduler {
    jobs: Mutex<BTreeMap<String, ScheduledJob>>,
}

impl InMemoryScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs_guard(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, ScheduledJob>>> {
        self.jobs
            .lock()
            .map_err(|_| SpreadbookError::Internal("scheduler mutex poisoned".into()))
    }

    /// Every registered job, ordered by rule name.
    pub fn jobs(&self) -> Result<Vec<ScheduledJob>> {
        Ok(self.jobs_guard()?.values().cloned().collect())
    }

    /// Jobs whose fire time is at or before `now`, earliest first.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>> {
        let mut due: Vec<ScheduledJob> = self
            .jobs_guard()?
            .values()
            .filter(|job| job.fire_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|job| job.fire_at);
        Ok(due)
    }
}

#[async_trait]
impl Scheduler for InMemoryScheduler {
    async fn schedule(&self, job: ScheduledJob) -> Result<()> {
        debug!(rule = %job.rule_name, fire_at = %job.fire_at, "job scheduled");
        self.jobs_guard()?.insert(job.rule_name.clone(), job);
        Ok(())
    }

    async fn cancel(&self, rule_name: &str) -> Result<()> {
        if self.jobs_guard()?.remove(rule_name).is_some() {
            debug!(rule = rule_name, "job removed");
        }
        Ok(())
    }
}
