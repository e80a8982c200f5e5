//! Scheduler: drives the Manager on cron-like
//! schedules, recording run history and skipping a tick when the
//! target source is already running.
//!
//! Built on `tokio_cron_scheduler::{Job, JobScheduler}`, one
//! `Job::new_async` per schedule entry, structured `tracing` on tick.
//! Schedules can be registered once at startup, but `add`/`remove` also
//! work at runtime so the Control/Query Facade's
//! `schedule_add`/`schedule_remove` can back onto it directly.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

use newslook_extraction::types::config::WorkerParams;

use crate::manager::Manager;
use crate::status::WorkerState;

/// Bounded ring buffer size for schedule run history.
const MAX_RUN_HISTORY: usize = 200;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("schedule '{0}' already exists")]
    DuplicateName(String),
    #[error("unknown schedule '{0}'")]
    UnknownName(String),
    #[error("invalid cron expression for '{name}': {reason}")]
    InvalidCron { name: String, reason: String },
    #[error("scheduler backend error: {0}")]
    Backend(String),
}

/// A stored schedule entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub name: String,
    pub cron_expr: String,
    pub source: String,
    pub params: WorkerParams,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleOutcome {
    Started,
    SkippedAlreadyRunning,
    SkippedCooldown,
    Failed(String),
}

/// One recorded tick: did it fire, was it skipped because the source
/// was already running, or did dispatch fail. Counts and terminal
/// state for the run itself live in `Monitor`/`status()`, keyed by
/// `source` and `tick_at`; this record is only the schedule-side half.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRun {
    pub name: String,
    pub source: String,
    pub tick_at: DateTime<Utc>,
    pub outcome: ScheduleOutcome,
}

struct Registered {
    entry: ScheduleEntry,
    job_id: Uuid,
}

/// Wraps `tokio_cron_scheduler` to drive a [`Manager`] on named,
/// independently enable/disable-able schedules. Missed
/// ticks are not backfilled; at most one invocation per source is
/// active because each tick re-checks `Manager::status_one` first.
pub struct Scheduler {
    inner: JobScheduler,
    manager: Arc<Manager>,
    entries: Mutex<HashMap<String, Registered>>,
    history: Arc<Mutex<VecDeque<ScheduleRun>>>,
}

impl Scheduler {
    pub async fn new(manager: Arc<Manager>) -> Result<Self, SchedulerError> {
        let inner = JobScheduler::new().await.map_err(|e| SchedulerError::Backend(e.to_string()))?;
        inner.start().await.map_err(|e| SchedulerError::Backend(e.to_string()))?;
        Ok(Self { inner, manager, entries: Mutex::new(HashMap::new()), history: Arc::new(Mutex::new(VecDeque::new())) })
    }

    /// Register a new schedule entry and arm its cron job. Disabled
    /// entries (`enabled: false`) are stored but never ticked until
    /// re-added with `enabled: true`.
    pub async fn add(&self, entry: ScheduleEntry) -> Result<(), SchedulerError> {
        {
            let entries = self.entries.lock().unwrap();
            if entries.contains_key(&entry.name) {
                return Err(SchedulerError::DuplicateName(entry.name));
            }
        }

        if !entry.enabled {
            self.entries.lock().unwrap().insert(
                entry.name.clone(),
                Registered { entry, job_id: Uuid::nil() },
            );
            return Ok(());
        }

        let manager = self.manager.clone();
        let history = self.history.clone();
        let name = entry.name.clone();
        let source = entry.source.clone();
        let params = entry.params.clone();
        let cron_expr = entry.cron_expr.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let manager = manager.clone();
            let history = history.clone();
            let name = name.clone();
            let source = source.clone();
            let params = params.clone();
            Box::pin(async move {
                tick(&manager, &history, &name, &source, params).await;
            })
        })
        .map_err(|e| SchedulerError::InvalidCron { name: entry.name.clone(), reason: e.to_string() })?;

        let job_id = self.inner.add(job).await.map_err(|e| SchedulerError::Backend(e.to_string()))?;
        info!(name = %entry.name, cron = %entry.cron_expr, source = %entry.source, "schedule armed");
        self.entries.lock().unwrap().insert(entry.name.clone(), Registered { entry, job_id });
        Ok(())
    }

    /// Disarm and forget a schedule entry.
    pub async fn remove(&self, name: &str) -> Result<(), SchedulerError> {
        let registered = {
            let mut entries = self.entries.lock().unwrap();
            entries.remove(name).ok_or_else(|| SchedulerError::UnknownName(name.to_string()))?
        };
        if registered.job_id != Uuid::nil() {
            self.inner
                .remove(&registered.job_id)
                .await
                .map_err(|e| SchedulerError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    /// All stored entries, sorted by name.
    pub fn list(&self) -> Vec<ScheduleEntry> {
        let mut entries: Vec<ScheduleEntry> =
            self.entries.lock().unwrap().values().map(|r| r.entry.clone()).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Most recent ticks, newest first, capped at `limit`.
    pub fn run_history(&self, limit: usize) -> Vec<ScheduleRun> {
        let history = self.history.lock().unwrap();
        history.iter().rev().take(limit).cloned().collect()
    }
}

async fn tick(
    manager: &Arc<Manager>,
    history: &Arc<Mutex<VecDeque<ScheduleRun>>>,
    name: &str,
    source: &str,
    params: WorkerParams,
) {
    let tick_at = Utc::now();
    let current_status = manager.status_one(source).await.ok();

    let outcome = if current_status.as_ref().is_some_and(|s| s.state == WorkerState::Running) {
        info!(name, source, "schedule tick skipped: source already running");
        ScheduleOutcome::SkippedAlreadyRunning
    } else if current_status.as_ref().is_some_and(|s| s.in_cooldown()) {
        info!(name, source, "schedule tick skipped: source cooling down after a trip");
        ScheduleOutcome::SkippedCooldown
    } else {
        match manager.start(Some(source), params).await {
            Ok(_) => ScheduleOutcome::Started,
            Err(err) => {
                warn!(name, source, error = %err, "schedule tick failed to start worker");
                ScheduleOutcome::Failed(err.to_string())
            }
        }
    };

    let mut history = history.lock().unwrap();
    if history.len() == MAX_RUN_HISTORY {
        history.pop_front();
    }
    history.push_back(ScheduleRun { name: name.to_string(), source: source.to_string(), tick_at, outcome });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use governor::clock::DefaultClock;
    use governor::state::{InMemoryState, NotKeyed};
    use governor::Quota;
    use newslook_extraction::error::CrawlResult;
    use newslook_extraction::extractor::{ExtractOutcome, Extractor};
    use newslook_extraction::pipeline::Pipeline;
    use newslook_extraction::storage::SqliteStorage;
    use newslook_extraction::types::article::SkipReason;
    use std::num::NonZeroU32;

    use crate::manager::SourceRegistration;
    use crate::monitor::Monitor;
    use crate::worker::WorkerConfig;

    struct EmptyExtractor;

    #[async_trait]
    impl Extractor for EmptyExtractor {
        async fn list_urls(&self, _params: &WorkerParams, _max_per_category: usize) -> CrawlResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn fetch_article(&self, _url: &str, _params: &WorkerParams) -> CrawlResult<ExtractOutcome> {
            Ok(ExtractOutcome::Skip(SkipReason::Empty))
        }
        fn name(&self) -> &str {
            "sina"
        }
    }

    struct AlwaysFailingExtractor;

    #[async_trait]
    impl Extractor for AlwaysFailingExtractor {
        async fn list_urls(&self, _params: &WorkerParams, _max_per_category: usize) -> CrawlResult<Vec<String>> {
            Ok(vec!["https://x/1".to_string()])
        }
        async fn fetch_article(&self, url: &str, _params: &WorkerParams) -> CrawlResult<ExtractOutcome> {
            Err(newslook_extraction::error::CrawlError::Http {
                url: url.to_string(),
                status: 500,
                retry_after_ms: None,
            })
        }
        fn name(&self) -> &str {
            "sina"
        }
    }

    async fn failing_test_manager() -> Arc<Manager> {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let monitor = Arc::new(Monitor::new());
        let pipeline = Arc::new(Pipeline::new(storage, monitor.clone()));
        let rate_limiter = Arc::new(governor::RateLimiter::<NotKeyed, InMemoryState, DefaultClock>::direct(
            Quota::per_second(NonZeroU32::new(1_000).unwrap()),
        ));
        Arc::new(Manager::new(
            vec![SourceRegistration {
                name: "sina".to_string(),
                extractor: Arc::new(AlwaysFailingExtractor),
                config: WorkerConfig { concurrency: 1, max_consecutive_failures: 1, ..WorkerConfig::default() },
            }],
            pipeline,
            monitor,
            rate_limiter,
        ))
    }

    async fn test_manager() -> Arc<Manager> {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let monitor = Arc::new(Monitor::new());
        let pipeline = Arc::new(Pipeline::new(storage, monitor.clone()));
        let rate_limiter = Arc::new(governor::RateLimiter::<NotKeyed, InMemoryState, DefaultClock>::direct(
            Quota::per_second(NonZeroU32::new(1_000).unwrap()),
        ));
        Arc::new(Manager::new(
            vec![SourceRegistration {
                name: "sina".to_string(),
                extractor: Arc::new(EmptyExtractor),
                config: WorkerConfig::default(),
            }],
            pipeline,
            monitor,
            rate_limiter,
        ))
    }

    fn entry(name: &str) -> ScheduleEntry {
        ScheduleEntry {
            name: name.to_string(),
            cron_expr: "0 0 * * * *".to_string(),
            source: "sina".to_string(),
            params: WorkerParams::default(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn adding_a_duplicate_name_is_rejected() {
        let scheduler = Scheduler::new(test_manager().await).await.unwrap();
        scheduler.add(entry("nightly")).await.unwrap();
        let result = scheduler.add(entry("nightly")).await;
        assert!(matches!(result, Err(SchedulerError::DuplicateName(_))));
    }

    #[tokio::test]
    async fn invalid_cron_expression_is_rejected() {
        let scheduler = Scheduler::new(test_manager().await).await.unwrap();
        let mut bad = entry("bad");
        bad.cron_expr = "not a cron expr".to_string();
        let result = scheduler.add(bad).await;
        assert!(matches!(result, Err(SchedulerError::InvalidCron { .. })));
    }

    #[tokio::test]
    async fn remove_unregisters_an_entry() {
        let scheduler = Scheduler::new(test_manager().await).await.unwrap();
        scheduler.add(entry("nightly")).await.unwrap();
        scheduler.remove("nightly").await.unwrap();
        assert!(scheduler.list().is_empty());
        assert!(matches!(scheduler.remove("nightly").await, Err(SchedulerError::UnknownName(_))));
    }

    #[tokio::test]
    async fn list_returns_entries_sorted_by_name() {
        let scheduler = Scheduler::new(test_manager().await).await.unwrap();
        scheduler.add(entry("zzz")).await.unwrap();
        scheduler.add(entry("aaa")).await.unwrap();
        let names: Vec<String> = scheduler.list().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["aaa".to_string(), "zzz".to_string()]);
    }

    #[tokio::test]
    async fn tick_skips_a_source_cooling_down_after_a_trip() {
        let manager = failing_test_manager().await;
        let history = Arc::new(Mutex::new(VecDeque::new()));

        tick(&manager, &history, "nightly", "sina", WorkerParams::default()).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let status = manager.status_one("sina").await.unwrap();
        assert_eq!(status.state, crate::status::WorkerState::Error);
        assert!(status.cooldown_until.is_some());

        tick(&manager, &history, "nightly", "sina", WorkerParams::default()).await;
        let runs = history.lock().unwrap();
        assert_eq!(runs.back().unwrap().outcome, ScheduleOutcome::SkippedCooldown);
    }
}
