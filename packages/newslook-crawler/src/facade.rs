//! Control/Query Facade: the stable surface an
//! HTTP/JSON API layer composes against. Every method here maps
//! directly to one row of the operation table.
//!
//! A thin composition struct over independently-testable services: one
//! struct holding `Arc`s to every subsystem, with no business logic of
//! its own.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use newslook_extraction::error::CrawlError;
use newslook_extraction::storage::SqliteStorage;
use newslook_extraction::types::article::{Article, Source};
use newslook_extraction::types::config::QueryFilter;

use crate::manager::{Manager, ManagerError};
use crate::monitor::{Monitor, MonitorSnapshot};
use crate::scheduler::{ScheduleEntry, ScheduleRun, Scheduler, SchedulerError};
use crate::status::SourceStatus;

/// Structured error surfaced to API callers: control-API operations
/// return structured error objects `{code, message, detail?}`.
/// `code` follows the crate's `CrawlError` taxonomy; 4xx/5xx mapping is
/// the HTTP layer's job, not this facade's.
#[derive(Debug, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct FacadeError {
    pub code: &'static str,
    pub message: String,
    pub detail: Option<String>,
}

impl FacadeError {
    fn validation(message: impl Into<String>) -> Self {
        Self { code: "ValidationError", message: message.into(), detail: None }
    }

    fn storage(err: CrawlError) -> Self {
        Self { code: "StorageError", message: "storage operation failed".to_string(), detail: Some(err.to_string()) }
    }
}

impl From<CrawlError> for FacadeError {
    fn from(err: CrawlError) -> Self {
        FacadeError::storage(err)
    }
}

impl From<ManagerError> for FacadeError {
    fn from(err: ManagerError) -> Self {
        let code = match &err {
            ManagerError::AlreadyRunning(_) => "AlreadyRunning",
            ManagerError::UnknownSource(_) => "UnknownSource",
            ManagerError::NotRunning(_) => "NotRunning",
            ManagerError::Cooldown { .. } => "Cooldown",
        };
        Self { code, message: err.to_string(), detail: None }
    }
}

impl From<SchedulerError> for FacadeError {
    fn from(err: SchedulerError) -> Self {
        let code = match &err {
            SchedulerError::DuplicateName(_) => "DuplicateSchedule",
            SchedulerError::UnknownName(_) => "UnknownSchedule",
            SchedulerError::InvalidCron { .. } => "InvalidCron",
            SchedulerError::Backend(_) => "SchedulerBackend",
        };
        Self { code, message: err.to_string(), detail: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedArticles {
    pub items: Vec<Article>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub uptime_s: u64,
    pub db_ok: bool,
    pub news_count: i64,
    pub sources: Vec<String>,
}

/// The stable contract an HTTP/JSON layer (or a CLI's `status`/`query`
/// subcommands) is written against, never the concrete types directly.
#[async_trait::async_trait]
pub trait ControlQueryFacade: Send + Sync {
    async fn query_news(&self, filter: QueryFilter, page: u32, page_size: u32) -> Result<PagedArticles, FacadeError>;
    async fn get_news(&self, id: &str) -> Result<Article, FacadeError>;
    async fn list_sources(&self) -> Result<Vec<String>, FacadeError>;
    async fn list_categories(&self) -> Result<Vec<String>, FacadeError>;
    async fn count(&self, filter: QueryFilter) -> Result<i64, FacadeError>;
    async fn trends(&self, date_from: Option<chrono::DateTime<chrono::Utc>>, date_to: Option<chrono::DateTime<chrono::Utc>>) -> Result<Vec<(String, i64)>, FacadeError>;
    async fn top_keywords(&self, date_from: Option<chrono::DateTime<chrono::Utc>>, date_to: Option<chrono::DateTime<chrono::Utc>>, k: i64) -> Result<Vec<(String, i64)>, FacadeError>;

    async fn start(&self, source: Option<&str>, params: newslook_extraction::types::config::WorkerParams) -> Result<(), FacadeError>;
    async fn stop(&self, source: Option<&str>) -> Result<(), FacadeError>;
    async fn status(&self) -> std::collections::HashMap<String, SourceStatus>;

    async fn schedule_list(&self) -> Vec<ScheduleEntry>;
    async fn schedule_add(&self, entry: ScheduleEntry) -> Result<(), FacadeError>;
    async fn schedule_remove(&self, name: &str) -> Result<(), FacadeError>;
    fn schedule_history(&self, limit: usize) -> Vec<ScheduleRun>;

    async fn health(&self) -> Result<HealthReport, FacadeError>;
    fn metrics_snapshot(&self) -> MonitorSnapshot;
}

/// Default implementation composing the Storage layer, Manager,
/// Scheduler, and Monitor. Holds no state of its own
/// besides the `Arc`s to those subsystems.
pub struct NewsLookFacade {
    storage: Arc<SqliteStorage>,
    manager: Arc<Manager>,
    scheduler: Arc<Scheduler>,
    monitor: Arc<Monitor>,
}

impl NewsLookFacade {
    pub fn new(storage: Arc<SqliteStorage>, manager: Arc<Manager>, scheduler: Arc<Scheduler>, monitor: Arc<Monitor>) -> Self {
        Self { storage, manager, scheduler, monitor }
    }
}

#[async_trait::async_trait]
impl ControlQueryFacade for NewsLookFacade {
    async fn query_news(&self, filter: QueryFilter, page: u32, page_size: u32) -> Result<PagedArticles, FacadeError> {
        if page == 0 {
            return Err(FacadeError::validation("page must be >= 1"));
        }
        let page_size = page_size.clamp(1, 100);
        let (items, total) = self.storage.query(&filter, page, page_size).await?;
        Ok(PagedArticles { items, total, page, page_size })
    }

    async fn get_news(&self, id: &str) -> Result<Article, FacadeError> {
        self.storage
            .get_by_id(id)
            .await?
            .ok_or_else(|| FacadeError { code: "NotFound", message: format!("no article with id {id}"), detail: None })
    }

    async fn list_sources(&self) -> Result<Vec<String>, FacadeError> {
        Ok(self.storage.list_sources().await?)
    }

    async fn list_categories(&self) -> Result<Vec<String>, FacadeError> {
        Ok(self.storage.list_categories().await?)
    }

    async fn count(&self, filter: QueryFilter) -> Result<i64, FacadeError> {
        Ok(self.storage.count(&filter).await?)
    }

    async fn trends(&self, date_from: Option<chrono::DateTime<chrono::Utc>>, date_to: Option<chrono::DateTime<chrono::Utc>>) -> Result<Vec<(String, i64)>, FacadeError> {
        Ok(self.storage.trends(date_from, date_to).await?)
    }

    async fn top_keywords(&self, date_from: Option<chrono::DateTime<chrono::Utc>>, date_to: Option<chrono::DateTime<chrono::Utc>>, k: i64) -> Result<Vec<(String, i64)>, FacadeError> {
        if k <= 0 {
            return Err(FacadeError::validation("k must be positive"));
        }
        Ok(self.storage.top_keywords(date_from, date_to, k).await?)
    }

    async fn start(&self, source: Option<&str>, params: newslook_extraction::types::config::WorkerParams) -> Result<(), FacadeError> {
        let outcomes = self.manager.start(source, params).await?;
        first_error(outcomes)
    }

    async fn stop(&self, source: Option<&str>) -> Result<(), FacadeError> {
        let outcomes = self.manager.stop(source).await?;
        first_error(outcomes)
    }

    async fn status(&self) -> std::collections::HashMap<String, SourceStatus> {
        self.manager.status().await
    }

    async fn schedule_list(&self) -> Vec<ScheduleEntry> {
        self.scheduler.list()
    }

    async fn schedule_add(&self, entry: ScheduleEntry) -> Result<(), FacadeError> {
        Ok(self.scheduler.add(entry).await?)
    }

    async fn schedule_remove(&self, name: &str) -> Result<(), FacadeError> {
        Ok(self.scheduler.remove(name).await?)
    }

    fn schedule_history(&self, limit: usize) -> Vec<ScheduleRun> {
        self.scheduler.run_history(limit)
    }

    async fn health(&self) -> Result<HealthReport, FacadeError> {
        let health = self.storage.health().await?;
        let sources = self.manager.known_sources().await;
        Ok(HealthReport {
            status: if health.integrity_ok { "ok" } else { "degraded" },
            uptime_s: self.monitor.snapshot().uptime_s,
            db_ok: health.integrity_ok,
            news_count: health.news_count,
            sources,
        })
    }

    fn metrics_snapshot(&self) -> MonitorSnapshot {
        self.monitor.snapshot()
    }
}

/// `Manager::start`/`stop` report per-source outcomes for an `all`
/// fan-out individually; the Facade's single `Result` surfaces the
/// first failure so callers get one typed error without losing which
/// source caused it (the per-source detail lands in `FacadeError::detail`).
fn first_error(outcomes: Vec<(String, Result<(), ManagerError>)>) -> Result<(), FacadeError> {
    for (source, outcome) in outcomes {
        if let Err(err) = outcome {
            let mut facade_err: FacadeError = err.into();
            facade_err.detail = Some(format!("source: {source}"));
            return Err(facade_err);
        }
    }
    Ok(())
}

/// Re-classify an article's source after ingestion correction; exposed
/// here rather than on `ControlQueryFacade` since it is an operator
/// maintenance action, not part of the API surface.
impl NewsLookFacade {
    pub async fn reclassify_source(&self, id: &str, source: Source) -> Result<bool, FacadeError> {
        Ok(self.storage.reclassify_source(id, source).await?)
    }
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
    use newslook_extraction::types::article::SkipReason;
    use newslook_extraction::types::config::WorkerParams;
    use std::num::NonZeroU32;

    use crate::manager::SourceRegistration;
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

    async fn test_facade() -> NewsLookFacade {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let monitor = Arc::new(Monitor::new());
        let pipeline = Arc::new(Pipeline::new(storage.clone(), monitor.clone()));
        let rate_limiter = Arc::new(governor::RateLimiter::<NotKeyed, InMemoryState, DefaultClock>::direct(
            Quota::per_second(NonZeroU32::new(1_000).unwrap()),
        ));
        let manager = Arc::new(Manager::new(
            vec![SourceRegistration {
                name: "sina".to_string(),
                extractor: Arc::new(EmptyExtractor),
                config: WorkerConfig::default(),
            }],
            pipeline,
            monitor.clone(),
            rate_limiter,
        ));
        let scheduler = Arc::new(Scheduler::new(manager.clone()).await.unwrap());
        NewsLookFacade::new(storage, manager, scheduler, monitor)
    }

    #[tokio::test]
    async fn query_news_rejects_zero_page() {
        let facade = test_facade().await;
        let result = facade.query_news(QueryFilter::default(), 0, 20).await;
        assert!(matches!(result, Err(FacadeError { code: "ValidationError", .. })));
    }

    #[tokio::test]
    async fn get_news_reports_not_found_for_unknown_id() {
        let facade = test_facade().await;
        let result = facade.get_news("does-not-exist").await;
        assert!(matches!(result, Err(FacadeError { code: "NotFound", .. })));
    }

    #[tokio::test]
    async fn health_reports_zero_articles_on_a_fresh_store() {
        let facade = test_facade().await;
        let health = facade.health().await.unwrap();
        assert_eq!(health.news_count, 0);
        assert!(health.db_ok);
    }

    #[tokio::test]
    async fn schedule_add_then_remove_round_trips() {
        let facade = test_facade().await;
        facade
            .schedule_add(ScheduleEntry {
                name: "nightly".to_string(),
                cron_expr: "0 0 0 * * *".to_string(),
                source: "sina".to_string(),
                params: Default::default(),
                enabled: true,
            })
            .await
            .unwrap();
        assert_eq!(facade.schedule_list().await.len(), 1);
        facade.schedule_remove("nightly").await.unwrap();
        assert!(facade.schedule_list().await.is_empty());
    }

    #[tokio::test]
    async fn starting_unknown_source_surfaces_typed_error() {
        let facade = test_facade().await;
        let result = facade.start(Some("not-a-source"), Default::default()).await;
        assert!(matches!(result, Err(FacadeError { code: "UnknownSource", .. })));
    }
}
