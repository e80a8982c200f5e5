//! One crawl cycle: list -> bounded queue -> fetch slots -> pipeline.
//!
//! A config struct with a `Default` impl, a `CancellationToken` checked
//! at safe points, and structured `tracing` at lifecycle boundaries,
//! the same shape as a poll-dispatch-mark job runner, but draining an
//! eagerly-listed URL set through a bounded channel and a fixed pool
//! of fetch slots instead of polling one job at a time.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use newslook_extraction::error::CrawlResult;
use newslook_extraction::extractor::{ExtractOutcome, Extractor};
use newslook_extraction::pipeline::{Pipeline, PipelineOutcome};
use newslook_extraction::types::article::Source;
use newslook_extraction::types::config::WorkerParams;

use crate::monitor::Monitor;
use crate::status::{CrawlEvent, SourceStatus, WorkerState};

/// Global token-bucket shared across every Worker: a single request-rate
/// budget every source's fetches draw from.
pub type GlobalRateLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Candidate URLs requested per list category. `WorkerParams::max_items`
/// bounds the total number of URLs this cycle fetches, not how many a
/// single list page yields, so it is applied as the item cap below
/// rather than threaded into `list_urls`.
const DEFAULT_MAX_PER_CATEGORY: usize = 50;

/// Base and ceiling for the exponential cooldown applied after a
/// consecutive-failure trip: `min(BASE * 2^attempt, MAX)` seconds.
const COOLDOWN_BASE_SECS: i64 = 30;
const COOLDOWN_MAX_SECS: i64 = 1_800;

fn cooldown_duration(attempt: u32) -> chrono::Duration {
    let secs = COOLDOWN_BASE_SECS.saturating_mul(1i64 << attempt.min(10)).min(COOLDOWN_MAX_SECS);
    chrono::Duration::seconds(secs)
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent fetch slots within this Worker.
    pub concurrency: usize,
    /// Capacity of the bounded work queue between `list_urls` and the
    /// fetch slots; the producer blocks once it is full.
    pub queue_capacity: usize,
    /// Consecutive hard failures before the Worker transitions to
    /// `error` (default 10).
    pub max_consecutive_failures: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 5, queue_capacity: 32, max_consecutive_failures: 10 }
    }
}

/// Runs crawl cycles for exactly one source. Stateless across cycles
/// besides its dependencies; all mutable cycle state lives in the
/// `status` handle the Manager owns and passes in.
pub struct Worker {
    source: String,
    extractor: Arc<dyn Extractor>,
    pipeline: Arc<Pipeline>,
    monitor: Arc<Monitor>,
    rate_limiter: Arc<GlobalRateLimiter>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        source: impl Into<String>,
        extractor: Arc<dyn Extractor>,
        pipeline: Arc<Pipeline>,
        monitor: Arc<Monitor>,
        rate_limiter: Arc<GlobalRateLimiter>,
        config: WorkerConfig,
    ) -> Self {
        Self { source: source.into(), extractor, pipeline, monitor, rate_limiter, config }
    }

    /// Run one end-to-end cycle. Returns once
    /// the work queue is drained, cancellation is observed, or the
    /// consecutive-failure threshold trips the Worker into `error`.
    pub async fn run_cycle(
        &self,
        run_id: String,
        params: WorkerParams,
        status: Arc<RwLock<SourceStatus>>,
        events: broadcast::Sender<CrawlEvent>,
        cancel: CancellationToken,
    ) -> CrawlResult<()> {
        {
            let mut s = status.write().unwrap();
            s.state = WorkerState::Running;
            s.last_run_started = Some(Utc::now());
            s.last_run_finished = None;
            s.items_scanned = 0;
            s.items_stored = 0;
            s.items_skipped_duplicate = 0;
            s.items_skipped_other = 0;
            s.consecutive_failures = 0;
            s.last_error = None;
        }
        let _ = events.send(CrawlEvent::Started { source: self.source.clone(), run_id: run_id.clone() });
        self.extractor.begin_run(&run_id);

        let params = Arc::new(params);

        let urls = match self.extractor.list_urls(&params, DEFAULT_MAX_PER_CATEGORY).await {
            Ok(urls) => urls,
            Err(err) => {
                self.finish_with_error(&status, &events, &run_id, &err.to_string());
                return Err(err);
            }
        };
        info!(source = %self.source, run_id = %run_id, count = urls.len(), "listed candidate urls");

        let source_enum: Source = self.source.parse().unwrap_or(Source::Unknown);
        let consecutive_failures = Arc::new(AtomicU32::new(0));
        let tripped = Arc::new(AtomicBool::new(false));
        let scanned = Arc::new(AtomicU32::new(0));
        let item_cap = params.max_items.map(|n| n as u32);

        let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(self.config.queue_capacity);
        let producer_cancel = cancel.clone();
        let producer = async move {
            for url in urls {
                tokio::select! {
                    _ = producer_cancel.cancelled() => break,
                    send = tx.send(url) => {
                        if send.is_err() {
                            break;
                        }
                    }
                }
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let consumer = async {
            let mut join_set = tokio::task::JoinSet::new();
            loop {
                if tripped.load(Ordering::SeqCst) || cancel.is_cancelled() {
                    break;
                }
                if let Some(cap) = item_cap {
                    if scanned.load(Ordering::SeqCst) >= cap {
                        break;
                    }
                }
                let url = tokio::select! {
                    _ = cancel.cancelled() => break,
                    maybe = rx.recv() => match maybe {
                        Some(url) => url,
                        None => break,
                    },
                };

                let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                let extractor = self.extractor.clone();
                let pipeline = self.pipeline.clone();
                let monitor = self.monitor.clone();
                let rate_limiter = self.rate_limiter.clone();
                let status = status.clone();
                let events = events.clone();
                let source = self.source.clone();
                let run_id = run_id.clone();
                let params = params.clone();
                let consecutive_failures = consecutive_failures.clone();
                let tripped = tripped.clone();
                let scanned = scanned.clone();
                let max_consecutive_failures = self.config.max_consecutive_failures;

                join_set.spawn(async move {
                    let _permit = permit;
                    rate_limiter.until_ready().await;
                    fetch_one(
                        &extractor,
                        &pipeline,
                        &monitor,
                        &status,
                        &events,
                        &source,
                        source_enum,
                        &run_id,
                        &url,
                        &params,
                        &consecutive_failures,
                        &tripped,
                        max_consecutive_failures,
                    )
                    .await;
                    scanned.fetch_add(1, Ordering::SeqCst);
                });
            }
            while join_set.join_next().await.is_some() {}
        };

        tokio::join!(producer, consumer);

        if tripped.load(Ordering::SeqCst) {
            let (message, cooldown_until) = {
                let mut s = status.write().unwrap();
                s.state = WorkerState::Error;
                s.last_run_finished = Some(Utc::now());
                s.cooldown_attempt = s.cooldown_attempt.saturating_add(1);
                let until = Utc::now() + cooldown_duration(s.cooldown_attempt);
                s.cooldown_until = Some(until);
                let message = s.last_error.clone().unwrap_or_else(|| "consecutive failure threshold exceeded".to_string());
                (message, until)
            };
            let _ = events.send(CrawlEvent::Errored { source: self.source.clone(), run_id: run_id.clone(), message });
            warn!(
                source = %self.source, run_id = %run_id, cooldown_until = %cooldown_until,
                "worker entered error state after repeated failures"
            );
            return Ok(());
        }

        if cancel.is_cancelled() {
            let mut s = status.write().unwrap();
            s.state = WorkerState::Stopping;
        }

        {
            let mut s = status.write().unwrap();
            s.state = WorkerState::Idle;
            s.last_run_finished = Some(Utc::now());
            s.cooldown_attempt = 0;
            s.cooldown_until = None;
        }

        if cancel.is_cancelled() {
            let _ = events.send(CrawlEvent::Cancelled { source: self.source.clone(), run_id: run_id.clone() });
        }
        let _ = events.send(CrawlEvent::Finished { source: self.source.clone(), run_id: run_id.clone() });
        debug!(source = %self.source, run_id = %run_id, "cycle finished");
        Ok(())
    }

    fn finish_with_error(
        &self,
        status: &Arc<RwLock<SourceStatus>>,
        events: &broadcast::Sender<CrawlEvent>,
        run_id: &str,
        message: &str,
    ) {
        let mut s = status.write().unwrap();
        s.state = WorkerState::Error;
        s.last_error = Some(message.to_string());
        s.last_run_finished = Some(Utc::now());
        drop(s);
        let _ = events.send(CrawlEvent::Errored {
            source: self.source.clone(),
            run_id: run_id.to_string(),
            message: message.to_string(),
        });
    }
}

/// Fetch, ingest, and account for a single URL. Free function (not a
/// method) so it can be spawned as an owned `'static` future.
#[allow(clippy::too_many_arguments)]
async fn fetch_one(
    extractor: &Arc<dyn Extractor>,
    pipeline: &Arc<Pipeline>,
    monitor: &Arc<Monitor>,
    status: &Arc<RwLock<SourceStatus>>,
    events: &broadcast::Sender<CrawlEvent>,
    source: &str,
    source_enum: Source,
    run_id: &str,
    url: &str,
    params: &WorkerParams,
    consecutive_failures: &Arc<AtomicU32>,
    tripped: &Arc<AtomicBool>,
    max_consecutive_failures: u32,
) {
    let result = extractor.fetch_article(url, params).await;

    match result {
        Ok(ExtractOutcome::Article(draft)) => {
            consecutive_failures.store(0, Ordering::SeqCst);
            match pipeline.ingest(draft, source_enum).await {
                Ok(PipelineOutcome::Stored { id }) => {
                    let mut s = status.write().unwrap();
                    s.items_scanned += 1;
                    s.items_stored += 1;
                    drop(s);
                    let _ = events.send(CrawlEvent::ArticleStored {
                        source: source.to_string(),
                        run_id: run_id.to_string(),
                        id,
                    });
                }
                Ok(PipelineOutcome::Duplicate { id }) => {
                    let mut s = status.write().unwrap();
                    s.items_scanned += 1;
                    s.items_skipped_duplicate += 1;
                    drop(s);
                    let _ = events.send(CrawlEvent::ArticleDuplicate {
                        source: source.to_string(),
                        run_id: run_id.to_string(),
                        id,
                    });
                }
                Ok(PipelineOutcome::Skipped { reason }) => {
                    let mut s = status.write().unwrap();
                    s.items_scanned += 1;
                    s.items_skipped_other += 1;
                    drop(s);
                    let _ = events.send(CrawlEvent::ArticleSkipped {
                        source: source.to_string(),
                        run_id: run_id.to_string(),
                        reason: format!("{reason:?}"),
                    });
                }
                Err(err) => {
                    monitor.record_error(source, err.to_string());
                    let mut s = status.write().unwrap();
                    s.items_scanned += 1;
                    s.last_error = Some(err.to_string());
                }
            }
        }
        Ok(ExtractOutcome::Skip(reason)) => {
            consecutive_failures.store(0, Ordering::SeqCst);
            let mut s = status.write().unwrap();
            s.items_scanned += 1;
            s.items_skipped_other += 1;
            drop(s);
            let _ = events.send(CrawlEvent::ArticleSkipped {
                source: source.to_string(),
                run_id: run_id.to_string(),
                reason: format!("{reason:?}"),
            });
        }
        Err(err) => {
            if err.is_cancelled() {
                return;
            }
            let failures = consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            let mut s = status.write().unwrap();
            s.items_scanned += 1;
            s.consecutive_failures = failures;
            s.last_error = Some(err.to_string());
            drop(s);
            debug!(source, url, error = %err, failures, "article fetch failed");
            if failures >= max_consecutive_failures {
                tripped.store(true, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use governor::Quota;
    use newslook_extraction::error::CrawlError;
    use newslook_extraction::storage::SqliteStorage;
    use newslook_extraction::types::article::DraftArticle;
    use std::num::NonZeroU32;
    use std::sync::atomic::AtomicUsize;

    struct StaticListExtractor {
        urls: Vec<String>,
        fail_urls: std::collections::HashSet<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Extractor for StaticListExtractor {
        async fn list_urls(&self, _params: &WorkerParams, _max_per_category: usize) -> CrawlResult<Vec<String>> {
            Ok(self.urls.clone())
        }

        async fn fetch_article(&self, url: &str, _params: &WorkerParams) -> CrawlResult<ExtractOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_urls.contains(url) {
                return Err(CrawlError::Http { url: url.to_string(), status: 500, retry_after_ms: None });
            }
            let mut draft = DraftArticle::new(url);
            draft.title = "标题".to_string();
            draft.content = "内容内容内容".to_string();
            Ok(ExtractOutcome::Article(draft))
        }

        fn name(&self) -> &str {
            "sina"
        }
    }

    fn rate_limiter() -> Arc<GlobalRateLimiter> {
        Arc::new(GlobalRateLimiter::direct(Quota::per_second(NonZeroU32::new(1_000).unwrap())))
    }

    #[tokio::test]
    async fn fresh_ingest_stores_every_distinct_article() {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let pipeline = Arc::new(Pipeline::new(storage.clone(), Arc::new(newslook_extraction::pipeline::NullSink)));
        let monitor = Arc::new(Monitor::new());
        let extractor = Arc::new(StaticListExtractor {
            urls: vec!["https://x/1".to_string(), "https://x/2".to_string()],
            fail_urls: Default::default(),
            calls: AtomicUsize::new(0),
        });
        let worker = Worker::new(
            "sina",
            extractor,
            pipeline,
            monitor,
            rate_limiter(),
            WorkerConfig::default(),
        );
        let status = Arc::new(RwLock::new(SourceStatus::idle("sina")));
        let (tx, _rx) = broadcast::channel(16);

        worker
            .run_cycle("run-1".to_string(), WorkerParams::default(), status.clone(), tx, CancellationToken::new())
            .await
            .unwrap();

        let s = status.read().unwrap();
        assert_eq!(s.items_stored, 2);
        assert_eq!(s.state, WorkerState::Idle);
        assert_eq!(storage.count(&Default::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn repeated_hard_failures_trip_the_worker_into_error() {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let pipeline = Arc::new(Pipeline::new(storage, Arc::new(newslook_extraction::pipeline::NullSink)));
        let monitor = Arc::new(Monitor::new());
        let urls: Vec<String> = (0..20).map(|i| format!("https://x/{i}")).collect();
        let fail_urls: std::collections::HashSet<String> = urls.iter().cloned().collect();
        let extractor = Arc::new(StaticListExtractor { urls, fail_urls, calls: AtomicUsize::new(0) });
        let mut config = WorkerConfig::default();
        config.max_consecutive_failures = 3;
        config.concurrency = 1;
        let worker = Worker::new("sina", extractor, pipeline, monitor, rate_limiter(), config);
        let status = Arc::new(RwLock::new(SourceStatus::idle("sina")));
        let (tx, _rx) = broadcast::channel(16);

        worker
            .run_cycle("run-1".to_string(), WorkerParams::default(), status.clone(), tx, CancellationToken::new())
            .await
            .unwrap();

        let s = status.read().unwrap();
        assert_eq!(s.state, WorkerState::Error);
        assert!(s.consecutive_failures >= 3);
        assert_eq!(s.cooldown_attempt, 1);
        assert!(s.cooldown_until.is_some_and(|until| until > Utc::now()));
    }

    #[tokio::test]
    async fn duplicate_candidate_is_counted_and_leaves_storage_unchanged() {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let pipeline = Arc::new(Pipeline::new(storage.clone(), Arc::new(newslook_extraction::pipeline::NullSink)));
        let monitor = Arc::new(Monitor::new());
        let extractor = Arc::new(StaticListExtractor {
            urls: vec!["https://x/1".to_string(), "https://x/1".to_string()],
            fail_urls: Default::default(),
            calls: AtomicUsize::new(0),
        });
        let worker = Worker::new(
            "sina",
            extractor,
            pipeline,
            monitor,
            rate_limiter(),
            WorkerConfig { concurrency: 1, ..WorkerConfig::default() },
        );
        let status = Arc::new(RwLock::new(SourceStatus::idle("sina")));
        let (tx, _rx) = broadcast::channel(16);

        worker
            .run_cycle("run-1".to_string(), WorkerParams::default(), status.clone(), tx, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(storage.count(&Default::default()).await.unwrap(), 1);
        let s = status.read().unwrap();
        assert_eq!(s.items_skipped_duplicate, 1);
    }
}
