//! Lineage & Health Monitor.
//!
//! Fed from two directions: the HTTP Client reports every fetch
//! attempt through the [`FetchSink`] impl below, and the ingestion
//! pipeline reports every article outcome through [`PipelineSink`].
//! Lock-free reads via copy-on-read snapshots so the Control/Query
//! Facade never blocks behind an in-flight crawl cycle.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use newslook_extraction::pipeline::{PipelineOutcome, PipelineSink};
use newslook_extraction::types::fetch::{FetchOutcome, FetchResult, FetchSink};

/// Exponential latency bucket upper bounds in milliseconds.
const LATENCY_BUCKETS_MS: [u64; 10] = [10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000];

/// Bounded ring buffer size for recent errors kept per source.
const MAX_RECENT_ERRORS: usize = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyHistogram {
    /// Count of samples in `(LATENCY_BUCKETS_MS[i-1], LATENCY_BUCKETS_MS[i]]`,
    /// with bucket 0 covering `[0, LATENCY_BUCKETS_MS[0]]` and the last
    /// entry covering everything above the final bound.
    pub buckets: Vec<u64>,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self { buckets: vec![0; LATENCY_BUCKETS_MS.len() + 1] }
    }

    fn record(&mut self, elapsed_ms: u64) {
        let idx = LATENCY_BUCKETS_MS
            .iter()
            .position(|&bound| elapsed_ms <= bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.buckets[idx] += 1;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentError {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Rolling metrics for one source, copy-on-read via [`Monitor::snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetrics {
    pub requests_attempted: u64,
    pub requests_ok: u64,
    pub requests_failed: u64,
    pub requests_retried: u64,
    pub bytes_downloaded: u64,
    pub items_scanned: u64,
    pub items_stored: u64,
    pub items_duplicate: u64,
    pub items_skipped: u64,
    pub latency: LatencyHistogram,
    pub recent_errors: Vec<RecentError>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl Default for SourceMetrics {
    fn default() -> Self {
        Self {
            requests_attempted: 0,
            requests_ok: 0,
            requests_failed: 0,
            requests_retried: 0,
            bytes_downloaded: 0,
            items_scanned: 0,
            items_stored: 0,
            items_duplicate: 0,
            items_skipped: 0,
            latency: LatencyHistogram::new(),
            recent_errors: Vec::new(),
            last_success_at: None,
        }
    }
}

struct Inner {
    requests_attempted: u64,
    requests_ok: u64,
    requests_failed: u64,
    requests_retried: u64,
    bytes_downloaded: u64,
    items_scanned: u64,
    items_stored: u64,
    items_duplicate: u64,
    items_skipped: u64,
    latency: LatencyHistogram,
    recent_errors: VecDeque<RecentError>,
    last_success_at: Option<DateTime<Utc>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            requests_attempted: 0,
            requests_ok: 0,
            requests_failed: 0,
            requests_retried: 0,
            bytes_downloaded: 0,
            items_scanned: 0,
            items_stored: 0,
            items_duplicate: 0,
            items_skipped: 0,
            latency: LatencyHistogram::new(),
            recent_errors: VecDeque::with_capacity(MAX_RECENT_ERRORS),
            last_success_at: None,
        }
    }
}

impl Inner {
    fn snapshot(&self) -> SourceMetrics {
        SourceMetrics {
            requests_attempted: self.requests_attempted,
            requests_ok: self.requests_ok,
            requests_failed: self.requests_failed,
            requests_retried: self.requests_retried,
            bytes_downloaded: self.bytes_downloaded,
            items_scanned: self.items_scanned,
            items_stored: self.items_stored,
            items_duplicate: self.items_duplicate,
            items_skipped: self.items_skipped,
            latency: self.latency.clone(),
            recent_errors: self.recent_errors.iter().cloned().collect(),
            last_success_at: self.last_success_at,
        }
    }

    fn push_error(&mut self, message: String) {
        if self.recent_errors.len() == MAX_RECENT_ERRORS {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(RecentError { timestamp: Utc::now(), message });
    }
}

/// Snapshot returned by [`Monitor::snapshot`]: global totals plus the
/// per-source breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub uptime_s: u64,
    pub sources: HashMap<String, SourceMetrics>,
}

/// In-memory rolling metrics per source and globally, built up from
/// every `FetchOutcome`. Per-source `Mutex` guards each counter set;
/// the outer `RwLock` only contends on first-touch of a new source.
pub struct Monitor {
    sources: RwLock<HashMap<String, Mutex<Inner>>>,
    started_at: Instant,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    pub fn new() -> Self {
        Self { sources: RwLock::new(HashMap::new()), started_at: Instant::now() }
    }

    fn with_source<R>(&self, source: &str, f: impl FnOnce(&mut Inner) -> R) -> R {
        if let Some(lock) = self.sources.read().unwrap().get(source) {
            return f(&mut lock.lock().unwrap());
        }
        let mut sources = self.sources.write().unwrap();
        let entry = sources.entry(source.to_string()).or_insert_with(|| Mutex::new(Inner::default()));
        f(&mut entry.lock().unwrap())
    }

    /// Append one HTTP attempt's `FetchOutcome`.
    pub fn record_fetch_outcome(&self, outcome: &FetchOutcome) {
        self.with_source(&outcome.source, |inner| {
            inner.requests_attempted += 1;
            inner.bytes_downloaded += outcome.bytes as u64;
            inner.latency.record(outcome.elapsed_ms);
            match outcome.result {
                FetchResult::Ok => {
                    inner.requests_ok += 1;
                    inner.last_success_at = Some(outcome.timestamp);
                }
                FetchResult::Retry => inner.requests_retried += 1,
                FetchResult::Fail => {
                    inner.requests_failed += 1;
                    inner.push_error(format!(
                        "fetch failed: {} (status={:?}, attempt={})",
                        outcome.url, outcome.http_status, outcome.attempt
                    ));
                }
            }
        });
    }

    /// Record a per-article skip/ingestion error that never reached the
    /// HTTP layer (parse/validation failures).
    pub fn record_error(&self, source: &str, message: impl Into<String>) {
        let message = message.into();
        self.with_source(source, |inner| inner.push_error(message));
    }

    /// Copy-on-read snapshot of all sources plus process uptime.
    pub fn snapshot(&self) -> MonitorSnapshot {
        let sources = self.sources.read().unwrap();
        MonitorSnapshot {
            uptime_s: self.started_at.elapsed().as_secs(),
            sources: sources.iter().map(|(k, v)| (k.clone(), v.lock().unwrap().snapshot())).collect(),
        }
    }

    pub fn source_snapshot(&self, source: &str) -> Option<SourceMetrics> {
        self.sources.read().unwrap().get(source).map(|lock| lock.lock().unwrap().snapshot())
    }
}

/// Lets the Monitor plug directly into `HttpClient` as its [`FetchSink`],
/// so every retry attempt is counted, not just the terminal outcome of
/// a whole fetch.
impl FetchSink for Monitor {
    fn fetch_outcome(&self, outcome: &FetchOutcome) {
        self.record_fetch_outcome(outcome);
    }
}

/// Lets the Monitor plug directly into `Pipeline` as its [`PipelineSink`],
/// counting scanned/stored/duplicate/skipped outcomes without the
/// pipeline depending on the Monitor's concrete type.
impl PipelineSink for Monitor {
    fn article_outcome(&self, source: &str, outcome: &PipelineOutcome) {
        self.with_source(source, |inner| {
            inner.items_scanned += 1;
            match outcome {
                PipelineOutcome::Stored { .. } => inner.items_stored += 1,
                PipelineOutcome::Duplicate { .. } => inner.items_duplicate += 1,
                PipelineOutcome::Skipped { .. } => inner.items_skipped += 1,
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_outcome(source: &str, elapsed_ms: u64) -> FetchOutcome {
        FetchOutcome::new("https://x/1", source, "run-1", 1, FetchResult::Ok)
            .with_status(200)
            .with_bytes(1024)
            .with_elapsed_ms(elapsed_ms)
    }

    #[test]
    fn record_fetch_outcome_updates_source_counters() {
        let monitor = Monitor::new();
        monitor.record_fetch_outcome(&ok_outcome("sina", 42));
        let snap = monitor.source_snapshot("sina").unwrap();
        assert_eq!(snap.requests_ok, 1);
        assert_eq!(snap.bytes_downloaded, 1024);
        assert!(snap.last_success_at.is_some());
    }

    #[test]
    fn failed_fetch_is_recorded_as_recent_error() {
        let monitor = Monitor::new();
        let fail = FetchOutcome::new("https://x/1", "sina", "run-1", 3, FetchResult::Fail)
            .with_elapsed_ms(10);
        monitor.record_fetch_outcome(&fail);
        let snap = monitor.source_snapshot("sina").unwrap();
        assert_eq!(snap.requests_failed, 1);
        assert_eq!(snap.recent_errors.len(), 1);
    }

    #[test]
    fn pipeline_sink_counts_stored_and_duplicate_outcomes() {
        let monitor = Monitor::new();
        monitor.article_outcome("sina", &PipelineOutcome::Stored { id: "a".into() });
        monitor.article_outcome("sina", &PipelineOutcome::Duplicate { id: "a".into() });
        let snap = monitor.source_snapshot("sina").unwrap();
        assert_eq!(snap.items_scanned, 2);
        assert_eq!(snap.items_stored, 1);
        assert_eq!(snap.items_duplicate, 1);
    }

    #[test]
    fn latency_histogram_buckets_by_exponential_bounds() {
        let monitor = Monitor::new();
        monitor.record_fetch_outcome(&ok_outcome("sina", 5));
        monitor.record_fetch_outcome(&ok_outcome("sina", 9_000));
        monitor.record_fetch_outcome(&ok_outcome("sina", 50_000));
        let snap = monitor.source_snapshot("sina").unwrap();
        assert_eq!(snap.latency.buckets[0], 1);
        assert_eq!(snap.latency.buckets.last().copied().unwrap(), 1);
    }

    #[test]
    fn snapshot_reflects_multiple_sources_independently() {
        let monitor = Monitor::new();
        monitor.record_fetch_outcome(&ok_outcome("sina", 5));
        monitor.record_fetch_outcome(&ok_outcome("eastmoney", 5));
        let snap = monitor.snapshot();
        assert_eq!(snap.sources.len(), 2);
    }
}
