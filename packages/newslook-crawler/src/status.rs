//! `SourceStatus` and the lifecycle events the Manager publishes to
//! `subscribe`rs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A source's lifecycle state, mutated only by its owning Worker and
/// the Manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Error,
}

/// Per-source status record. Cloned out for every `status()`
/// call so readers never block the owning Worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStatus {
    pub source: String,
    pub state: WorkerState,
    pub last_run_started: Option<DateTime<Utc>>,
    pub last_run_finished: Option<DateTime<Utc>>,
    pub items_scanned: u64,
    pub items_stored: u64,
    pub items_skipped_duplicate: u64,
    pub items_skipped_other: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    /// Set when a hard-failure trip puts the source into `error`; no
    /// restart (explicit or Scheduler-driven) is honored before this
    /// timestamp. Cleared on the next cycle that completes without
    /// tripping.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Number of consecutive trips since the last clean cycle; drives
    /// the exponential cooldown duration.
    pub cooldown_attempt: u32,
}

impl SourceStatus {
    pub fn idle(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            state: WorkerState::Idle,
            last_run_started: None,
            last_run_finished: None,
            items_scanned: 0,
            items_stored: 0,
            items_skipped_duplicate: 0,
            items_skipped_other: 0,
            consecutive_failures: 0,
            last_error: None,
            cooldown_until: None,
            cooldown_attempt: 0,
        }
    }

    /// Whether a restart is currently blocked by an active cooldown.
    pub fn in_cooldown(&self) -> bool {
        self.cooldown_until.is_some_and(|until| Utc::now() < until)
    }
}

/// Lifecycle events pushed to `Manager::subscribe` listeners.
/// Best-effort: a lagging subscriber may miss events (broadcast
/// channel semantics), which is acceptable since the authoritative
/// state is always available from `status()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CrawlEvent {
    Started { source: String, run_id: String },
    ArticleStored { source: String, run_id: String, id: String },
    ArticleDuplicate { source: String, run_id: String, id: String },
    ArticleSkipped { source: String, run_id: String, reason: String },
    Cancelled { source: String, run_id: String },
    Errored { source: String, run_id: String, message: String },
    Finished { source: String, run_id: String },
}

impl CrawlEvent {
    pub fn source(&self) -> &str {
        match self {
            CrawlEvent::Started { source, .. }
            | CrawlEvent::ArticleStored { source, .. }
            | CrawlEvent::ArticleDuplicate { source, .. }
            | CrawlEvent::ArticleSkipped { source, .. }
            | CrawlEvent::Cancelled { source, .. }
            | CrawlEvent::Errored { source, .. }
            | CrawlEvent::Finished { source, .. } => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_status_starts_with_zeroed_counters() {
        let status = SourceStatus::idle("sina");
        assert_eq!(status.state, WorkerState::Idle);
        assert_eq!(status.items_stored, 0);
        assert!(status.last_error.is_none());
    }

    #[test]
    fn crawl_event_source_extracts_consistently() {
        let ev = CrawlEvent::Started { source: "sina".to_string(), run_id: "r1".to_string() };
        assert_eq!(ev.source(), "sina");
    }
}
