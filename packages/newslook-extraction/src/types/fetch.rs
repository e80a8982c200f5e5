//! Per-fetch lineage records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal result of one HTTP attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchResult {
    Ok,
    Retry,
    Fail,
}

/// One HTTP Client attempt, appended by the client and consumed by the
/// Monitor. Bounded ring buffer in memory; never blocks the
/// fetch path on append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub url: String,
    pub source: String,
    pub run_id: String,
    pub http_status: Option<u16>,
    pub bytes: usize,
    pub elapsed_ms: u64,
    pub attempt: u32,
    pub result: FetchResult,
    pub timestamp: DateTime<Utc>,
}

impl FetchOutcome {
    pub fn new(
        url: impl Into<String>,
        source: impl Into<String>,
        run_id: impl Into<String>,
        attempt: u32,
        result: FetchResult,
    ) -> Self {
        Self {
            url: url.into(),
            source: source.into(),
            run_id: run_id.into(),
            http_status: None,
            bytes: 0,
            elapsed_ms: 0,
            attempt,
            result,
            timestamp: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_bytes(mut self, bytes: usize) -> Self {
        self.bytes = bytes;
        self
    }

    pub fn with_elapsed_ms(mut self, ms: u64) -> Self {
        self.elapsed_ms = ms;
        self
    }
}

/// Lets the HTTP Client report every attempt's [`FetchOutcome`] to a
/// lineage observer without depending on the Monitor's concrete type.
/// Mirrors `pipeline::PipelineSink`'s role on the ingestion side.
pub trait FetchSink: Send + Sync {
    fn fetch_outcome(&self, outcome: &FetchOutcome);
}

/// Discards every outcome. Default for a client built without an
/// explicit sink.
pub struct NullFetchSink;

impl FetchSink for NullFetchSink {
    fn fetch_outcome(&self, _outcome: &FetchOutcome) {}
}
