//! Configuration records consumed by the core.
//!
//! These are plain data the process builds at startup and passes down
//! through explicit handles rather than module-level singletons.
//! Loading them from environment or files is the CLI binary's job,
//! not this crate's.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HTTP Client behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Per-attempt timeout.
    pub attempt_timeout_ms: u64,
    /// Maximum attempts per request, including the first.
    pub max_attempts: u32,
    /// Base backoff delay for full-jitter exponential backoff.
    pub backoff_base_ms: u64,
    /// Cap on backoff delay.
    pub backoff_cap_ms: u64,
    /// Pool of User-Agent strings to rotate through.
    pub user_agents: Vec<String>,
    /// Optional proxy URL applied to every request.
    pub proxy_url: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: 10_000,
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 30_000,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15".to_string(),
            ],
            proxy_url: None,
        }
    }
}

/// Per-source declarative extractor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source: String,
    pub base_url: String,
    /// category name -> list-page URL
    pub category_list_urls: HashMap<String, String>,
    pub selectors: SourceSelectors,
    /// Regex a candidate article URL must match to be considered valid.
    pub url_pattern: String,
    /// URL substrings that hard-drop a candidate (`Skip(ad)`).
    pub hard_ad_url_patterns: Vec<String>,
    /// Content keywords that are logged as advisory ad matches only.
    pub soft_ad_keywords: Vec<String>,
    pub enabled: bool,
    /// Per-source concurrent fetch slots.
    pub concurrency: usize,
}

/// CSS selectors the declarative extractor drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSelectors {
    pub title: String,
    pub publish_time: String,
    pub author: String,
    pub content: String,
    pub images: String,
    pub category_crumbs: String,
}

/// Parameters recognized by `Manager::start`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerParams {
    pub max_items: Option<usize>,
    pub days: Option<u32>,
    pub use_proxy: bool,
    pub categories: Vec<String>,
}

/// Filter accepted by `Storage::query` / `Control::query_news`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilter {
    pub source: Option<String>,
    pub category: Option<String>,
    pub date_from: Option<chrono::DateTime<chrono::Utc>>,
    pub date_to: Option<chrono::DateTime<chrono::Utc>>,
    pub keyword: Option<String>,
    pub text_match: Option<String>,
}
