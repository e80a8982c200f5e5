//! Source Extractor.
//!
//! One implementation per source behind a uniform interface. A
//! declarative driver ([`declarative::DeclarativeExtractor`]) reads a
//! [`crate::types::config::SourceConfig`] and parametrizes a single
//! generic implementation behind a `Crawler`/`Ingestor`-style trait
//! object, adapted to a list-then-fetch shape rather than a BFS
//! link-following crawl.

pub mod declarative;
pub mod registry;
pub mod sources;

use async_trait::async_trait;

use crate::error::CrawlResult;
use crate::types::article::{DraftArticle, SkipReason};
use crate::types::config::WorkerParams;

/// Outcome of extracting a single article URL.
pub enum ExtractOutcome {
    Article(DraftArticle),
    Skip(SkipReason),
}

/// Per-source extraction behavior.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Yield candidate article URLs from paginated list pages. Finite;
    /// must not produce duplicates within a single call. `params.categories`
    /// restricts which configured categories are listed (all of them when
    /// empty); `params.use_proxy` governs whether the underlying fetches
    /// route through the configured proxy.
    async fn list_urls(&self, params: &WorkerParams, max_per_category: usize) -> CrawlResult<Vec<String>>;

    /// Fetch and parse a single article URL. `params.days`, when set,
    /// bounds how old an article may be before it is skipped with
    /// `TooOld`; `params.use_proxy` governs the fetch's proxy routing.
    async fn fetch_article(&self, url: &str, params: &WorkerParams) -> CrawlResult<ExtractOutcome>;

    /// The source name this extractor serves (registry key).
    fn name(&self) -> &str;

    /// Called by the owning Worker at the start of a crawl cycle so
    /// every `FetchOutcome` emitted during that cycle carries the same
    /// correlation id. Extractors that don't emit `FetchOutcome`s
    /// directly may ignore this.
    fn begin_run(&self, _run_id: &str) {}
}

pub use declarative::DeclarativeExtractor;
pub use registry::ExtractorRegistry;
