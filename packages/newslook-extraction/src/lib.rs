//! # newslook-extraction
//!
//! The crawler engine: HTTP fetching, text/encoding normalization,
//! per-source extraction, SQLite storage, and the ingestion pipeline
//! that ties them together. This crate has no knowledge of scheduling,
//! multi-source orchestration, or the HTTP control surface — those live
//! in `newslook-crawler`, which composes the pieces here per source.
//!
//! ## Pipeline
//!
//! ```text
//! list_urls → fetch_article → validate → canonicalize → dedup →
//! enrich (keywords/sentiment) → insert_article → lineage event
//! ```
//!
//! - [`http`] fetches pages with retry, backoff, and User-Agent
//!   rotation, decoding bodies through declared or sniffed charsets.
//! - [`normalize`] turns raw/HTML bodies into clean text, repairs
//!   mojibake, extracts keywords, and scores sentiment.
//! - [`extractor`] drives per-source selectors to turn a page into a
//!   structured draft article or a skip reason.
//! - [`storage`] is the single SQLite file and its schema.
//! - [`pipeline`] is the validate/canonicalize/dedup/enrich/persist
//!   sequence every fetched article passes through exactly once.
//! - [`security`] guards every outbound fetch against SSRF.
//!
//! ## Modules
//!
//! - [`error`] - the crawl/pipeline error taxonomy
//! - [`types`] - `Article` and the configuration records passed in from
//!   the CLI/control layer
//! - [`security`] - SSRF protection and URL validation
//! - [`http`] - the retrying HTTP client and charset decoding
//! - [`normalize`] - text normalization, mojibake repair, keywords, sentiment
//! - [`extractor`] - the per-source `Extractor` trait and its declarative driver
//! - [`storage`] - the SQLite-backed news store
//! - [`pipeline`] - the ingestion pipeline

pub mod error;
pub mod extractor;
pub mod http;
pub mod normalize;
pub mod pipeline;
pub mod security;
pub mod storage;
pub mod types;

pub use error::{CrawlError, CrawlResult, SecurityError};
pub use extractor::{DeclarativeExtractor, ExtractOutcome, Extractor, ExtractorRegistry};
pub use http::{FetchResponse, HttpClient, RobotsTxt};
pub use pipeline::{NullSink, Pipeline, PipelineOutcome, PipelineSink};
pub use security::UrlValidator;
pub use storage::{HealthStatus, InsertOutcome, SqliteStorage};
pub use types::article::{Article, DraftArticle, Sentiment, Source, SkipReason, StockRef};
pub use types::fetch::{FetchOutcome, FetchResult, FetchSink, NullFetchSink};
