//! Data model types shared across the crawler engine.

pub mod article;
pub mod config;
pub mod fetch;

pub use article::{Article, DraftArticle, Sentiment, Source, SkipReason, StockRef};
pub use config::{HttpClientConfig, QueryFilter, SourceConfig, SourceSelectors, WorkerParams};
pub use fetch::{FetchOutcome, FetchResult, FetchSink, NullFetchSink};
