//! Ingestion Pipeline: validate, canonicalize, dedup,
//! enrich, persist, emit. Idempotent — replaying the same draft yields
//! at most one stored row.

pub mod canonicalize;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::CrawlResult;
use crate::normalize::{classify_sentiment, extract_keywords, extract_stocks};
use crate::storage::{InsertOutcome, SqliteStorage};
use crate::types::article::{Article, DraftArticle, Source, SkipReason};

use canonicalize::canonicalize_url;

const KEYWORDS_PER_ARTICLE: usize = 8;

/// What happened to a single draft as it passed through the pipeline,
/// reported to the owning Worker for counting and to the Monitor via
/// [`PipelineSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Stored { id: String },
    Duplicate { id: String },
    Skipped { reason: SkipReason },
}

/// Lineage hook the Crawler Manager's Monitor implements to observe
/// per-article outcomes without the pipeline depending on it directly
///.
pub trait PipelineSink: Send + Sync {
    fn article_outcome(&self, source: &str, outcome: &PipelineOutcome);
}

/// A sink that drops every event; useful for tests and standalone use
/// of the pipeline outside the Crawler Manager.
pub struct NullSink;

impl PipelineSink for NullSink {
    fn article_outcome(&self, _source: &str, _outcome: &PipelineOutcome) {}
}

pub struct Pipeline {
    storage: Arc<SqliteStorage>,
    sink: Arc<dyn PipelineSink>,
}

impl Pipeline {
    pub fn new(storage: Arc<SqliteStorage>, sink: Arc<dyn PipelineSink>) -> Self {
        Self { storage, sink }
    }

    /// Run `draft` through validate -> canonicalize -> dedup -> enrich ->
    /// persist -> emit. `source` attributes the resulting
    /// Article and is echoed on every emitted outcome.
    pub async fn ingest(&self, draft: DraftArticle, source: Source) -> CrawlResult<PipelineOutcome> {
        let outcome = self.ingest_inner(draft, source).await?;
        self.sink.article_outcome(source.as_str(), &outcome);
        Ok(outcome)
    }

    async fn ingest_inner(&self, draft: DraftArticle, source: Source) -> CrawlResult<PipelineOutcome> {
        // 1. validate
        if draft.url.trim().is_empty() || draft.title.trim().is_empty() || draft.content.trim().is_empty() {
            debug!(url = %draft.url, "dropping invalid draft");
            return Ok(PipelineOutcome::Skipped { reason: SkipReason::Invalid });
        }

        // 2. canonicalize
        let Some(canonical_url) = canonicalize_url(&draft.url, None) else {
            return Ok(PipelineOutcome::Skipped { reason: SkipReason::Invalid });
        };
        let id = Article::derive_id(&canonical_url);

        // 3. dedup probe: a prior crawl may have stored this article
        // under the same id (same canonical url) or, if canonicalization
        // missed a tracking-parameter variant, under the same raw url.
        if self.storage.get_by_id(&id).await?.is_some() {
            return Ok(PipelineOutcome::Duplicate { id });
        }
        if let Some(existing) = self.storage.get_by_url(&canonical_url).await? {
            return Ok(PipelineOutcome::Duplicate { id: existing.id });
        }

        // 4. enrich
        let keywords = extract_keywords(&draft.content, KEYWORDS_PER_ARTICLE);
        let sentiment = classify_sentiment(&draft.content);
        let related_stocks = extract_stocks(&draft.content);

        let article = Article {
            id: id.clone(),
            url: canonical_url,
            title: draft.title,
            content: draft.content,
            content_html: draft.content_html,
            author: draft.author,
            category: draft.category,
            source,
            publish_time: draft.publish_time,
            crawl_time: Utc::now(),
            keywords,
            related_stocks,
            sentiment,
            images: draft.images,
        };

        // 5. persist
        match self.storage.insert_article(&article).await? {
            InsertOutcome::Inserted => {
                info!(id = %article.id, source = %source, "article stored");
                Ok(PipelineOutcome::Stored { id: article.id })
            }
            InsertOutcome::Duplicate => Ok(PipelineOutcome::Duplicate { id: article.id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        events: Mutex<Vec<PipelineOutcome>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self { events: Mutex::new(Vec::new()) }
        }
    }

    impl PipelineSink for RecordingSink {
        fn article_outcome(&self, _source: &str, outcome: &PipelineOutcome) {
            self.events.lock().unwrap().push(outcome.clone());
        }
    }

    fn draft(url: &str) -> DraftArticle {
        let mut d = DraftArticle::new(url);
        d.title = "沪指震荡走高".to_string();
        d.content = "沪指今日震荡走高，两市成交量较昨日明显放大。".to_string();
        d
    }

    #[tokio::test]
    async fn fresh_article_is_stored_and_duplicate_is_suppressed() {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let sink = Arc::new(RecordingSink::new());
        let pipeline = Pipeline::new(storage, sink.clone());

        let first = pipeline.ingest(draft("https://finance.sina.com.cn/a/1.shtml"), Source::Sina).await.unwrap();
        assert!(matches!(first, PipelineOutcome::Stored { .. }));

        let second = pipeline.ingest(draft("https://finance.sina.com.cn/a/1.shtml"), Source::Sina).await.unwrap();
        assert!(matches!(second, PipelineOutcome::Duplicate { .. }));

        assert_eq!(sink.events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn differently_tracked_urls_for_the_same_article_dedupe() {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let sink = Arc::new(NullSink);
        let pipeline = Pipeline::new(storage, sink);

        let first = pipeline
            .ingest(draft("https://finance.sina.com.cn/a/1.shtml?utm_source=weibo"), Source::Sina)
            .await
            .unwrap();
        assert!(matches!(first, PipelineOutcome::Stored { .. }));

        let second = pipeline
            .ingest(draft("https://finance.sina.com.cn/a/1.shtml?utm_source=wechat"), Source::Sina)
            .await
            .unwrap();
        assert!(matches!(second, PipelineOutcome::Duplicate { .. }));
    }

    #[tokio::test]
    async fn related_stocks_are_derived_from_content() {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let sink = Arc::new(NullSink);
        let pipeline = Pipeline::new(storage.clone(), sink);

        let mut d = draft("https://finance.sina.com.cn/a/3.shtml");
        d.content = "贵州茅台(600519)今日尾盘拉升，带动白酒板块走强。".to_string();
        let outcome = pipeline.ingest(d, Source::Sina).await.unwrap();
        let PipelineOutcome::Stored { id } = outcome else { panic!("expected stored") };

        let article = storage.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(article.related_stocks[0].code, "600519");
    }

    #[tokio::test]
    async fn empty_content_is_skipped_as_invalid() {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let sink = Arc::new(NullSink);
        let pipeline = Pipeline::new(storage, sink);

        let mut d = DraftArticle::new("https://finance.sina.com.cn/a/2.shtml");
        d.title = "标题".to_string();
        let outcome = pipeline.ingest(d, Source::Sina).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Skipped { reason: SkipReason::Invalid });
    }
}
