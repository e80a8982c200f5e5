//! SQLite-backed storage: a pooled `sqlx::SqlitePool`, pragmas set at
//! connection time, `ON CONFLICT` upserts, and a single `news` table
//! with join tables for keywords and referenced stocks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{CrawlError, CrawlResult};
use crate::types::article::{Article, Sentiment, Source, StockRef};
use crate::types::config::QueryFilter;

/// How long a cached `integrity_ok` result is trusted before `health()`
/// re-runs `PRAGMA quick_check`.
const INTEGRITY_CACHE_TTL: Duration = Duration::from_secs(300);

/// Application-level retries for a write that hits `SQLITE_BUSY`/
/// `SQLITE_LOCKED` despite the `busy_timeout` pragma, e.g. a writer on
/// another connection holding the lock past the pragma's own wait.
const MAX_BUSY_RETRIES: u32 = 3;
const BUSY_RETRY_DELAY: Duration = Duration::from_millis(50);

/// SQLite primary result codes for "busy" and "locked", as surfaced by
/// `sqlx`'s `DatabaseError::code()`.
fn is_busy(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some("5") | Some("6")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub size_bytes: u64,
    pub news_count: i64,
    pub last_insert_at: Option<DateTime<Utc>>,
    pub integrity_ok: bool,
}

/// Single SQLite file behind a connection pool. Reads use
/// any pooled connection; writes serialize through `write_lock` so
/// `insert_article` never contends with itself across tasks, giving a
/// single-writer discipline without hand-rolling a second pool.
pub struct SqliteStorage {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    db_path: Option<String>,
    integrity_cache: Arc<Mutex<Option<(Instant, bool)>>>,
}

impl SqliteStorage {
    /// Open (creating if absent) the database at `path`, or `:memory:`
    /// for an ephemeral store used in tests.
    pub async fn open(path: &str) -> CrawlResult<Self> {
        let options = if path == ":memory:" {
            SqliteConnectOptions::new().in_memory(true)
        } else {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        }
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(5_000));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| CrawlError::Storage(Box::new(e)))?;

        sqlx::query("PRAGMA cache_size = -10000")
            .execute(&pool)
            .await
            .map_err(|e| CrawlError::Storage(Box::new(e)))?;

        let storage = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            db_path: (path != ":memory:").then(|| path.to_string()),
            integrity_cache: Arc::new(Mutex::new(None)),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    pub async fn in_memory() -> CrawlResult<Self> {
        Self::open(":memory:").await
    }

    async fn run_migrations(&self) -> CrawlResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                publish_time TEXT,
                crawl_time TEXT NOT NULL,
                author TEXT,
                source TEXT NOT NULL,
                category TEXT,
                sentiment TEXT NOT NULL,
                keywords TEXT NOT NULL DEFAULT '[]',
                images TEXT NOT NULL DEFAULT '[]',
                related_stocks TEXT NOT NULL DEFAULT '[]'
            );
            CREATE INDEX IF NOT EXISTS idx_news_source ON news(source);
            CREATE INDEX IF NOT EXISTS idx_news_category ON news(category);
            CREATE INDEX IF NOT EXISTS idx_news_publish_time ON news(publish_time);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(Box::new(e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS keywords (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                keyword TEXT NOT NULL UNIQUE,
                count INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS news_keywords (
                news_id TEXT NOT NULL REFERENCES news(id),
                keyword_id INTEGER NOT NULL REFERENCES keywords(id),
                PRIMARY KEY (news_id, keyword_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(Box::new(e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stocks (
                code TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS news_stocks (
                news_id TEXT NOT NULL REFERENCES news(id),
                stock_code TEXT NOT NULL REFERENCES stocks(code),
                PRIMARY KEY (news_id, stock_code)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(Box::new(e)))?;

        Ok(())
    }

    /// Insert `article`, upserting keyword/stock aggregates and join
    /// rows in the same transaction. `url` collision yields `Duplicate`
    /// without touching the existing row. Retries up to
    /// [`MAX_BUSY_RETRIES`] times on `SQLITE_BUSY`/`SQLITE_LOCKED`
    /// before surfacing the error.
    pub async fn insert_article(&self, article: &Article) -> CrawlResult<InsertOutcome> {
        let mut attempt = 0;
        loop {
            match self.try_insert_article(article).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if is_busy(&err) && attempt < MAX_BUSY_RETRIES => {
                    attempt += 1;
                    warn!(id = %article.id, attempt, "sqlite busy, retrying insert");
                    tokio::time::sleep(BUSY_RETRY_DELAY).await;
                }
                Err(err) => return Err(CrawlError::Storage(Box::new(err))),
            }
        }
    }

    async fn try_insert_article(&self, article: &Article) -> Result<InsertOutcome, sqlx::Error> {
        let _guard = self.write_lock.lock().await;

        let mut tx = self.pool.begin().await?;

        let keywords_json = serde_json::to_string(&article.keywords).unwrap_or_else(|_| "[]".to_string());
        let images_json = serde_json::to_string(&article.images).unwrap_or_else(|_| "[]".to_string());
        let stocks_json = serde_json::to_string(&article.related_stocks).unwrap_or_else(|_| "[]".to_string());

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO news
                (id, url, title, content, content_html, publish_time, crawl_time,
                 author, source, category, sentiment, keywords, images, related_stocks)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.id)
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.content_html)
        .bind(article.publish_time.map(|t| t.to_rfc3339()))
        .bind(article.crawl_time.to_rfc3339())
        .bind(&article.author)
        .bind(article.source.as_str())
        .bind(&article.category)
        .bind(sentiment_str(article.sentiment))
        .bind(&keywords_json)
        .bind(&images_json)
        .bind(&stocks_json)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(InsertOutcome::Duplicate);
        }

        let now = Utc::now().to_rfc3339();

        for keyword in &article.keywords {
            sqlx::query(
                r#"
                INSERT INTO keywords (keyword, count, last_updated)
                VALUES (?, 1, ?)
                ON CONFLICT(keyword) DO UPDATE SET count = count + 1, last_updated = excluded.last_updated
                "#,
            )
            .bind(keyword)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            let keyword_id: i64 = sqlx::query_scalar("SELECT id FROM keywords WHERE keyword = ?")
                .bind(keyword)
                .fetch_one(&mut *tx)
                .await?;

            sqlx::query("INSERT OR IGNORE INTO news_keywords (news_id, keyword_id) VALUES (?, ?)")
                .bind(&article.id)
                .bind(keyword_id)
                .execute(&mut *tx)
                .await?;
        }

        for stock in &article.related_stocks {
            sqlx::query(
                r#"
                INSERT INTO stocks (code, name, count, last_updated)
                VALUES (?, ?, 1, ?)
                ON CONFLICT(code) DO UPDATE SET count = count + 1, last_updated = excluded.last_updated
                "#,
            )
            .bind(&stock.code)
            .bind(&stock.name)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT OR IGNORE INTO news_stocks (news_id, stock_code) VALUES (?, ?)")
                .bind(&article.id)
                .bind(&stock.code)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(id = %article.id, url = %article.url, "article inserted");
        Ok(InsertOutcome::Inserted)
    }

    pub async fn get_by_id(&self, id: &str) -> CrawlResult<Option<Article>> {
        let row: Option<NewsRow> = sqlx::query_as("SELECT * FROM news WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(Box::new(e)))?;
        row.map(NewsRow::into_article).transpose()
    }

    /// Same lookup as [`Self::get_by_id`], keyed by `url` instead. Backs
    /// the Ingestion Pipeline's dedup probe, which checks both id and
    /// url before persisting.
    pub async fn get_by_url(&self, url: &str) -> CrawlResult<Option<Article>> {
        let row: Option<NewsRow> = sqlx::query_as("SELECT * FROM news WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(Box::new(e)))?;
        row.map(NewsRow::into_article).transpose()
    }

    /// Paged, filtered listing, stable-ordered by `publish_time DESC,
    /// id DESC` with a `crawl_time` fallback when `publish_time` is
    /// null.
    pub async fn query(
        &self,
        filter: &QueryFilter,
        page: u32,
        page_size: u32,
    ) -> CrawlResult<(Vec<Article>, i64)> {
        let page_size = page_size.clamp(1, 100);
        let offset = page.saturating_sub(1) as i64 * page_size as i64;

        let (where_clause, binds) = build_where(filter);

        let count_sql = format!("SELECT COUNT(*) FROM news {where_clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for bind in &binds {
            count_query = count_query.bind(bind);
        }
        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(Box::new(e)))?;

        let order_sql = "ORDER BY COALESCE(publish_time, crawl_time) DESC, id DESC LIMIT ? OFFSET ?";
        let select_sql = format!("SELECT * FROM news {where_clause} {order_sql}");
        let mut select_query = sqlx::query_as::<_, NewsRow>(&select_sql);
        for bind in &binds {
            select_query = select_query.bind(bind);
        }
        select_query = select_query.bind(page_size as i64).bind(offset);

        let rows = select_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(Box::new(e)))?;

        let articles = rows
            .into_iter()
            .map(NewsRow::into_article)
            .collect::<CrawlResult<Vec<_>>>()?;

        Ok((articles, total))
    }

    pub async fn count(&self, filter: &QueryFilter) -> CrawlResult<i64> {
        let (where_clause, binds) = build_where(filter);
        let sql = format!("SELECT COUNT(*) FROM news {where_clause}");
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(Box::new(e)))
    }

    pub async fn list_sources(&self) -> CrawlResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT source FROM news ORDER BY source")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(Box::new(e)))?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    /// Daily article counts over `[date_from, date_to]`, oldest first.
    /// Backs `Control/Query Facade::trends`.
    pub async fn trends(
        &self,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> CrawlResult<Vec<(String, i64)>> {
        let mut clauses = Vec::new();
        let mut binds = Vec::new();
        if let Some(from) = date_from {
            clauses.push("COALESCE(publish_time, crawl_time) >= ?".to_string());
            binds.push(from.to_rfc3339());
        }
        if let Some(to) = date_to {
            clauses.push("COALESCE(publish_time, crawl_time) <= ?".to_string());
            binds.push(to.to_rfc3339());
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT date(COALESCE(publish_time, crawl_time)) AS day, COUNT(*) \
             FROM news {where_clause} GROUP BY day ORDER BY day ASC"
        );
        let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(Box::new(e)))
    }

    /// Top `k` keywords by occurrence count across articles published in
    /// `[date_from, date_to]`. Falls back to the unscoped `keywords`
    /// aggregate when no range is given.
    pub async fn top_keywords(
        &self,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
        k: i64,
    ) -> CrawlResult<Vec<(String, i64)>> {
        if date_from.is_none() && date_to.is_none() {
            return sqlx::query_as::<_, (String, i64)>(
                "SELECT keyword, count FROM keywords ORDER BY count DESC, keyword ASC LIMIT ?",
            )
            .bind(k)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(Box::new(e)));
        }

        let mut clauses = Vec::new();
        let mut binds = Vec::new();
        if let Some(from) = date_from {
            clauses.push("COALESCE(n.publish_time, n.crawl_time) >= ?".to_string());
            binds.push(from.to_rfc3339());
        }
        if let Some(to) = date_to {
            clauses.push("COALESCE(n.publish_time, n.crawl_time) <= ?".to_string());
            binds.push(to.to_rfc3339());
        }
        let where_clause = format!("WHERE {}", clauses.join(" AND "));

        let sql = format!(
            "SELECT k.keyword, COUNT(*) AS occurrences \
             FROM news_keywords nk \
             JOIN news n ON n.id = nk.news_id \
             JOIN keywords k ON k.id = nk.keyword_id \
             {where_clause} \
             GROUP BY k.keyword ORDER BY occurrences DESC, k.keyword ASC LIMIT ?"
        );
        let mut query = sqlx::query_as::<_, (String, i64)>(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        query = query.bind(k);
        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(Box::new(e)))
    }

    pub async fn list_categories(&self) -> CrawlResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT category FROM news WHERE category IS NOT NULL ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CrawlError::Storage(Box::new(e)))?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    /// `{size_bytes, news_count, last_insert_at, integrity_ok}`.
    /// `integrity_ok` runs `PRAGMA quick_check` on a schedule and caches
    /// the result for [`INTEGRITY_CACHE_TTL`].
    pub async fn health(&self) -> CrawlResult<HealthStatus> {
        let news_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(Box::new(e)))?;

        let last_insert_at: Option<String> =
            sqlx::query_scalar("SELECT MAX(crawl_time) FROM news")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| CrawlError::Storage(Box::new(e)))?;
        let last_insert_at = last_insert_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let size_bytes = match &self.db_path {
            Some(path) => std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            None => 0,
        };

        let integrity_ok = self.integrity_ok_cached().await?;

        Ok(HealthStatus {
            size_bytes,
            news_count,
            last_insert_at,
            integrity_ok,
        })
    }

    /// Idempotently re-classify an article's `source`. The only Article
    /// field this Storage ever updates post-insert. Retries up to
    /// [`MAX_BUSY_RETRIES`] times on `SQLITE_BUSY`/`SQLITE_LOCKED`.
    pub async fn reclassify_source(&self, id: &str, source: Source) -> CrawlResult<bool> {
        let mut attempt = 0;
        loop {
            let _guard = self.write_lock.lock().await;
            let outcome = sqlx::query("UPDATE news SET source = ? WHERE id = ?")
                .bind(source.as_str())
                .bind(id)
                .execute(&self.pool)
                .await;
            drop(_guard);

            match outcome {
                Ok(result) => return Ok(result.rows_affected() > 0),
                Err(err) if is_busy(&err) && attempt < MAX_BUSY_RETRIES => {
                    attempt += 1;
                    warn!(id, attempt, "sqlite busy, retrying reclassify");
                    tokio::time::sleep(BUSY_RETRY_DELAY).await;
                }
                Err(err) => return Err(CrawlError::Storage(Box::new(err))),
            }
        }
    }

    async fn integrity_ok_cached(&self) -> CrawlResult<bool> {
        let mut cache = self.integrity_cache.lock().await;
        if let Some((checked_at, ok)) = *cache {
            if checked_at.elapsed() < INTEGRITY_CACHE_TTL {
                return Ok(ok);
            }
        }

        let result: String = sqlx::query_scalar("PRAGMA quick_check")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlError::Storage(Box::new(e)))?;
        let ok = result == "ok";
        if !ok {
            warn!(result = %result, "sqlite integrity check failed");
        }
        *cache = Some((Instant::now(), ok));
        Ok(ok)
    }
}

fn sentiment_str(sentiment: Sentiment) -> &'static str {
    match sentiment {
        Sentiment::Positive => "positive",
        Sentiment::Neutral => "neutral",
        Sentiment::Negative => "negative",
    }
}

fn build_where(filter: &QueryFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();

    if let Some(source) = &filter.source {
        clauses.push("source = ?".to_string());
        binds.push(source.clone());
    }
    if let Some(category) = &filter.category {
        clauses.push("category = ?".to_string());
        binds.push(category.clone());
    }
    if let Some(date_from) = filter.date_from {
        clauses.push("COALESCE(publish_time, crawl_time) >= ?".to_string());
        binds.push(date_from.to_rfc3339());
    }
    if let Some(date_to) = filter.date_to {
        clauses.push("COALESCE(publish_time, crawl_time) <= ?".to_string());
        binds.push(date_to.to_rfc3339());
    }
    if let Some(keyword) = &filter.keyword {
        clauses.push("keywords LIKE ?".to_string());
        binds.push(format!("%\"{keyword}\"%"));
    }
    if let Some(text) = &filter.text_match {
        clauses.push("(title LIKE ? OR content LIKE ?)".to_string());
        let pattern = format!("%{text}%");
        binds.push(pattern.clone());
        binds.push(pattern);
    }

    if clauses.is_empty() {
        (String::new(), binds)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), binds)
    }
}

#[derive(Debug, FromRow)]
struct NewsRow {
    id: String,
    url: String,
    title: String,
    content: String,
    content_html: String,
    publish_time: Option<String>,
    crawl_time: String,
    author: Option<String>,
    source: String,
    category: Option<String>,
    sentiment: String,
    keywords: String,
    images: String,
    related_stocks: String,
}

impl NewsRow {
    fn into_article(self) -> CrawlResult<Article> {
        let publish_time = self
            .publish_time
            .map(|s| parse_rfc3339(&s))
            .transpose()?;
        let crawl_time = parse_rfc3339(&self.crawl_time)?;

        let keywords: Vec<String> =
            serde_json::from_str(&self.keywords).map_err(|e| CrawlError::Storage(Box::new(e)))?;
        let images: Vec<String> =
            serde_json::from_str(&self.images).map_err(|e| CrawlError::Storage(Box::new(e)))?;
        let related_stocks: Vec<StockRef> =
            serde_json::from_str(&self.related_stocks).map_err(|e| CrawlError::Storage(Box::new(e)))?;

        let sentiment = match self.sentiment.as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        };

        Ok(Article {
            id: self.id,
            url: self.url,
            title: self.title,
            content: self.content,
            content_html: self.content_html,
            author: self.author,
            category: self.category,
            source: self.source.parse().unwrap_or(Source::Unknown),
            publish_time,
            crawl_time,
            keywords,
            related_stocks,
            sentiment,
            images,
        })
    }
}

fn parse_rfc3339(s: &str) -> CrawlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CrawlError::Storage(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_article(url: &str) -> Article {
        Article {
            id: Article::derive_id(url),
            url: url.to_string(),
            title: "沪指小幅上涨".to_string(),
            content: "沪指今日小幅上涨，成交量有所放大。".to_string(),
            content_html: "<p>沪指今日小幅上涨。</p>".to_string(),
            author: Some("记者".to_string()),
            category: Some("stock".to_string()),
            source: Source::Sina,
            publish_time: Some(Utc::now()),
            crawl_time: Utc::now(),
            keywords: vec!["沪指".to_string(), "上涨".to_string()],
            related_stocks: vec![StockRef { code: "600000".to_string(), name: "浦发银行".to_string() }],
            sentiment: Sentiment::Positive,
            images: vec![],
        }
    }

    #[tokio::test]
    async fn insert_then_duplicate_is_detected() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let article = sample_article("https://finance.sina.com.cn/a/1.shtml");

        let first = storage.insert_article(&article).await.unwrap();
        assert_eq!(first, InsertOutcome::Inserted);

        let second = storage.insert_article(&article).await.unwrap();
        assert_eq!(second, InsertOutcome::Duplicate);

        let health = storage.health().await.unwrap();
        assert_eq!(health.news_count, 1);
        assert!(health.integrity_ok);
    }

    #[tokio::test]
    async fn query_filters_by_source_and_paginates() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage
            .insert_article(&sample_article("https://finance.sina.com.cn/a/1.shtml"))
            .await
            .unwrap();
        let mut other = sample_article("https://finance.eastmoney.com/a/2.html");
        other.source = Source::Eastmoney;
        storage.insert_article(&other).await.unwrap();

        let filter = QueryFilter { source: Some("sina".to_string()), ..Default::default() };
        let (rows, total) = storage.query(&filter, 1, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].source, Source::Sina);
    }

    #[tokio::test]
    async fn get_by_id_round_trips_keywords_and_stocks() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let article = sample_article("https://finance.sina.com.cn/a/3.shtml");
        storage.insert_article(&article).await.unwrap();

        let fetched = storage.get_by_id(&article.id).await.unwrap().unwrap();
        assert_eq!(fetched.keywords, article.keywords);
        assert_eq!(fetched.related_stocks, article.related_stocks);
    }

    #[tokio::test]
    async fn get_by_url_finds_the_same_row_as_get_by_id() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let article = sample_article("https://finance.sina.com.cn/a/11.shtml");
        storage.insert_article(&article).await.unwrap();

        let fetched = storage.get_by_url(&article.url).await.unwrap().unwrap();
        assert_eq!(fetched.id, article.id);
        assert!(storage.get_by_url("https://finance.sina.com.cn/a/missing.shtml").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_sources_and_categories_are_distinct() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage
            .insert_article(&sample_article("https://finance.sina.com.cn/a/4.shtml"))
            .await
            .unwrap();
        storage
            .insert_article(&sample_article("https://finance.sina.com.cn/a/5.shtml"))
            .await
            .unwrap();

        assert_eq!(storage.list_sources().await.unwrap(), vec!["sina".to_string()]);
        assert_eq!(storage.list_categories().await.unwrap(), vec!["stock".to_string()]);
    }

    #[tokio::test]
    async fn trends_groups_articles_by_day() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage
            .insert_article(&sample_article("https://finance.sina.com.cn/a/6.shtml"))
            .await
            .unwrap();
        storage
            .insert_article(&sample_article("https://finance.sina.com.cn/a/7.shtml"))
            .await
            .unwrap();

        let days = storage.trends(None, None).await.unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].1, 2);
    }

    #[tokio::test]
    async fn top_keywords_orders_by_occurrence_count() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let mut a = sample_article("https://finance.sina.com.cn/a/8.shtml");
        a.keywords = vec!["沪指".to_string(), "上涨".to_string()];
        storage.insert_article(&a).await.unwrap();

        let mut b = sample_article("https://finance.sina.com.cn/a/9.shtml");
        b.keywords = vec!["沪指".to_string()];
        storage.insert_article(&b).await.unwrap();

        let top = storage.top_keywords(None, None, 10).await.unwrap();
        assert_eq!(top[0], ("沪指".to_string(), 2));
    }

    #[tokio::test]
    async fn reclassify_source_updates_existing_row_idempotently() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let article = sample_article("https://finance.sina.com.cn/a/10.shtml");
        storage.insert_article(&article).await.unwrap();

        assert!(storage.reclassify_source(&article.id, Source::Eastmoney).await.unwrap());
        let fetched = storage.get_by_id(&article.id).await.unwrap().unwrap();
        assert_eq!(fetched.source, Source::Eastmoney);

        // Idempotent: re-applying the same classification changes nothing further.
        assert!(storage.reclassify_source(&article.id, Source::Eastmoney).await.unwrap());
        assert!(!storage.reclassify_source("missing-id", Source::Sina).await.unwrap());
    }
}
