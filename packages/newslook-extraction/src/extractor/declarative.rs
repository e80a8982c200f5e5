//! Declarative, config-parametrized extractor.
//!
//! One generic driver reads a [`SourceConfig`] and drives `scraper`
//! selectors against list and article pages: `reqwest` fetches paired
//! with `scraper::{Html, Selector}` parsing against a per-source
//! selector set instead of a fixed "main content" guess.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::error::{CrawlError, CrawlResult};
use crate::http::{HttpClient, RobotsTxt};
use crate::normalize::html_to_text;
use crate::types::article::{DraftArticle, SkipReason};
use crate::types::config::{SourceConfig, WorkerParams};

use super::{ExtractOutcome, Extractor};

/// User-Agent robots.txt rules are evaluated against; matches the HTTP
/// Client's fallback UA when no pool is configured.
const ROBOTS_USER_AGENT: &str = "NewsLookBot";

/// Content keywords indicating the full article is gated behind a
/// paywall rather than genuinely short or unparsable.
const PAYWALL_KEYWORDS: &[&str] = &["付费阅读", "订阅后可读", "会员专享内容"];

/// Generic per-source extractor parametrized by a [`SourceConfig`].
pub struct DeclarativeExtractor {
    config: SourceConfig,
    client: HttpClient,
    url_pattern: Regex,
    run_id: std::sync::Mutex<String>,
    /// Fetched and cached once per crawl cycle; cleared by `begin_run`
    /// so a new cycle picks up any change to the site's robots.txt.
    robots: std::sync::Mutex<Option<RobotsTxt>>,
}

impl DeclarativeExtractor {
    pub fn new(config: SourceConfig, client: HttpClient, run_id: impl Into<String>) -> CrawlResult<Self> {
        let url_pattern = Regex::new(&config.url_pattern)
            .map_err(|e| CrawlError::Config(format!("invalid url_pattern for {}: {e}", config.source)))?;
        Ok(Self {
            config,
            client,
            url_pattern,
            run_id: std::sync::Mutex::new(run_id.into()),
            robots: std::sync::Mutex::new(None),
        })
    }

    fn current_run_id(&self) -> String {
        self.run_id.lock().unwrap().clone()
    }

    /// Disallowed by the site's robots.txt for our UA; callers treat a
    /// disallowed path as `Skip(Ad)`-equivalent. A fetch failure yields
    /// a permissive default, never blocking the
    /// cycle on robots.txt being unreachable. A concurrent first call
    /// from two fetch slots may both fetch once; harmless since both
    /// converge on the same cached value.
    async fn is_robots_disallowed(&self, url: &str) -> bool {
        if self.robots.lock().unwrap().is_none() {
            let fetched = self.client.fetch_robots_txt(&self.config.base_url).await;
            *self.robots.lock().unwrap() = Some(fetched);
        }
        let robots = self.robots.lock().unwrap().clone().unwrap_or_default();
        let path = url::Url::parse(url).map(|u| u.path().to_string()).unwrap_or_else(|_| url.to_string());
        !robots.is_allowed(ROBOTS_USER_AGENT, &path)
    }

    fn parse_selector(&self, selector: &str) -> Option<Selector> {
        Selector::parse(selector)
            .map_err(|e| warn!(source = %self.config.source, selector, error = ?e, "invalid selector"))
            .ok()
    }

    fn select_text(&self, doc: &Html, selector: &str) -> Option<String> {
        if selector.is_empty() {
            return None;
        }
        let sel = self.parse_selector(selector)?;
        doc.select(&sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    }

    fn select_html(&self, doc: &Html, selector: &str) -> Option<String> {
        if selector.is_empty() {
            return None;
        }
        let sel = self.parse_selector(selector)?;
        doc.select(&sel).next().map(|el| el.html())
    }

    /// Whether `selector` matches at least one element, regardless of
    /// the text it contains. Distinguishes a page whose layout no
    /// longer matches the configured selectors (`Unparsable`) from one
    /// that matched but yielded blank text (`Empty`).
    fn has_match(&self, doc: &Html, selector: &str) -> bool {
        if selector.is_empty() {
            return false;
        }
        let Some(sel) = self.parse_selector(selector) else {
            return false;
        };
        doc.select(&sel).next().is_some()
    }

    fn select_images(&self, doc: &Html, selector: &str) -> Vec<String> {
        if selector.is_empty() {
            return Vec::new();
        }
        let Some(sel) = self.parse_selector(selector) else {
            return Vec::new();
        };
        doc.select(&sel)
            .filter_map(|el| el.value().attr("src").map(str::to_string))
            .collect()
    }

    fn is_hard_ad(&self, url: &str) -> bool {
        self.config
            .hard_ad_url_patterns
            .iter()
            .any(|pat| url.contains(pat.as_str()))
    }

    fn log_soft_ad_matches(&self, url: &str, content: &str) {
        for keyword in &self.config.soft_ad_keywords {
            if content.contains(keyword.as_str()) {
                debug!(source = %self.config.source, url, keyword, "advisory ad keyword matched");
            }
        }
    }

    /// Try a prioritized list of publish-time formats, then fall back to a
    /// date pattern embedded in the URL itself.
    fn parse_publish_time(&self, raw: Option<&str>, url: &str) -> Option<DateTime<Utc>> {
        if let Some(raw) = raw {
            let raw = raw.trim();
            if let Some(dt) = parse_absolute(raw) {
                return Some(dt);
            }
            if let Some(dt) = parse_relative(raw) {
                return Some(dt);
            }
        }
        parse_date_from_url(url)
    }
}

#[async_trait]
impl Extractor for DeclarativeExtractor {
    async fn list_urls(&self, params: &WorkerParams, max_per_category: usize) -> CrawlResult<Vec<String>> {
        let mut urls = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for (category, list_url) in &self.config.category_list_urls {
            if !params.categories.is_empty() && !params.categories.iter().any(|c| c == category) {
                continue;
            }

            let response = self
                .client
                .fetch(list_url, &self.config.source, &self.current_run_id(), params.use_proxy)
                .await?;
            let doc = Html::parse_document(&response.body);

            let Some(link_selector) = self.parse_selector("a") else {
                continue;
            };

            let mut found_for_category = 0usize;
            for el in doc.select(&link_selector) {
                if found_for_category >= max_per_category {
                    break;
                }
                let Some(href) = el.value().attr("href") else {
                    continue;
                };
                let resolved = resolve_url(&self.config.base_url, href);
                if !self.url_pattern.is_match(&resolved) {
                    continue;
                }
                if !seen.insert(resolved.clone()) {
                    continue;
                }
                found_for_category += 1;
                urls.push(resolved);
            }
            debug!(source = %self.config.source, category, found = found_for_category, "listed category urls");
        }

        Ok(urls)
    }

    async fn fetch_article(&self, url: &str, params: &WorkerParams) -> CrawlResult<ExtractOutcome> {
        if self.is_hard_ad(url) {
            return Ok(ExtractOutcome::Skip(SkipReason::Ad));
        }

        if self.is_robots_disallowed(url).await {
            debug!(source = %self.config.source, url, "robots.txt disallows path, skipping");
            return Ok(ExtractOutcome::Skip(SkipReason::Ad));
        }

        let response = self
            .client
            .fetch(url, &self.config.source, &self.current_run_id(), params.use_proxy)
            .await?;
        let doc = Html::parse_document(&response.body);

        if !self.has_match(&doc, &self.config.selectors.title) || !self.has_match(&doc, &self.config.selectors.content) {
            return Ok(ExtractOutcome::Skip(SkipReason::Unparsable));
        }

        let title = self.select_text(&doc, &self.config.selectors.title).unwrap_or_default();
        let content_html = self
            .select_html(&doc, &self.config.selectors.content)
            .unwrap_or_default();
        let content = html_to_text(&content_html);

        if title.is_empty() || content.trim().is_empty() {
            return Ok(ExtractOutcome::Skip(SkipReason::Empty));
        }

        if contains_paywall_keyword(&content) {
            return Ok(ExtractOutcome::Skip(SkipReason::Paywall));
        }

        self.log_soft_ad_matches(url, &content);

        let author = self.select_text(&doc, &self.config.selectors.author);
        let category = self.select_text(&doc, &self.config.selectors.category_crumbs);
        let raw_publish_time = self.select_text(&doc, &self.config.selectors.publish_time);
        let publish_time = self.parse_publish_time(raw_publish_time.as_deref(), url);
        let images = self.select_images(&doc, &self.config.selectors.images);

        if let Some(days) = params.days {
            if days > 0 {
                if let Some(published) = publish_time {
                    let cutoff = Utc::now() - ChronoDuration::days(days as i64);
                    if published < cutoff {
                        return Ok(ExtractOutcome::Skip(SkipReason::TooOld));
                    }
                }
            }
        }

        let mut draft = DraftArticle::new(response.final_url.clone());
        draft.title = title;
        draft.content = content;
        draft.content_html = content_html;
        draft.author = author;
        draft.category = category;
        draft.publish_time = publish_time;
        draft.images = images;

        Ok(ExtractOutcome::Article(draft))
    }

    fn name(&self) -> &str {
        &self.config.source
    }

    fn begin_run(&self, run_id: &str) {
        *self.run_id.lock().unwrap() = run_id.to_string();
        *self.robots.lock().unwrap() = None;
    }
}

fn resolve_url(base: &str, href: &str) -> String {
    match url::Url::parse(base).and_then(|b| b.join(href)) {
        Ok(joined) => joined.to_string(),
        Err(_) => href.to_string(),
    }
}

fn parse_absolute(raw: &str) -> Option<DateTime<Utc>> {
    const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y年%m月%d日 %H:%M"];
    for fmt in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

fn parse_relative(raw: &str) -> Option<DateTime<Utc>> {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    let n: i64 = digits.parse().ok()?;
    if raw.contains("分钟前") {
        Some(Utc::now() - ChronoDuration::minutes(n))
    } else if raw.contains("小时前") {
        Some(Utc::now() - ChronoDuration::hours(n))
    } else if raw.contains("天前") {
        Some(Utc::now() - ChronoDuration::days(n))
    } else {
        None
    }
}

fn contains_paywall_keyword(content: &str) -> bool {
    PAYWALL_KEYWORDS.iter().any(|kw| content.contains(kw))
}

fn parse_date_from_url(url: &str) -> Option<DateTime<Utc>> {
    let re = Regex::new(r"/(20\d{2})[-/]?(\d{2})[-/]?(\d{2})/").ok()?;
    let caps = re.captures(url)?;
    let y: i32 = caps[1].parse().ok()?;
    let m: u32 = caps[2].parse().ok()?;
    let d: u32 = caps[3].parse().ok()?;
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single()
}
