//! The Article entity and its supporting enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One of the five known publisher sources, or `Unknown` pending
/// re-classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Sina,
    Eastmoney,
    Tencent,
    Netease,
    Ifeng,
    Unknown,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Sina => "sina",
            Source::Eastmoney => "eastmoney",
            Source::Tencent => "tencent",
            Source::Netease => "netease",
            Source::Ifeng => "ifeng",
            Source::Unknown => "unknown",
        }
    }

    pub fn all() -> [Source; 5] {
        [
            Source::Sina,
            Source::Eastmoney,
            Source::Tencent,
            Source::Netease,
            Source::Ifeng,
        ]
    }
}

impl std::str::FromStr for Source {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "sina" => Source::Sina,
            "eastmoney" => Source::Eastmoney,
            "tencent" => Source::Tencent,
            "netease" => Source::Netease,
            "ifeng" => Source::Ifeng,
            _ => Source::Unknown,
        })
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse lexicon-based sentiment label; deliberately no deeper
/// semantic analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

/// A stock code/name pair referenced by an article (derived, may be empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRef {
    pub code: String,
    pub name: String,
}

/// Why a candidate URL was skipped instead of becoming an Article,
/// returned by `fetch_article` or assigned during pipeline validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Ad,
    Paywall,
    Empty,
    Unparsable,
    TooOld,
    Invalid,
    Duplicate,
}

/// The primary ingested entity.
///
/// `id` and `crawl_time` are derived at ingestion time and are never
/// supplied by an Extractor directly; Extractors populate everything
/// else and leave `id`/`crawl_time`/`keywords`/`sentiment` to be filled
/// in by the [`crate::pipeline`] during canonicalization/enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub content_html: String,
    pub author: Option<String>,
    pub category: Option<String>,
    pub source: Source,
    pub publish_time: Option<DateTime<Utc>>,
    pub crawl_time: DateTime<Utc>,
    pub keywords: Vec<String>,
    pub related_stocks: Vec<StockRef>,
    pub sentiment: Sentiment,
    pub images: Vec<String>,
}

impl Article {
    /// Derive the stable article id from a canonical URL: the first 16
    /// hex characters of its SHA-256 digest.
    pub fn derive_id(canonical_url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(canonical_url.as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }
}

/// A draft Article as produced by an Extractor, before canonicalization,
/// id assignment, dedup, and enrichment by the Ingestion Pipeline.
#[derive(Debug, Clone, Default)]
pub struct DraftArticle {
    pub url: String,
    pub title: String,
    pub content: String,
    pub content_html: String,
    pub author: Option<String>,
    pub category: Option<String>,
    pub publish_time: Option<DateTime<Utc>>,
    pub images: Vec<String>,
}

impl DraftArticle {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Minimal hex encoding, avoiding an extra dependency for a one-line need.
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        let mut s = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_id_is_deterministic() {
        let a = Article::derive_id("https://finance.sina.com.cn/x/1");
        let b = Article::derive_id("https://finance.sina.com.cn/x/1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn derive_id_differs_per_url() {
        let a = Article::derive_id("https://finance.sina.com.cn/x/1");
        let b = Article::derive_id("https://finance.sina.com.cn/x/2");
        assert_ne!(a, b);
    }

    #[test]
    fn source_roundtrips_through_str() {
        for s in Source::all() {
            let parsed: Source = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn unknown_source_from_unrecognized_str() {
        let parsed: Source = "made-up".parse().unwrap();
        assert_eq!(parsed, Source::Unknown);
    }
}
