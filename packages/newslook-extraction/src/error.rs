//! Typed errors for the crawler engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling that mirrors the error
//! taxonomy of the ingestion pipeline: network/timeout/http failures
//! from the HTTP client, parse/encoding failures from extraction,
//! validation/duplicate/storage failures from the pipeline.

use thiserror::Error;

/// Security-related errors, primarily for SSRF protection.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// URL scheme not allowed (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// Host is blocked (e.g., localhost, internal IPs)
    #[error("blocked host: {0}")]
    BlockedHost(String),

    /// IP in blocked CIDR range (e.g., 10.0.0.0/8)
    #[error("blocked IP range: {0}")]
    BlockedCidr(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// DNS resolution failed
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias for security operations.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;

/// Crawl errors, kinds not names.
///
/// This is the taxonomy used across the HTTP Client, Extractor, and
/// Ingestion Pipeline. `DuplicateError` and `Cancelled` are expected
/// outcomes, not failures, and are never logged at `error` level.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Transport failure, DNS, connection reset, TLS.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Deadline exceeded on HTTP or pipeline stage.
    #[error("timeout fetching {url} after {elapsed_ms}ms")]
    Timeout { url: String, elapsed_ms: u64 },

    /// Non-retriable upstream status after retries exhausted.
    #[error("http {status} fetching {url}")]
    Http { url: String, status: u16, retry_after_ms: Option<u64> },

    /// Extractor could not obtain required fields.
    #[error("could not parse article at {url}: {reason}")]
    Parse { url: String, reason: String },

    /// Body could not be decoded to text under any candidate encoding.
    #[error("could not decode body from {url} in any known encoding")]
    Encoding { url: String },

    /// Ingestion input missing required fields.
    #[error("invalid article: {reason}")]
    Validation { reason: String },

    /// URL/id already present; expected, not logged as an error.
    #[error("duplicate article: {url}")]
    Duplicate { url: String },

    /// SQLite failure other than busy (corruption, disk full, etc).
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Bad or missing configuration at startup; fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// Cooperative cancellation; expected.
    #[error("cancelled")]
    Cancelled,

    /// SSRF / scheme / host validation failed before dialing out.
    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    /// robots.txt disallows the path.
    #[error("robots.txt disallows: {url}")]
    RobotsDisallowed { url: String },

    /// Rate limiter reports the request budget is exhausted.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Article was explicitly skipped by the extractor (not an error path).
    #[error("skipped: {0:?}")]
    Skipped(crate::types::article::SkipReason),
}

impl CrawlError {
    /// Whether the HTTP client should retry this error.
    ///
    /// retry on connect/read timeout, 5xx, and 429;
    /// never retry other 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            CrawlError::Network { .. } | CrawlError::Timeout { .. } => true,
            CrawlError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    pub fn duplicate(url: impl Into<String>) -> Self {
        CrawlError::Duplicate { url: url.into() }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, CrawlError::Duplicate { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CrawlError::Cancelled)
    }
}

/// Result type alias for crawl/pipeline operations.
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_retries_5xx_and_429_only() {
        assert!(CrawlError::Http { url: "x".into(), status: 503, retry_after_ms: None }.is_retryable());
        assert!(CrawlError::Http { url: "x".into(), status: 429, retry_after_ms: None }.is_retryable());
        assert!(!CrawlError::Http { url: "x".into(), status: 404, retry_after_ms: None }.is_retryable());
        assert!(!CrawlError::Http { url: "x".into(), status: 401, retry_after_ms: None }.is_retryable());
        assert!(CrawlError::Timeout { url: "x".into(), elapsed_ms: 1 }.is_retryable());
    }

    #[test]
    fn duplicate_is_not_retryable_or_an_error() {
        let e = CrawlError::duplicate("https://x/1");
        assert!(e.is_duplicate());
        assert!(!e.is_retryable());
    }
}
