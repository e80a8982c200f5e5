//! HTTP Client.
//!
//! Retries with full-jitter exponential backoff, User-Agent rotation,
//! per-call timeout, and a FetchOutcome emitted for every attempt.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::Client as ReqwestClient;
use tracing::{debug, warn};

use crate::error::{CrawlError, CrawlResult};
use crate::http::encoding::decode_body;
use crate::http::robots::RobotsTxt;
use crate::security::UrlValidator;
use crate::types::config::HttpClientConfig;
use crate::types::fetch::{FetchOutcome, FetchResult, FetchSink, NullFetchSink};

/// Outcome of a successful fetch: decoded text body, final URL after
/// redirects, and the HTTP status. Per-attempt lineage events are
/// reported to the client's `FetchSink` as they happen, not collected
/// here.
pub struct FetchResponse {
    pub body: String,
    pub final_url: String,
    pub status: u16,
}

/// Performs GET requests with retry, jittered backoff, and UA rotation.
///
/// Safe for concurrent use: `reqwest::Client` pools connections
/// internally, and `fetch` holds no mutable shared state besides the
/// atomic UA-rotation counter.
pub struct HttpClient {
    inner: ReqwestClient,
    /// Built from `config.proxy_url` when set; `fetch`'s `use_proxy`
    /// flag selects this client instead of `inner` per call. `None`
    /// when no proxy is configured, in which case `use_proxy` requests
    /// fall back to `inner`.
    proxied: Option<ReqwestClient>,
    config: HttpClientConfig,
    ua_index: AtomicUsize,
    validator: UrlValidator,
    sink: Arc<dyn FetchSink>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> CrawlResult<Self> {
        Self::build(config, UrlValidator::new(), Arc::new(NullFetchSink))
    }

    /// Build a client with a caller-supplied validator, e.g. one that
    /// additionally allow-lists the five publisher hosts this crate
    /// ships extractors for.
    pub fn with_validator(config: HttpClientConfig, validator: UrlValidator) -> CrawlResult<Self> {
        Self::build(config, validator, Arc::new(NullFetchSink))
    }

    /// Build a client that reports every HTTP attempt to `sink`, e.g.
    /// a Monitor tracking per-source fetch lineage.
    pub fn with_sink(config: HttpClientConfig, sink: Arc<dyn FetchSink>) -> CrawlResult<Self> {
        Self::build(config, UrlValidator::new(), sink)
    }

    pub fn with_validator_and_sink(
        config: HttpClientConfig,
        validator: UrlValidator,
        sink: Arc<dyn FetchSink>,
    ) -> CrawlResult<Self> {
        Self::build(config, validator, sink)
    }

    fn build(config: HttpClientConfig, validator: UrlValidator, sink: Arc<dyn FetchSink>) -> CrawlResult<Self> {
        let inner = ReqwestClient::builder()
            .timeout(Duration::from_millis(config.attempt_timeout_ms))
            .build()
            .map_err(|e| CrawlError::Config(format!("failed to build http client: {e}")))?;

        let proxied = match &config.proxy_url {
            Some(proxy_url) => {
                let proxy = reqwest::Proxy::all(proxy_url)
                    .map_err(|e| CrawlError::Config(format!("invalid proxy url: {e}")))?;
                let client = ReqwestClient::builder()
                    .timeout(Duration::from_millis(config.attempt_timeout_ms))
                    .proxy(proxy)
                    .build()
                    .map_err(|e| CrawlError::Config(format!("failed to build proxied http client: {e}")))?;
                Some(client)
            }
            None => None,
        };

        Ok(Self {
            inner,
            proxied,
            config,
            ua_index: AtomicUsize::new(0),
            validator,
            sink,
        })
    }

    fn next_user_agent(&self) -> &str {
        if self.config.user_agents.is_empty() {
            return "NewsLookBot/1.0";
        }
        let i = self.ua_index.fetch_add(1, Ordering::Relaxed) % self.config.user_agents.len();
        &self.config.user_agents[i]
    }

    /// GET `url`, retrying per its policy. `source` and `run_id`
    /// are carried on every emitted FetchOutcome for correlation.
    /// `use_proxy` routes the request through the client built from
    /// `config.proxy_url`, falling back to the direct client when no
    /// proxy was configured.
    pub async fn fetch(
        &self,
        url: &str,
        source: &str,
        run_id: &str,
        use_proxy: bool,
    ) -> CrawlResult<FetchResponse> {
        self.validator.validate_with_dns(url).await?;

        let client = if use_proxy {
            self.proxied.as_ref().unwrap_or(&self.inner)
        } else {
            &self.inner
        };

        let mut last_err: Option<CrawlError> = None;
        let mut attempts_made = 0u32;

        for attempt in 1..=self.config.max_attempts {
            let started = Instant::now();
            let result = self.try_once(client, url).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            attempts_made = attempt;

            match result {
                Ok((body_bytes, final_url, status, content_type)) => {
                    self.sink.fetch_outcome(
                        &FetchOutcome::new(url, source, run_id, attempt, FetchResult::Ok)
                            .with_status(status)
                            .with_bytes(body_bytes.len())
                            .with_elapsed_ms(elapsed_ms),
                    );

                    let body = decode_body(&body_bytes, content_type.as_deref())
                        .ok_or_else(|| CrawlError::Encoding { url: url.to_string() })?;

                    return Ok(FetchResponse { body, final_url, status });
                }
                Err(err) => {
                    let retryable = err.is_retryable();
                    self.sink.fetch_outcome(
                        &FetchOutcome::new(
                            url,
                            source,
                            run_id,
                            attempt,
                            if retryable { FetchResult::Retry } else { FetchResult::Fail },
                        )
                        .with_elapsed_ms(elapsed_ms),
                    );

                    if !retryable || attempt == self.config.max_attempts {
                        last_err = Some(err);
                        break;
                    }

                    // Honor an upstream `Retry-After` on 429 in place of the
                    // computed backoff; still capped so a
                    // misbehaving upstream can't stall a Worker indefinitely.
                    let retry_after = match &err {
                        CrawlError::Http { retry_after_ms: Some(ms), .. } => {
                            Some(Duration::from_millis(*ms).min(Duration::from_millis(self.config.backoff_cap_ms)))
                        }
                        _ => None,
                    };
                    let delay = retry_after.unwrap_or_else(|| self.backoff_delay(attempt));
                    debug!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
            }
        }

        warn!(url = %url, attempts = attempts_made, "fetch exhausted retries");

        Err(last_err.unwrap_or(CrawlError::Network {
            url: url.to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                "no attempts made",
            )),
        }))
    }

    async fn try_once(
        &self,
        client: &ReqwestClient,
        url: &str,
    ) -> CrawlResult<(Vec<u8>, String, u16, Option<String>)> {
        let response = client
            .get(url)
            .header("User-Agent", self.next_user_agent())
            .header("Accept-Language", "zh-CN,zh;q=0.9")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CrawlError::Timeout {
                        url: url.to_string(),
                        elapsed_ms: self.config.attempt_timeout_ms,
                    }
                } else {
                    CrawlError::Network {
                        url: url.to_string(),
                        source: Box::new(e),
                    }
                }
            })?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after_ms);
            return Err(CrawlError::Http {
                url: url.to_string(),
                status: status.as_u16(),
                retry_after_ms,
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CrawlError::Network {
                url: url.to_string(),
                source: Box::new(e),
            })?
            .to_vec();

        Ok((bytes, final_url, status.as_u16(), content_type))
    }

    /// Fetch and parse `{base_url}/robots.txt`. Advisory only: a fetch
    /// failure or missing file yields a permissive default rather than
    /// failing the caller's cycle.
    pub async fn fetch_robots_txt(&self, base_url: &str) -> RobotsTxt {
        crate::http::robots::fetch_robots_txt(&self.inner, base_url)
            .await
            .unwrap_or_default()
    }

    /// Full-jitter exponential backoff: `random(0, min(cap, base*2^n))`
    ///, `n` = zero-indexed retry count.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let n = attempt.saturating_sub(1);
        let exp = self.config.backoff_base_ms.saturating_mul(1u64 << n.min(20));
        let capped = exp.min(self.config.backoff_cap_ms);
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered)
    }
}

/// Parse a `Retry-After` header value: either delay-seconds or an
/// HTTP-date. The date form is converted to a millisecond delay
/// relative to now; a date in the past yields zero rather than an error.
fn parse_retry_after_ms(raw: &str) -> Option<u64> {
    if let Ok(secs) = raw.trim().parse::<u64>() {
        return Some(secs.saturating_mul(1_000));
    }
    let target = chrono::DateTime::parse_from_rfc2822(raw.trim()).ok()?;
    let now = chrono::Utc::now();
    let delta = target.with_timezone(&chrono::Utc) - now;
    Some(delta.num_milliseconds().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        outcomes: Mutex<Vec<FetchOutcome>>,
    }

    impl FetchSink for RecordingSink {
        fn fetch_outcome(&self, outcome: &FetchOutcome) {
            self.outcomes.lock().unwrap().push(outcome.clone());
        }
    }

    #[test]
    fn backoff_never_exceeds_cap() {
        let config = HttpClientConfig {
            backoff_base_ms: 1_000,
            backoff_cap_ms: 30_000,
            ..HttpClientConfig::default()
        };
        let client = HttpClient::new(config).unwrap();
        for attempt in 1..=10 {
            let d = client.backoff_delay(attempt);
            assert!(d.as_millis() as u64 <= 30_000);
        }
    }

    #[test]
    fn user_agent_rotation_cycles_through_pool() {
        let config = HttpClientConfig {
            user_agents: vec!["a".into(), "b".into()],
            ..HttpClientConfig::default()
        };
        let client = HttpClient::new(config).unwrap();
        assert_eq!(client.next_user_agent(), "a");
        assert_eq!(client.next_user_agent(), "b");
        assert_eq!(client.next_user_agent(), "a");
    }

    #[tokio::test]
    async fn fetch_rejects_ssrf_targets_before_dialing_out() {
        let client = HttpClient::new(HttpClientConfig::default()).unwrap();
        let result = client.fetch("http://127.0.0.1:9/x", "sina", "run-1", false).await;
        assert!(matches!(result, Err(CrawlError::Security(_))));
    }

    #[tokio::test]
    async fn fetch_with_use_proxy_falls_back_to_direct_client_when_unconfigured() {
        let client = HttpClient::new(HttpClientConfig::default()).unwrap();
        assert!(client.proxied.is_none());
        let result = client.fetch("http://127.0.0.1:9/x", "sina", "run-1", true).await;
        assert!(matches!(result, Err(CrawlError::Security(_))));
    }

    #[tokio::test]
    async fn fetch_reports_one_outcome_per_attempt_to_the_sink() {
        let config = HttpClientConfig {
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_cap_ms: 5,
            ..HttpClientConfig::default()
        };
        let validator = UrlValidator::new().allow_host("127.0.0.1");
        let sink = Arc::new(RecordingSink::default());
        let client = HttpClient::with_validator_and_sink(config, validator, sink.clone()).unwrap();

        // Nothing listens on this port; every attempt fails fast with a
        // connection error, which `is_retryable` treats as retryable.
        let result = client.fetch("http://127.0.0.1:9/x", "sina", "run-1", false).await;
        assert!(result.is_err());

        let recorded = sink.outcomes.lock().unwrap();
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[0].attempt, 1);
        assert_eq!(recorded[2].attempt, 3);
        assert!(recorded.iter().all(|o| o.result == FetchResult::Retry));
    }

    #[test]
    fn retry_after_parses_delay_seconds() {
        assert_eq!(parse_retry_after_ms("2"), Some(2_000));
    }

    #[test]
    fn retry_after_ignores_unparseable_values() {
        assert_eq!(parse_retry_after_ms("not-a-date-or-number"), None);
    }
}
