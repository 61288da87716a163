//! HTTP transport with bounded retries and rate-limit backoff.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

/// Exponential backoff schedule: retry `n` waits `backoff_factor * 2^n` seconds.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
            max_backoff: config.max_backoff,
        }
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = self.backoff_factor * 2f64.powi(attempt.min(63) as i32);
        if !secs.is_finite() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }

    /// Actual wait before retry `attempt`: a server `Retry-After` hint replaces
    /// the exponential value for that one retry.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.backoff(attempt))
    }

    /// Slots handed to `Retry::spawn`. The wait itself happens inside each
    /// attempt, where the `Retry-After` hint is known.
    fn schedule(self) -> impl Iterator<Item = Duration> {
        std::iter::repeat(Duration::ZERO).take(self.max_retries as usize)
    }
}

/// Statuses worth another attempt.
pub fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// Reads a delta-seconds `Retry-After` header.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// GET-oriented HTTP client shared by the listing client and the downloader.
///
/// All requests carry the configured `User-Agent` and, when a token is
/// configured, a static `Authorization` header. Requests are never issued
/// concurrently by this crate; the transport itself holds no state.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
    policy: RetryPolicy,
}

impl HttpTransport {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.oauth_token {
            let value = HeaderValue::from_str(&format!("OAuth {}", token))
                .map_err(|_| SyncError::Config("invalid OAuth token".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout: config.timeout,
            policy: RetryPolicy::from_config(config),
        })
    }

    /// Timeout applied to whole requests, and to each chunk read of a streamed body.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Issues a GET. See [`HttpTransport::send`].
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: HeaderMap,
        streaming: bool,
    ) -> Result<Response> {
        self.send(Method::GET, url, query, headers, streaming).await
    }

    /// Issues a request and returns the first successful response.
    ///
    /// 429 and 5xx gateway statuses as well as network failures are retried up
    /// to `max_retries` times; other statuses fail immediately with
    /// [`SyncError::HttpStatus`]. Non-streaming requests are bounded by the
    /// configured timeout as a whole; streaming ones only while connecting,
    /// the caller bounds the body reads.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        headers: HeaderMap,
        streaming: bool,
    ) -> Result<Response> {
        let attempts = AtomicU32::new(0);
        let action = || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed);
            self.attempt(method.clone(), url, query, &headers, streaming, attempt)
        };

        Retry::spawn(self.policy.schedule(), action).await
    }

    /// GETs a small body (JSON API responses) into memory.
    pub async fn get_bytes(&self, url: &str, query: &[(&str, &str)]) -> Result<Bytes> {
        let response = self.get(url, query, HeaderMap::new(), false).await?;
        response
            .bytes()
            .await
            .map_err(|e| SyncError::transport(url, e))
    }

    async fn attempt(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        headers: &HeaderMap,
        streaming: bool,
        attempt: u32,
    ) -> std::result::Result<Response, RetryError<SyncError>> {
        let mut request = self.client.request(method, url).headers(headers.clone());
        if !query.is_empty() {
            request = request.query(query);
        }
        if !streaming {
            request = request.timeout(self.timeout);
        }

        debug!("GET {} (attempt {})", url, attempt + 1);
        let (err, retry_after) = match request.send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
                    parse_retry_after(response.headers())
                } else {
                    None
                };
                let err = SyncError::HttpStatus {
                    url: url.to_string(),
                    status,
                    retry_after,
                };
                if !is_retryable(status) {
                    return Err(RetryError::Permanent(err));
                }
                (err, retry_after)
            }
            Err(e) => (SyncError::transport(url, e), None),
        };

        if attempt >= self.policy.max_retries {
            warn!("Giving up after {} attempt(s): {}", attempt + 1, err);
            return Err(RetryError::Permanent(err));
        }

        let delay = self.policy.delay_for(attempt, retry_after);
        if retry_after.is_some() {
            warn!("Rate limited by {}. Waiting {:?}...", url, delay);
        } else {
            warn!("{} (attempt {}), retrying in {:?}", err, attempt + 1, delay);
        }
        tokio::time::sleep(delay).await;

        Err(RetryError::Transient {
            err,
            retry_after: None,
        })
    }
}
