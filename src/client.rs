//! HTTP client with bounded exponential backoff for metadata requests.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use crate::error::{MetadataError, TransportError};

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Default upper bound on the delay between attempts.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Default number of attempts per request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default per-request transport timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Link-local metadata address shared by EC2, OpenStack and DigitalOcean.
pub const LINK_LOCAL_BASE_URL: &str = "http://169.254.169.254";

/// Retry and transport settings for a [`RetryClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
    pub timeout: Duration,
    pub max_body_size: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: DEFAULT_TIMEOUT,
            max_body_size: None,
        }
    }
}

impl RetryConfig {
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Set the attempt budget. Zero is treated as a single attempt.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fail with `MetadataError::TooLarge` for bodies above `max_size` bytes.
    pub fn with_max_body_size(mut self, max_size: usize) -> Self {
        self.max_body_size = Some(max_size);
        self
    }

    /// Delays inserted between consecutive attempts.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.initial_backoff.min(self.max_backoff),
            max: self.max_backoff,
        }
    }
}

/// Doubling delay sequence clamped to a maximum.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        Some(current)
    }
}

/// Build a header map holding a single static header.
///
/// `name` must be lowercase.
pub fn static_header(name: &'static str, value: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(name),
        HeaderValue::from_static(value),
    );
    headers
}

/// Metadata service client that classifies responses as present, absent or failed.
///
/// A 2xx response is returned as `Some(body)` even when the body is empty;
/// callers decide whether an empty body means "absent". A 404 is `None`.
/// Connection failures and 5xx responses are retried with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryClient {
    inner: Client,
    base_url: String,
    config: RetryConfig,
}

impl RetryClient {
    /// Create a client whose requests all carry `headers`.
    pub fn new(
        config: RetryConfig,
        base_url: &str,
        headers: HeaderMap,
    ) -> Result<Self, reqwest::Error> {
        let inner = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        })
    }

    /// Create a client with default retry settings and no extra headers.
    pub fn with_base_url(base_url: &str) -> Result<Self, reqwest::Error> {
        Self::new(RetryConfig::default(), base_url, HeaderMap::new())
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Resolve `path` against the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET `path` relative to the base URL.
    pub async fn fetch(&self, path: &str) -> Result<Option<Vec<u8>>, MetadataError> {
        self.get(&self.url(path)).await
    }

    /// GET an absolute URL.
    pub async fn get(&self, url: &str) -> Result<Option<Vec<u8>>, MetadataError> {
        self.get_with_headers(url, &HeaderMap::new()).await
    }

    /// GET an absolute URL with additional per-request headers.
    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<Option<Vec<u8>>, MetadataError> {
        let attempts = self.config.max_attempts.max(1);
        let mut delays = self.config.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(url, attempt, "requesting metadata");

            let cause = match self.inner.get(url).headers(headers.clone()).send().await {
                Ok(response) => match classify(response, self.config.max_body_size).await {
                    Ok(body) => return Ok(body),
                    Err(Attempt::Retry(cause)) => cause,
                    Err(Attempt::Fatal(err)) => return Err(err),
                },
                Err(err) => TransportError::Request(err),
            };

            if attempt >= attempts {
                return Err(MetadataError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    source: cause,
                });
            }

            let delay = delays.next().unwrap_or(self.config.max_backoff);
            warn!(url, attempt, error = %cause, "metadata request failed, retrying in {delay:?}");
            tokio::time::sleep(delay).await;
        }
    }
}

enum Attempt {
    Retry(TransportError),
    Fatal(MetadataError),
}

async fn classify(response: Response, max_size: Option<usize>) -> Result<Option<Vec<u8>>, Attempt> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if status.is_server_error() {
        return Err(Attempt::Retry(TransportError::Status(status.as_u16())));
    }
    if !status.is_success() {
        return Err(Attempt::Fatal(MetadataError::Http(status.as_u16())));
    }

    match read_body_limited(response, max_size).await {
        Ok(body) => Ok(Some(body)),
        Err(MetadataError::Request(err)) => Err(Attempt::Retry(TransportError::Request(err))),
        Err(err) => Err(Attempt::Fatal(err)),
    }
}

/// Read response body with an optional size limit.
///
/// If `max_size` is `Some`, the `Content-Length` header is checked first and
/// the body is then read chunk by chunk, aborting as soon as the limit is
/// exceeded.
pub async fn read_body_limited(
    response: Response,
    max_size: Option<usize>,
) -> Result<Vec<u8>, MetadataError> {
    let Some(max_size) = max_size else {
        return Ok(response.bytes().await?.to_vec());
    };

    if let Some(content_length) = response.content_length() {
        if content_length as usize > max_size {
            return Err(MetadataError::TooLarge(content_length as usize, max_size));
        }
    }

    let capacity = response
        .content_length()
        .map(|cl| (cl as usize).min(max_size))
        .unwrap_or(max_size.min(8192));
    let mut body = Vec::with_capacity(capacity);

    let mut stream = response;
    while let Some(chunk) = stream.chunk().await? {
        let total = body.len().saturating_add(chunk.len());
        if total > max_size {
            return Err(MetadataError::TooLarge(total, max_size));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}
