use futures::stream::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Default cap on a feed body.
pub const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Errors that can occur while downloading a feed body.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Limits applied to a single feed download.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-attempt timeout for the request and headers.
    pub timeout: Duration,
    /// Largest body accepted, in bytes.
    pub max_size: usize,
    /// Retries after the first attempt for 429, 5xx and truncated bodies.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on every further retry.
    pub backoff: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_size: MAX_FEED_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_secs(1),
        }
    }
}

impl FetchOptions {
    fn delay(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(retry)) // 1s, 2s, 4s
    }
}

/// Downloads a feed body.
///
/// 429, 5xx and truncated bodies are retried up to `options.max_retries`
/// times with doubling backoff. Every other failure is returned at once.
///
/// # Errors
///
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::Timeout`] - An attempt exceeded `options.timeout`
/// - [`FetchError::HttpStatus`] - Non-2xx response, or 5xx after max retries
/// - [`FetchError::RateLimited`] - 429 response after max retries
/// - [`FetchError::ResponseTooLarge`] - Body exceeded `options.max_size`
/// - [`FetchError::IncompleteResponse`] - Body still truncated after max retries
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    options: &FetchOptions,
) -> Result<Vec<u8>, FetchError> {
    let mut retry = 0;

    loop {
        let error = match fetch_once(client, url, options).await {
            Ok(bytes) => {
                tracing::debug!(feed = %url, bytes = bytes.len(), "Feed downloaded");
                return Ok(bytes);
            }
            Err(error) => error,
        };

        if !error.is_transient() {
            return Err(error);
        }
        if retry >= options.max_retries {
            return Err(match error {
                FetchError::HttpStatus(429) => FetchError::RateLimited(options.max_retries),
                other => other,
            });
        }

        let delay = options.delay(retry);
        tracing::warn!(
            feed = %url,
            error = %error,
            retry,
            delay_ms = delay.as_millis() as u64,
            "Feed download failed, retrying"
        );
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}

impl FetchError {
    /// Failures worth another attempt after a pause.
    fn is_transient(&self) -> bool {
        match self {
            FetchError::HttpStatus(status) => *status == 429 || (500..600).contains(status),
            FetchError::IncompleteResponse { .. } => true,
            _ => false,
        }
    }
}

/// One GET with no retries. Non-2xx statuses, 429 included, come back as
/// [`FetchError::HttpStatus`].
async fn fetch_once(
    client: &reqwest::Client,
    url: &str,
    options: &FetchOptions,
) -> Result<Vec<u8>, FetchError> {
    let response = tokio::time::timeout(options.timeout, client.get(url).send())
        .await
        .map_err(|_| FetchError::Timeout)??;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    read_body(response, options.max_size).await
}

/// Streams the body into memory, refusing anything past `limit` bytes and
/// anything shorter than its declared `Content-Length`.
async fn read_body(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, FetchError> {
    let declared = response.content_length();
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(FetchError::ResponseTooLarge);
    }

    let mut body = Vec::with_capacity(declared.map_or(0, |len| len as usize));
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        body.extend_from_slice(&chunk);
    }

    match declared {
        Some(expected) if (body.len() as u64) < expected => Err(FetchError::IncompleteResponse {
            expected,
            received: body.len(),
        }),
        _ => Ok(body),
    }
}
