use std::fmt;
use std::io::{Cursor, Read};
use std::time::Duration;

use camino::Utf8Path;
use rand::Rng;
use rand::seq::SliceRandom;
use reqwest::blocking::Client;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, DNT, HeaderMap, HeaderValue, REFERER, USER_AGENT,
};
use tracing::{debug, error, warn};

use crate::error::{ScraperError, is_retryable_status};
use crate::pacing::{DelayRange, Pacer};
use crate::store::Store;
use crate::validate::{ImageDimensions, check_dimensions};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const SEARCH_REFERER: &str = "https://www.bing.com/";

const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36 Edg/91.0.864.59",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
];

/// A response whose body has not been read yet.
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    body: Box<dyn Read + Send>,
}

impl TransportResponse {
    pub fn new(status: u16, content_type: Option<String>, body: impl Read + Send + 'static) -> Self {
        Self {
            status,
            content_type,
            body: Box::new(body),
        }
    }

    pub fn from_bytes(status: u16, content_type: Option<&str>, body: Vec<u8>) -> Self {
        Self::new(status, content_type.map(str::to_string), Cursor::new(body))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|value| value.trim().to_ascii_lowercase().starts_with("image/"))
    }

    pub fn read_body(mut self) -> Result<Vec<u8>, ScraperError> {
        let mut buffer = Vec::new();
        self.body
            .read_to_end(&mut buffer)
            .map_err(|err| ScraperError::BodyRead(err.to_string()))?;
        Ok(buffer)
    }

    pub fn read_text(self) -> Result<String, ScraperError> {
        let bytes = self.read_body()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// One HTTP GET. Shared by the search providers and the downloader.
pub trait Transport {
    fn get(&self, url: &str) -> Result<TransportResponse, ScraperError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str) -> Result<TransportResponse, ScraperError> {
        (**self).get(url)
    }
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ScraperError> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ScraperError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<TransportResponse, ScraperError> {
        let response = self
            .client
            .get(url)
            .headers(random_headers())
            .send()
            .map_err(map_request_error)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok(TransportResponse::new(status, content_type, response))
    }
}

/// Browser-like headers with a user agent picked per request.
pub fn random_headers() -> HeaderMap {
    let agent = USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0]);
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(agent));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(REFERER, HeaderValue::from_static(SEARCH_REFERER));
    headers.insert(DNT, HeaderValue::from_static("1"));
    headers
}

fn map_request_error(err: reqwest::Error) -> ScraperError {
    if err.is_timeout() {
        ScraperError::HttpTimeout(err.to_string())
    } else if err.is_builder() {
        ScraperError::InvalidUrl(err.to_string())
    } else {
        ScraperError::Http(err.to_string())
    }
}

/// Bounded retry for transient faults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff: DelayRange,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

    pub fn new(max_attempts: usize, backoff: DelayRange) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// `attempts_made` counts the attempts already issued, starting at 1.
    pub fn should_retry(&self, attempts_made: usize) -> bool {
        attempts_made < self.max_attempts
    }

    pub fn backoff<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        self.backoff.sample(rng)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, DelayRange::new(2.0, 7.0))
    }
}

/// Why a URL was judged unusable. Never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Status(u16),
    NotImage(String),
    InvalidImage,
    Request(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Status(status) => write!(f, "http status {status}"),
            Rejection::NotImage(content_type) => write!(f, "not an image ({content_type})"),
            Rejection::InvalidImage => write!(f, "undecodable or undersized image"),
            Rejection::Request(message) => write!(f, "request error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved {
        bytes: usize,
        dimensions: ImageDimensions,
    },
    Rejected(Rejection),
    Failed {
        attempts: usize,
        reason: String,
    },
}

impl DownloadOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, DownloadOutcome::Saved { .. })
    }
}

enum AttemptError {
    Rejected(Rejection),
    Transient(ScraperError),
}

pub struct Downloader<T, Z> {
    transport: T,
    pacer: Z,
    retry: RetryPolicy,
}

impl<T, Z> Downloader<T, Z>
where
    T: Transport,
    Z: Pacer,
{
    pub fn new(transport: T, pacer: Z, retry: RetryPolicy) -> Self {
        Self {
            transport,
            pacer,
            retry,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn pacer(&self) -> &Z {
        &self.pacer
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Fetches, validates and writes `url` to `destination`. Does not check
    /// whether `destination` already exists.
    pub fn download(
        &self,
        url: &str,
        destination: &Utf8Path,
        min_width: u32,
        min_height: u32,
    ) -> DownloadOutcome {
        let mut attempts = 0usize;
        let (content, dimensions) = loop {
            attempts += 1;
            match self.attempt(url, min_width, min_height) {
                Ok(validated) => break validated,
                Err(AttemptError::Rejected(rejection)) => {
                    debug!(url, reason = %rejection, "download rejected");
                    return DownloadOutcome::Rejected(rejection);
                }
                Err(AttemptError::Transient(err)) if self.retry.should_retry(attempts) => {
                    warn!(
                        url,
                        attempt = attempts,
                        max_attempts = self.retry.max_attempts,
                        error = %err,
                        "retrying download"
                    );
                    self.pacer.pause(self.retry.backoff, "download retry");
                }
                Err(AttemptError::Transient(err)) => {
                    error!(url, attempts, error = %err, "download failed");
                    return DownloadOutcome::Failed {
                        attempts,
                        reason: err.to_string(),
                    };
                }
            }
        };

        if let Err(err) = Store::write_bytes_atomic(destination, &content) {
            error!(url, path = %destination, error = %err, "failed to write image");
            return DownloadOutcome::Failed {
                attempts,
                reason: err.to_string(),
            };
        }
        DownloadOutcome::Saved {
            bytes: content.len(),
            dimensions,
        }
    }

    fn attempt(
        &self,
        url: &str,
        min_width: u32,
        min_height: u32,
    ) -> Result<(Vec<u8>, ImageDimensions), AttemptError> {
        let response = self.transport.get(url).map_err(classify_error)?;
        if !response.is_success() {
            if is_retryable_status(response.status) {
                return Err(AttemptError::Transient(ScraperError::HttpStatus {
                    status: response.status,
                    url: url.to_string(),
                }));
            }
            return Err(AttemptError::Rejected(Rejection::Status(response.status)));
        }
        if !response.is_image() {
            let content_type = response.content_type.clone().unwrap_or_default();
            return Err(AttemptError::Rejected(Rejection::NotImage(content_type)));
        }
        let content = response.read_body().map_err(AttemptError::Transient)?;
        let dimensions = check_dimensions(&content, min_width, min_height)
            .ok_or(AttemptError::Rejected(Rejection::InvalidImage))?;
        Ok((content, dimensions))
    }
}

fn classify_error(err: ScraperError) -> AttemptError {
    if err.is_transient() {
        AttemptError::Transient(err)
    } else {
        AttemptError::Rejected(Rejection::Request(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_bounds_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(RetryPolicy::new(0, DelayRange::zero()).max_attempts, 1);
    }

    #[test]
    fn content_type_gate_is_case_insensitive() {
        let response = TransportResponse::from_bytes(200, Some("Image/PNG"), Vec::new());
        assert!(response.is_image());
        let response = TransportResponse::from_bytes(200, Some("text/html; charset=utf-8"), Vec::new());
        assert!(!response.is_image());
        let response = TransportResponse::from_bytes(200, None, Vec::new());
        assert!(!response.is_image());
    }

    #[test]
    fn headers_carry_referer_and_agent() {
        let headers = random_headers();
        assert_eq!(headers[REFERER], SEARCH_REFERER);
        let agent = headers[USER_AGENT].to_str().unwrap();
        assert!(USER_AGENTS.contains(&agent));
    }
}
