use crate::Fetcher;
use async_trait::async_trait;
use chrono::Utc;
use mora_core::{CrawlConfig, FetchError, ListingSourceRef, RawPage, Result};
use reqwest::{Client, StatusCode};
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// A single fetch attempt against a listing source. Separated from the
/// retry policy so the policy can be tested without a network.
#[async_trait]
pub trait PageTransport: Send + Sync {
    async fn attempt(&self, source: &ListingSourceRef)
        -> std::result::Result<RawPage, FetchError>;
}

/// Bounded-retry wrapper around a transport: transient failures are retried
/// with exponential backoff up to `max_attempts`, permanent failures are
/// returned immediately.
pub struct RetryingFetcher<T> {
    transport: T,
    config: CrawlConfig,
}

impl<T: PageTransport> RetryingFetcher<T> {
    pub fn with_transport(transport: T, config: CrawlConfig) -> Self {
        Self { transport, config }
    }
}

#[async_trait]
impl<T: PageTransport> Fetcher for RetryingFetcher<T> {
    async fn fetch(&self, source: &ListingSourceRef) -> std::result::Result<RawPage, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("fetching {} (attempt {})", source.url, attempt);

            match self.transport.attempt(source).await {
                Ok(page) => return Ok(page),
                Err(error @ FetchError::Permanent { .. }) => return Err(error),
                Err(error) => {
                    if attempt >= self.config.max_attempts {
                        warn!("giving up on {} after {} attempts", source.url, attempt);
                        return Err(error);
                    }
                    let delay = self.config.backoff_delay(attempt);
                    warn!(
                        "retrying {} in {:?} after transient failure: {}",
                        source.url, delay, error
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// The production fetcher: HTTP transport plus retry policy.
pub type HttpFetcher = RetryingFetcher<HttpTransport>;

impl RetryingFetcher<HttpTransport> {
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.clone())?;
        Ok(Self::with_transport(transport, config))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum StatusClass {
    Success,
    Transient,
    Permanent,
}

/// 429 and 5xx are worth retrying; any other non-success status means the
/// ref itself is bad.
fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusClass::Transient
    } else {
        StatusClass::Permanent
    }
}

fn classify_reqwest_error(url: &Url, error: reqwest::Error) -> FetchError {
    let url = url.to_string();
    let reason = error.to_string();
    if error.is_builder() || error.is_redirect() {
        FetchError::Permanent { url, reason }
    } else {
        // Timeouts, connect failures and body errors may resolve on retry.
        FetchError::Transient { url, reason }
    }
}

/// HTTP transport with a shared rate-limit clock.
///
/// The clock mutex is held across the pacing sleep on purpose: it is the
/// single serialization point that keeps concurrent workers from hitting
/// the listing source faster than the configured interval.
pub struct HttpTransport {
    client: Client,
    config: CrawlConfig,
    last_request: Mutex<Option<Instant>>,
}

impl HttpTransport {
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            last_request: Mutex::new(None),
        })
    }

    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.config.rate_limit {
                sleep(self.config.rate_limit - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl PageTransport for HttpTransport {
    async fn attempt(
        &self,
        source: &ListingSourceRef,
    ) -> std::result::Result<RawPage, FetchError> {
        let url = &source.url;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::Permanent {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        self.pace().await;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|error| classify_reqwest_error(url, error))?;

        let status = response.status();
        match classify_status(status) {
            StatusClass::Success => {
                let body = response
                    .text()
                    .await
                    .map_err(|error| classify_reqwest_error(url, error))?;
                Ok(RawPage {
                    source: source.clone(),
                    status: status.as_u16(),
                    body,
                    fetched_at: Utc::now(),
                })
            }
            StatusClass::Transient => Err(FetchError::Transient {
                url: url.to_string(),
                reason: format!("status {}", status),
            }),
            StatusClass::Permanent => Err(FetchError::Permanent {
                url: url.to_string(),
                reason: format!("status {}", status),
            }),
        }
    }
}
