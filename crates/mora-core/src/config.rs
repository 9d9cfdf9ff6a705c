use crate::{MoraError, Result};
use std::time::Duration;

/// Configuration for one crawl invocation. Constructed by the caller,
/// handed to the orchestrator, and never mutated after that.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum number of pages dispatched to the fetcher.
    pub max_pages: usize,
    /// Optional cap on accumulated records; `None` means unbounded.
    pub max_records: Option<usize>,
    /// Maximum number of in-flight fetches.
    pub concurrency: usize,
    /// Minimum interval between consecutive HTTP requests, shared across
    /// workers.
    pub rate_limit: Duration,
    /// Fetch attempts per ref before a transient failure is escalated.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between retries.
    pub backoff_base: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Whether per-listing detail links are added to the frontier.
    pub follow_details: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            max_records: None,
            concurrency: 4,
            rate_limit: Duration::from_millis(500),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            follow_details: true,
        }
    }
}

impl CrawlConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(MoraError::Config(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(MoraError::Config(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.max_pages == 0 {
            return Err(MoraError::Config(
                "max_pages must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Backoff delay before the given retry attempt (1-based): doubles on
    /// every attempt after the first.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}
