pub mod crawl;
pub mod fetch;
pub mod inmuebles24;

use async_trait::async_trait;
use mora_core::{CandidateRecord, FetchError, ListingSourceRef, ParseError, RawPage};
use std::sync::Arc;

pub use crawl::{merge_records, CrawlOutcome, Crawler};
pub use fetch::{HttpFetcher, HttpTransport, PageTransport, RetryingFetcher};
pub use inmuebles24::Inmuebles24Parser;

/// Enum representing different property listing sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Inmuebles24-style listing portal
    Inmuebles24,
    // Add more sources here as we implement them
}

/// I/O boundary of the pipeline: retrieves one page for a source ref.
/// Implementations own their rate limiting and retry policy; mock
/// implementations drive the orchestrator in tests.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &ListingSourceRef) -> Result<RawPage, FetchError>;
}

/// Everything a single page yields: zero or more candidate records plus
/// the navigation refs (pagination and per-listing detail links) that
/// expand the frontier.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub candidates: Vec<CandidateRecord>,
    pub next_refs: Vec<ListingSourceRef>,
}

/// Pure page-to-candidates transform. Deterministic given identical input
/// bytes; no I/O, no shared state.
pub trait PageParser: Send + Sync {
    fn parse(&self, page: &RawPage) -> Result<ParsedPage, ParseError>;
}

/// Factory for creating parser instances
pub struct ParserFactory;

impl ParserFactory {
    pub fn create_parser(kind: SourceKind) -> Arc<dyn PageParser> {
        match kind {
            SourceKind::Inmuebles24 => Arc::new(Inmuebles24Parser::new()),
            // Add more cases here as we implement more sources
        }
    }
}
