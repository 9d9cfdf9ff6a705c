//! Crawl orchestration: drives fetch → parse → normalize across a paginated
//! frontier with a bounded worker pool. Workers never touch crawl state;
//! they report back and a single coordinator applies every mutation, so the
//! frontier, the visited set and the record map need no locking.

use crate::{Fetcher, PageParser};
use mora_core::{
    normalize, normalized_url_key, CrawlConfig, CrawlStatus, CrawlSummary, FetchError,
    ListingSourceRef, ParseError, PropertyRecord, Result,
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Records plus the result summary; returned by every crawl, including
/// aborted ones.
#[derive(Debug)]
pub struct CrawlOutcome {
    pub records: Vec<PropertyRecord>,
    pub summary: CrawlSummary,
}

/// Merge policy for records sharing an id: the more complete record wins,
/// ties go to the more recently fetched one. Order-independent, which keeps
/// the final record set deterministic under concurrent page arrival.
pub fn merge_records(existing: PropertyRecord, incoming: PropertyRecord) -> PropertyRecord {
    match incoming.completeness().cmp(&existing.completeness()) {
        Ordering::Greater => incoming,
        Ordering::Less => existing,
        Ordering::Equal => {
            if incoming.fetched_at > existing.fetched_at {
                incoming
            } else {
                existing
            }
        }
    }
}

/// Ephemeral per-crawl state, owned and mutated only by the coordinator.
struct CrawlState {
    frontier: VecDeque<ListingSourceRef>,
    visited: HashSet<String>,
    records: HashMap<String, PropertyRecord>,
}

impl CrawlState {
    fn new() -> Self {
        Self {
            frontier: VecDeque::new(),
            visited: HashSet::new(),
            records: HashMap::new(),
        }
    }

    /// Add a ref to the frontier unless its normalized URL was already seen.
    fn enqueue(&mut self, source: ListingSourceRef) -> bool {
        if self.visited.insert(source.dedup_key()) {
            self.frontier.push_back(source);
            true
        } else {
            false
        }
    }

    fn insert_record(&mut self, record: PropertyRecord) {
        match self.records.remove(&record.id) {
            Some(existing) => {
                let merged = merge_records(existing, record);
                self.records.insert(merged.id.clone(), merged);
            }
            None => {
                self.records.insert(record.id.clone(), record);
            }
        }
    }
}

enum PageOutcome {
    Parsed {
        records: Vec<PropertyRecord>,
        next_refs: Vec<ListingSourceRef>,
        dropped: usize,
    },
    FetchFailed(FetchError),
    LayoutUnrecognized,
}

struct WorkerReport {
    source: ListingSourceRef,
    outcome: PageOutcome,
}

/// Drives one crawl invocation over a fetcher and a parser. State machine:
/// running until the frontier or a budget is exhausted (`Completed`), or
/// until cancellation / a permanent seed failure (`Aborted`, partial
/// results still returned).
pub struct Crawler {
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn PageParser>,
    config: CrawlConfig,
}

impl Crawler {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn PageParser>,
        config: CrawlConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            fetcher,
            parser,
            config,
        })
    }

    pub async fn crawl(&self, seeds: Vec<ListingSourceRef>) -> CrawlOutcome {
        self.crawl_with_cancellation(seeds, CancellationToken::new())
            .await
    }

    pub async fn crawl_with_cancellation(
        &self,
        seeds: Vec<ListingSourceRef>,
        cancel: CancellationToken,
    ) -> CrawlOutcome {
        let mut state = CrawlState::new();
        let mut summary = CrawlSummary::new(CrawlStatus::Completed);

        for seed in seeds {
            state.enqueue(seed);
        }

        let mut in_flight = FuturesUnordered::new();
        let mut dispatched = 0usize;
        let mut cancelled = false;
        let mut seed_failed = false;

        loop {
            let budget_left = dispatched < self.config.max_pages
                && self
                    .config
                    .max_records
                    .map_or(true, |max| state.records.len() < max);

            if !cancelled && !seed_failed && budget_left {
                while in_flight.len() < self.config.concurrency {
                    let Some(source) = state.frontier.pop_front() else {
                        break;
                    };
                    dispatched += 1;
                    debug!("dispatching {} ({} in flight)", source.url, in_flight.len());
                    in_flight.push(self.visit(source));
                    if dispatched >= self.config.max_pages {
                        break;
                    }
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled(), if !cancelled => {
                    info!("cancellation observed, draining in-flight fetches");
                    cancelled = true;
                }
                Some(report) = in_flight.next() => {
                    self.apply(report, &mut state, &mut summary, &mut seed_failed);
                }
            }
        }

        summary.status = if cancelled || seed_failed {
            CrawlStatus::Aborted
        } else {
            CrawlStatus::Completed
        };

        let mut records: Vec<PropertyRecord> = state.records.into_values().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));

        summary.records_emitted = records.len();
        summary.flagged_records = records.iter().filter(|r| r.is_flagged()).count();

        info!(
            "crawl {}: {} records from {} pages",
            summary.status, summary.records_emitted, summary.pages_fetched
        );

        CrawlOutcome { records, summary }
    }

    /// Fetch one ref and run it through parse + normalize. Runs inside the
    /// worker pool; owns no shared state.
    async fn visit(&self, source: ListingSourceRef) -> WorkerReport {
        let outcome = match self.fetcher.fetch(&source).await {
            Err(error) => PageOutcome::FetchFailed(error),
            Ok(page) => match self.parser.parse(&page) {
                Err(ParseError::UnrecognizedLayout { url }) => {
                    warn!("unrecognized layout at {}", url);
                    PageOutcome::LayoutUnrecognized
                }
                Err(error) => {
                    warn!("parse failure at {}: {}", page.source.url, error);
                    PageOutcome::LayoutUnrecognized
                }
                Ok(parsed) => {
                    let mut records = Vec::new();
                    let mut dropped = 0;
                    for candidate in &parsed.candidates {
                        match normalize(candidate, page.fetched_at) {
                            Some(record) => records.push(record),
                            None => dropped += 1,
                        }
                    }

                    let next_refs = if self.config.follow_details {
                        parsed.next_refs
                    } else {
                        // Keep pagination, drop the per-listing detail links.
                        let detail_keys: HashSet<String> = parsed
                            .candidates
                            .iter()
                            .filter_map(|c| c.listing_url.as_deref())
                            .filter_map(|raw| Url::parse(raw).ok())
                            .map(|url| normalized_url_key(&url))
                            .collect();
                        parsed
                            .next_refs
                            .into_iter()
                            .filter(|r| !detail_keys.contains(&r.dedup_key()))
                            .collect()
                    };

                    PageOutcome::Parsed {
                        records,
                        next_refs,
                        dropped,
                    }
                }
            },
        };

        WorkerReport { source, outcome }
    }

    fn apply(
        &self,
        report: WorkerReport,
        state: &mut CrawlState,
        summary: &mut CrawlSummary,
        seed_failed: &mut bool,
    ) {
        match report.outcome {
            PageOutcome::FetchFailed(error) => {
                summary.pages_skipped += 1;
                if !error.is_transient() && report.source.seed {
                    warn!("permanent failure on seed {}, aborting crawl", error.url());
                    *seed_failed = true;
                } else {
                    warn!("skipping {}: {}", error.url(), error);
                }
            }
            PageOutcome::LayoutUnrecognized => {
                summary.pages_fetched += 1;
                summary.unrecognized_layouts += 1;
            }
            PageOutcome::Parsed {
                records,
                next_refs,
                dropped,
            } => {
                summary.pages_fetched += 1;
                summary.dropped_candidates += dropped;

                for record in records {
                    state.insert_record(record);
                }
                for next in next_refs {
                    if state.enqueue(next.clone()) {
                        debug!("frontier += {}", next.url);
                    }
                }
            }
        }
    }
}
