use colored::Colorize;
use serde::{Deserialize, Serialize};

/// Terminal state of a crawl. `Aborted` still carries partial results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlStatus {
    Completed,
    Aborted,
}

impl std::fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrawlStatus::Completed => write!(f, "completed"),
            CrawlStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Result summary returned by every crawl, partial or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub status: CrawlStatus,
    /// Pages fetched successfully.
    pub pages_fetched: usize,
    /// Refs skipped after fetch failure (retries exhausted or permanent).
    pub pages_skipped: usize,
    /// Pages that parsed as no known layout; a drift signal for maintenance.
    pub unrecognized_layouts: usize,
    /// Candidates dropped for lacking any derivable identity.
    pub dropped_candidates: usize,
    pub records_emitted: usize,
    pub flagged_records: usize,
}

impl CrawlSummary {
    pub fn new(status: CrawlStatus) -> Self {
        Self {
            status,
            pages_fetched: 0,
            pages_skipped: 0,
            unrecognized_layouts: 0,
            dropped_candidates: 0,
            records_emitted: 0,
            flagged_records: 0,
        }
    }

    pub fn render(&self) -> String {
        let status = match self.status {
            CrawlStatus::Completed => "completed".green().bold(),
            CrawlStatus::Aborted => "aborted".red().bold(),
        };

        let mut out = String::new();
        out.push_str(&format!("Crawl {}\n", status));
        out.push_str(&format!(
            "  pages: {} fetched, {} skipped, {} unrecognized layouts\n",
            self.pages_fetched, self.pages_skipped, self.unrecognized_layouts
        ));
        out.push_str(&format!(
            "  records: {} emitted ({} flagged), {} candidates dropped\n",
            self.records_emitted, self.flagged_records, self.dropped_candidates
        ));
        out
    }
}
