//! Shared fixtures for the integration tests: a scripted in-memory page
//! transport and builders for Inmuebles24-style HTML.

use async_trait::async_trait;
use chrono::Utc;
use mora_core::{CrawlConfig, FetchError, ListingSourceRef, RawPage};
use mora_scrapers::{Crawler, PageTransport, ParserFactory, RetryingFetcher, SourceKind};
use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const BASE: &str = "https://portal.test";

pub fn page_url(path: &str) -> Url {
    Url::parse(BASE)
        .and_then(|base| base.join(path))
        .expect("fixture URL is valid")
}

pub fn seed(path: &str) -> ListingSourceRef {
    ListingSourceRef::seed(page_url(path))
}

/// An in-memory listing site. Pages are keyed by normalized URL; individual
/// pages can be scripted to fail transiently a fixed number of times, or
/// permanently. Every attempt is appended to a shared log so tests can
/// assert on retry behavior.
#[derive(Default)]
pub struct ScriptedSite {
    pages: HashMap<String, String>,
    transient_failures: Mutex<HashMap<String, u32>>,
    permanent_failures: HashSet<String>,
    attempts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, path: &str, body: String) -> Self {
        self.pages
            .insert(ListingSourceRef::seed(page_url(path)).dedup_key(), body);
        self
    }

    /// Fail the first `count` attempts against `path` with a transient error.
    pub fn failing_transiently(self, path: &str, count: u32) -> Self {
        let key = ListingSourceRef::seed(page_url(path)).dedup_key();
        self.transient_failures
            .lock()
            .expect("transient map lock")
            .insert(key, count);
        self
    }

    pub fn failing_permanently(mut self, path: &str) -> Self {
        self.permanent_failures
            .insert(ListingSourceRef::seed(page_url(path)).dedup_key());
        self
    }

    /// Handle onto the attempt log; survives moving the site into a fetcher.
    pub fn attempt_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.attempts)
    }
}

#[async_trait]
impl PageTransport for ScriptedSite {
    async fn attempt(
        &self,
        source: &ListingSourceRef,
    ) -> std::result::Result<RawPage, FetchError> {
        let key = source.dedup_key();
        self.attempts
            .lock()
            .expect("attempt log lock")
            .push(key.clone());

        if self.permanent_failures.contains(&key) {
            return Err(FetchError::Permanent {
                url: source.url.to_string(),
                reason: "status 404 Not Found".to_string(),
            });
        }

        {
            let mut remaining = self.transient_failures.lock().expect("transient map lock");
            if let Some(count) = remaining.get_mut(&key) {
                if *count > 0 {
                    *count -= 1;
                    return Err(FetchError::Transient {
                        url: source.url.to_string(),
                        reason: "status 503 Service Unavailable".to_string(),
                    });
                }
            }
        }

        match self.pages.get(&key) {
            Some(body) => Ok(RawPage {
                source: source.clone(),
                status: 200,
                body: body.clone(),
                fetched_at: Utc::now(),
            }),
            None => Err(FetchError::Permanent {
                url: source.url.to_string(),
                reason: "page not scripted".to_string(),
            }),
        }
    }
}

/// Config with the waits collapsed so retry scenarios run in milliseconds.
pub fn fast_config() -> CrawlConfig {
    CrawlConfig {
        rate_limit: Duration::from_millis(0),
        backoff_base: Duration::from_millis(1),
        ..CrawlConfig::default()
    }
}

pub fn crawler(site: ScriptedSite, config: CrawlConfig) -> Crawler {
    let fetcher = Arc::new(RetryingFetcher::with_transport(site, config.clone()));
    let parser = ParserFactory::create_parser(SourceKind::Inmuebles24);
    Crawler::new(fetcher, parser, config).expect("test config is valid")
}

/// One posting card on a results page. `id` and `href` are optional so
/// tests can produce identity-less candidates.
pub struct Card {
    pub id: Option<&'static str>,
    pub href: Option<&'static str>,
    pub title: &'static str,
    pub price: Option<&'static str>,
    pub location: Option<&'static str>,
    pub features: &'static [&'static str],
}

impl Card {
    pub fn complete(id: &'static str, href: &'static str) -> Self {
        Self {
            id: Some(id),
            href: Some(href),
            title: "Consultorio en Polanco",
            price: Some("$25,000 MXN"),
            location: Some("Polanco, Miguel Hidalgo"),
            features: &["45 m²", "2 consultorios"],
        }
    }

    fn render(&self) -> String {
        let mut html = String::new();
        let id_attr = self
            .id
            .map(|id| format!(" data-id=\"{}\"", id))
            .unwrap_or_default();
        let _ = write!(html, "<div data-qa=\"posting PROPERTY\"{}>", id_attr);

        let _ = write!(html, "<h3 data-qa=\"POSTING_CARD_DESCRIPTION\">");
        match self.href {
            Some(href) => {
                let _ = write!(html, "<a href=\"{}\">{}</a>", href, self.title);
            }
            None => {
                let _ = write!(html, "{}", self.title);
            }
        }
        let _ = write!(html, "</h3>");

        if let Some(price) = self.price {
            let _ = write!(html, "<div data-qa=\"POSTING_CARD_PRICE\">{}</div>", price);
        }
        if let Some(location) = self.location {
            let _ = write!(
                html,
                "<div data-qa=\"POSTING_CARD_LOCATION\">{}</div>",
                location
            );
        }

        let _ = write!(html, "<span data-qa=\"POSTING_CARD_FEATURES\">");
        for feature in self.features {
            let _ = write!(html, "<span>{}</span>", feature);
        }
        let _ = write!(html, "</span></div>");

        html
    }
}

pub fn results_page(cards: &[Card], next_href: Option<&str>) -> String {
    let mut html = String::from("<html><body><div class=\"postings-container\">");
    for card in cards {
        html.push_str(&card.render());
    }
    html.push_str("</div>");
    if let Some(href) = next_href {
        let _ = write!(
            html,
            "<a data-qa=\"PAGING_NEXT\" href=\"{}\">Siguiente</a>",
            href
        );
    }
    html.push_str("</body></html>");
    html
}

pub fn detail_page(id: &str, title: &str, price: &str, address: &str) -> String {
    format!(
        concat!(
            "<html><body>",
            "<ul><li data-qa=\"BREADCRUMB\">Inicio</li>",
            "<li data-qa=\"BREADCRUMB\">Consultorios</li></ul>",
            "<div data-qa=\"POSTING_DETAIL\" data-posting-id=\"{id}\">",
            "<h1 data-qa=\"POSTING_TITLE\">{title}</h1>",
            "<div data-qa=\"POSTING_PRICE\">{price}</div>",
            "<h4 data-qa=\"POSTING_LOCATION\">{address}</h4>",
            "<ul data-qa=\"POSTING_FEATURES\">",
            "<li>45 m²</li><li>2 consultorios</li><li>sala de espera</li>",
            "</ul></div></body></html>",
        ),
        id = id,
        title = title,
        price = price,
        address = address,
    )
}
