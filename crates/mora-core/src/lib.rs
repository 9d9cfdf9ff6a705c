use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use url::Url;

mod config;
mod display;
mod export;
mod normalize;
mod summary;

pub use config::CrawlConfig;
pub use display::{create_record_table, RecordTableRow};
pub use export::{write_csv, write_json};
pub use normalize::{normalize, parse_area, parse_price};
pub use summary::{CrawlStatus, CrawlSummary};

pub type Result<T> = std::result::Result<T, MoraError>;

#[derive(Debug, thiserror::Error)]
pub enum MoraError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Invalid property type: {0}")]
    InvalidPropertyType(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors produced while fetching a listing page. The orchestrator treats the
/// two variants differently: transient failures were already retried and are
/// skipped, permanent failures on a seed ref abort the crawl.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },
    #[error("permanent failure fetching {url}: {reason}")]
    Permanent { url: String, reason: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Transient { url, .. } | FetchError::Permanent { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    /// The page has none of the markup we know how to read. Counted per page
    /// and surfaced in the crawl summary as a layout-drift signal.
    #[error("unrecognized page layout at {url}")]
    UnrecognizedLayout { url: String },
    #[error("invalid selector: {0}")]
    Selector(String),
}

/// One page/endpoint to fetch: a URL plus an optional pagination cursor.
/// Created by the orchestrator, consumed by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSourceRef {
    pub url: Url,
    pub page: Option<u32>,
    /// Seed refs are the caller-supplied entry points; a permanent fetch
    /// failure on one of them aborts the crawl.
    pub seed: bool,
}

impl ListingSourceRef {
    pub fn seed(url: Url) -> Self {
        Self {
            url,
            page: None,
            seed: true,
        }
    }

    pub fn discovered(url: Url) -> Self {
        Self {
            url,
            page: None,
            seed: false,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Key used for frontier deduplication: fragment stripped, trailing
    /// slash trimmed so `/consultorios` and `/consultorios/` collapse.
    pub fn dedup_key(&self) -> String {
        normalized_url_key(&self.url)
    }
}

pub fn normalized_url_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    let mut key = url.to_string();
    if key.ends_with('/') && url.path() != "/" {
        key.pop();
    }
    key
}

/// Fetched page content plus fetch metadata. Owned transiently by the
/// pipeline and discarded after parsing.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub source: ListingSourceRef,
    pub status: u16,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

/// Loosely-typed extraction from one listing. Every field is optional text;
/// the normalizer decides what survives into a `PropertyRecord`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateRecord {
    pub listing_url: Option<String>,
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub price_text: Option<String>,
    pub address_text: Option<String>,
    pub area_text: Option<String>,
    pub rooms_text: Option<String>,
    pub property_type_text: Option<String>,
    pub amenities: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    Mxn,
    Usd,
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Currency::Mxn => write!(f, "MXN"),
            Currency::Usd => write!(f, "USD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    pub currency: Currency,
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.amount.fract() == 0.0 {
            write!(f, "{} {}", self.currency, self.amount as i64)
        } else {
            write!(f, "{} {}", self.currency, self.amount)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    Consultorio,
    Oficina,
    Local,
    Edificio,
    Bodega,
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyType::Consultorio => write!(f, "Consultorio"),
            PropertyType::Oficina => write!(f, "Oficina"),
            PropertyType::Local => write!(f, "Local"),
            PropertyType::Edificio => write!(f, "Edificio"),
            PropertyType::Bodega => write!(f, "Bodega"),
        }
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "consultorio" | "consultorios" | "consultorio medico" | "consultorio médico"
            | "medical office" | "medical-office" => Ok(PropertyType::Consultorio),
            "oficina" | "oficinas" | "office" | "offices" | "despacho" | "despachos" => {
                Ok(PropertyType::Oficina)
            }
            "local" | "locales" | "local comercial" | "locales comerciales" => {
                Ok(PropertyType::Local)
            }
            "edificio" | "edificios" | "building" | "buildings" => Ok(PropertyType::Edificio),
            "bodega" | "bodegas" | "warehouse" | "warehouses" => Ok(PropertyType::Bodega),
            _ => Err(format!(
                "Invalid property type: {}. Valid options are: consultorio, oficina/despacho, local, edificio, bodega",
                s
            )),
        }
    }
}

/// Non-fatal issue detected during normalization. Flags degrade a record's
/// completeness instead of failing it; filtering is left to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityFlag {
    PriceMissing,
    PriceUnparseable,
    LocationMissing,
    LocationAmbiguous,
    AreaUnparseable,
    RoomsUnparseable,
    TypeUnknown,
}

impl std::fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QualityFlag::PriceMissing => "price_missing",
            QualityFlag::PriceUnparseable => "price_unparseable",
            QualityFlag::LocationMissing => "location_missing",
            QualityFlag::LocationAmbiguous => "location_ambiguous",
            QualityFlag::AreaUnparseable => "area_unparseable",
            QualityFlag::RoomsUnparseable => "rooms_unparseable",
            QualityFlag::TypeUnknown => "type_unknown",
        };
        write!(f, "{}", name)
    }
}

/// Structured address with the raw text preserved as fallback. Colonia and
/// alcaldía follow Mexico City's administrative naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub colonia: Option<String>,
    pub alcaldia: Option<String>,
    pub raw: String,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Canonical listing record, the stable output unit of a crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Stable identity derived from the listing's external id or its URL.
    /// Unique within one crawl's output.
    pub id: String,
    pub title: Option<String>,
    pub price: Option<Price>,
    pub location: Option<Location>,
    pub area_m2: Option<f64>,
    pub rooms: Option<u32>,
    pub property_type: Option<PropertyType>,
    pub source_url: Option<Url>,
    pub fetched_at: DateTime<Utc>,
    pub quality_flags: BTreeSet<QualityFlag>,
}

impl PropertyRecord {
    /// Number of populated optional fields. Drives the merge policy: on an
    /// id collision the more complete record wins.
    pub fn completeness(&self) -> usize {
        [
            self.title.is_some(),
            self.price.is_some(),
            self.location.is_some(),
            self.area_m2.is_some(),
            self.rooms.is_some(),
            self.property_type.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    pub fn is_flagged(&self) -> bool {
        !self.quality_flags.is_empty()
    }
}
