use crate::{PageParser, ParsedPage};
use mora_core::{CandidateRecord, ListingSourceRef, ParseError, RawPage};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// Parser for Inmuebles24-style listing portals. Understands two layouts:
/// paginated search-results pages made of posting cards, and single-posting
/// detail pages. Anything else is reported as an unrecognized layout so the
/// crawl summary can surface site drift.
#[derive(Debug, Default)]
pub struct Inmuebles24Parser;

impl Inmuebles24Parser {
    pub fn new() -> Self {
        Self
    }

    fn parse_selector(selector: &str) -> Result<Selector, ParseError> {
        Selector::parse(selector).map_err(|e| ParseError::Selector(e.to_string()))
    }

    fn create_results_selectors() -> Result<
        (
            Selector, // card
            Selector, // link (title anchor)
            Selector, // price
            Selector, // location
            Selector, // features
            Selector, // next page
        ),
        ParseError,
    > {
        Ok((
            Self::parse_selector("div[data-qa=\"posting PROPERTY\"]")?,
            Self::parse_selector("h3[data-qa=\"POSTING_CARD_DESCRIPTION\"] a")?,
            Self::parse_selector("div[data-qa=\"POSTING_CARD_PRICE\"]")?,
            Self::parse_selector("div[data-qa=\"POSTING_CARD_LOCATION\"]")?,
            Self::parse_selector("span[data-qa=\"POSTING_CARD_FEATURES\"] span")?,
            Self::parse_selector("a[data-qa=\"PAGING_NEXT\"]")?,
        ))
    }

    fn create_detail_selectors() -> Result<
        (
            Selector, // title
            Selector, // price
            Selector, // address
            Selector, // features
            Selector, // breadcrumb items
        ),
        ParseError,
    > {
        Ok((
            Self::parse_selector("h1[data-qa=\"POSTING_TITLE\"]")?,
            Self::parse_selector("div[data-qa=\"POSTING_PRICE\"]")?,
            Self::parse_selector("h4[data-qa=\"POSTING_LOCATION\"]")?,
            Self::parse_selector("ul[data-qa=\"POSTING_FEATURES\"] li")?,
            Self::parse_selector("li[data-qa=\"BREADCRUMB\"]")?,
        ))
    }

    fn element_text(element: ElementRef) -> Option<String> {
        let text = element.text().collect::<String>().trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Split a card's feature blurbs into area, rooms and leftover amenities.
    fn classify_features(
        features: Vec<String>,
    ) -> (Option<String>, Option<String>, Vec<String>) {
        let mut area_text = None;
        let mut rooms_text = None;
        let mut amenities = Vec::new();

        for feature in features {
            let lower = feature.to_lowercase();
            if area_text.is_none() && (lower.contains("m²") || lower.contains("m2")) {
                area_text = Some(feature);
            } else if rooms_text.is_none()
                && lower.chars().any(|c| c.is_ascii_digit())
                && ["consultorio", "privado", "ambiente", "espacio"]
                    .iter()
                    .any(|token| lower.contains(token))
            {
                rooms_text = Some(feature);
            } else {
                amenities.push(feature);
            }
        }

        (area_text, rooms_text, amenities)
    }

    fn parse_results(
        &self,
        document: &Html,
        page: &RawPage,
    ) -> Result<ParsedPage, ParseError> {
        let (card_selector, link_selector, price_selector, location_selector, features_selector, next_selector) =
            Self::create_results_selectors()?;

        let mut candidates = Vec::new();
        let mut next_refs = Vec::new();

        for card in document.select(&card_selector) {
            let link = card.select(&link_selector).next();

            let listing_url = link
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| page.source.url.join(href).ok());

            let candidate = CandidateRecord {
                listing_url: listing_url.as_ref().map(Url::to_string),
                external_id: card.value().attr("data-id").map(str::to_string),
                title: link.and_then(Self::element_text),
                price_text: card.select(&price_selector).next().and_then(Self::element_text),
                address_text: card
                    .select(&location_selector)
                    .next()
                    .and_then(Self::element_text),
                ..CandidateRecord::default()
            };

            let features: Vec<String> = card
                .select(&features_selector)
                .filter_map(Self::element_text)
                .collect();
            let (area_text, rooms_text, amenities) = Self::classify_features(features);

            let candidate = CandidateRecord {
                area_text,
                rooms_text,
                amenities,
                ..candidate
            };

            if let Some(url) = listing_url {
                next_refs.push(ListingSourceRef::discovered(url));
            }

            candidates.push(candidate);
        }

        if let Some(next) = document
            .select(&next_selector)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| page.source.url.join(href).ok())
        {
            debug!("next results page: {}", next);
            next_refs.push(ListingSourceRef::discovered(next));
        }

        Ok(ParsedPage {
            candidates,
            next_refs,
        })
    }

    fn parse_detail(&self, document: &Html, page: &RawPage) -> Result<ParsedPage, ParseError> {
        let (title_selector, price_selector, address_selector, features_selector, breadcrumb_selector) =
            Self::create_detail_selectors()?;
        let container_selector = Self::parse_selector("div[data-qa=\"POSTING_DETAIL\"]")?;

        let external_id = document
            .select(&container_selector)
            .next()
            .and_then(|el| el.value().attr("data-posting-id"))
            .map(str::to_string);

        let features: Vec<String> = document
            .select(&features_selector)
            .filter_map(Self::element_text)
            .collect();
        let (area_text, rooms_text, amenities) = Self::classify_features(features);

        // The first breadcrumb naming a known property type wins.
        let property_type_text = document
            .select(&breadcrumb_selector)
            .filter_map(Self::element_text)
            .find(|text| text.parse::<mora_core::PropertyType>().is_ok());

        let candidate = CandidateRecord {
            listing_url: Some(page.source.url.to_string()),
            external_id,
            title: document.select(&title_selector).next().and_then(Self::element_text),
            price_text: document.select(&price_selector).next().and_then(Self::element_text),
            address_text: document
                .select(&address_selector)
                .next()
                .and_then(Self::element_text),
            area_text,
            rooms_text,
            property_type_text,
            amenities,
        };

        Ok(ParsedPage {
            candidates: vec![candidate],
            next_refs: Vec::new(),
        })
    }
}

impl PageParser for Inmuebles24Parser {
    fn parse(&self, page: &RawPage) -> Result<ParsedPage, ParseError> {
        let document = Html::parse_document(&page.body);

        let results_container = Self::parse_selector("div.postings-container")?;
        let detail_container = Self::parse_selector("div[data-qa=\"POSTING_DETAIL\"]")?;

        if document.select(&results_container).next().is_some() {
            self.parse_results(&document, page)
        } else if document.select(&detail_container).next().is_some() {
            self.parse_detail(&document, page)
        } else {
            Err(ParseError::UnrecognizedLayout {
                url: page.source.url.to_string(),
            })
        }
    }
}
