//! Pure candidate-to-record normalization: type coercion, unit cleanup and
//! address structuring. Never touches the network or filesystem, and never
//! fails a record outright; defects become quality flags. A candidate is
//! dropped only when no identity can be derived at all.

use crate::{
    normalized_url_key, CandidateRecord, Currency, Location, Price, PropertyRecord, PropertyType,
    QualityFlag,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use url::Url;

/// The sixteen alcaldías of Mexico City, used to structure raw address text.
const ALCALDIAS: [&str; 16] = [
    "Álvaro Obregón",
    "Azcapotzalco",
    "Benito Juárez",
    "Coyoacán",
    "Cuajimalpa",
    "Cuauhtémoc",
    "Gustavo A. Madero",
    "Iztacalco",
    "Iztapalapa",
    "La Magdalena Contreras",
    "Miguel Hidalgo",
    "Milpa Alta",
    "Tláhuac",
    "Tlalpan",
    "Venustiano Carranza",
    "Xochimilco",
];

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[0-9]+(?:,[0-9]{3})*(?:\.[0-9]+)?").expect("number regex is valid")
    })
}

fn area_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)([0-9]+(?:[.,][0-9]+)?)\s*(?:m²|m2|mts2|mts²|metros)")
            .expect("area regex is valid")
    })
}

fn integer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]+").expect("integer regex is valid"))
}

/// Lowercase and strip the accents that appear in CDMX place names, so
/// "Coyoacan" matches "Coyoacán".
fn fold(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' | 'ü' => 'u',
            other => other,
        })
        .collect()
}

fn clean_text(text: &str) -> Option<String> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Parse a listing price out of free text. Currency defaults to MXN; USD is
/// detected from the usual tokens. Thousands separators are tolerated.
pub fn parse_price(text: &str) -> Option<Price> {
    let lower = text.to_lowercase();
    let currency = if ["usd", "us$", "u$s", "dlls", "dolares", "dólares"]
        .iter()
        .any(|token| lower.contains(token))
    {
        Currency::Usd
    } else {
        Currency::Mxn
    };

    let digits = number_re().find(text)?.as_str().replace(',', "");
    let amount = digits.parse::<f64>().ok()?;
    if amount <= 0.0 {
        return None;
    }

    Some(Price { amount, currency })
}

/// Parse a surface area in square meters out of free text ("45 m²",
/// "45m2", "45 mts2").
pub fn parse_area(text: &str) -> Option<f64> {
    let captures = area_re().captures(text)?;
    captures[1].replace(',', ".").parse::<f64>().ok()
}

fn parse_rooms(text: &str) -> Option<u32> {
    integer_re().find(text)?.as_str().parse::<u32>().ok()
}

/// Split a raw address on commas and look for an alcaldía component; the
/// component just before it is taken as the colonia. No match means the
/// address could not be placed within Mexico City.
fn parse_location(raw: &str) -> (Location, Option<QualityFlag>) {
    let components: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    let mut matched: Option<(usize, &'static str)> = None;
    for (index, component) in components.iter().enumerate().rev() {
        let folded = fold(component);
        if let Some(name) = ALCALDIAS.iter().find(|name| folded.contains(&fold(name))) {
            matched = Some((index, name));
            break;
        }
    }

    match matched {
        Some((index, alcaldia)) => {
            let colonia = if index > 0 {
                Some(components[index - 1].to_string())
            } else {
                None
            };
            (
                Location {
                    colonia,
                    alcaldia: Some(alcaldia.to_string()),
                    raw: raw.to_string(),
                },
                None,
            )
        }
        None => (
            Location {
                colonia: None,
                alcaldia: None,
                raw: raw.to_string(),
            },
            Some(QualityFlag::LocationAmbiguous),
        ),
    }
}

/// Map one candidate to a canonical record. Returns `None` only when neither
/// an external id nor a parseable listing URL is available, i.e. the listing
/// has no usable identity.
pub fn normalize(candidate: &CandidateRecord, fetched_at: DateTime<Utc>) -> Option<PropertyRecord> {
    let source_url = candidate
        .listing_url
        .as_deref()
        .and_then(|raw| Url::parse(raw.trim()).ok());
    let external_id = candidate
        .external_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());

    let id = match (external_id, &source_url) {
        (Some(id), _) => id.to_string(),
        (None, Some(url)) => normalized_url_key(url),
        (None, None) => return None,
    };

    let mut flags = BTreeSet::new();

    let price = match candidate
        .price_text
        .as_deref()
        .and_then(clean_text)
    {
        Some(text) => match parse_price(&text) {
            Some(price) => Some(price),
            None => {
                flags.insert(QualityFlag::PriceUnparseable);
                None
            }
        },
        None => {
            flags.insert(QualityFlag::PriceMissing);
            None
        }
    };

    let area_m2 = match candidate.area_text.as_deref().and_then(clean_text) {
        Some(text) => match parse_area(&text) {
            Some(area) => Some(area),
            None => {
                flags.insert(QualityFlag::AreaUnparseable);
                None
            }
        },
        None => None,
    };

    let rooms = match candidate.rooms_text.as_deref().and_then(clean_text) {
        Some(text) => match parse_rooms(&text) {
            Some(rooms) => Some(rooms),
            None => {
                flags.insert(QualityFlag::RoomsUnparseable);
                None
            }
        },
        None => None,
    };

    let property_type = match candidate
        .property_type_text
        .as_deref()
        .and_then(clean_text)
    {
        Some(text) => match text.parse::<PropertyType>() {
            Ok(property_type) => Some(property_type),
            Err(_) => {
                flags.insert(QualityFlag::TypeUnknown);
                None
            }
        },
        None => None,
    };

    let location = match candidate.address_text.as_deref().and_then(clean_text) {
        Some(raw) => {
            let (location, flag) = parse_location(&raw);
            if let Some(flag) = flag {
                flags.insert(flag);
            }
            Some(location)
        }
        None => {
            flags.insert(QualityFlag::LocationMissing);
            None
        }
    };

    Some(PropertyRecord {
        id,
        title: candidate.title.as_deref().and_then(clean_text),
        price,
        location,
        area_m2,
        rooms,
        property_type,
        source_url,
        fetched_at,
        quality_flags: flags,
    })
}
