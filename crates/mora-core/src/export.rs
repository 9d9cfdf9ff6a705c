//! Dataset hand-off for downstream processing and visualization: flat CSV
//! for tabular tooling, JSON for everything else.

use crate::{PropertyRecord, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use url::Url;

pub fn write_csv(path: &Path, records: &[PropertyRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "id",
        "title",
        "price",
        "currency",
        "colonia",
        "alcaldia",
        "address",
        "area_m2",
        "rooms",
        "property_type",
        "source_url",
        "fetched_at",
        "quality_flags",
    ])?;

    for record in records {
        let flags = record
            .quality_flags
            .iter()
            .map(|flag| flag.to_string())
            .collect::<Vec<_>>()
            .join(";");

        writer.write_record([
            record.id.clone(),
            record.title.clone().unwrap_or_default(),
            record
                .price
                .map(|price| price.amount.to_string())
                .unwrap_or_default(),
            record
                .price
                .map(|price| price.currency.to_string())
                .unwrap_or_default(),
            record
                .location
                .as_ref()
                .and_then(|location| location.colonia.clone())
                .unwrap_or_default(),
            record
                .location
                .as_ref()
                .and_then(|location| location.alcaldia.clone())
                .unwrap_or_default(),
            record
                .location
                .as_ref()
                .map(|location| location.raw.clone())
                .unwrap_or_default(),
            record
                .area_m2
                .map(|area| area.to_string())
                .unwrap_or_default(),
            record
                .rooms
                .map(|rooms| rooms.to_string())
                .unwrap_or_default(),
            record
                .property_type
                .as_ref()
                .map(|pt| pt.to_string())
                .unwrap_or_default(),
            record
                .source_url
                .as_ref()
                .map(Url::to_string)
                .unwrap_or_default(),
            record.fetched_at.to_rfc3339(),
            flags,
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_json(path: &Path, records: &[PropertyRecord]) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, records)?;
    Ok(())
}
