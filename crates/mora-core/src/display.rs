use tabled::settings::{object::Columns, Modify, Style, Width};
use tabled::{Table, Tabled};

use crate::PropertyRecord;

#[derive(Tabled)]
pub struct RecordTableRow {
    #[tabled(rename = "Id")]
    pub id: String,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Price", display_with = "display_right_14")]
    pub price: String,
    #[tabled(rename = "Size (m²)", display_with = "display_right_9")]
    pub area: String,
    #[tabled(rename = "Rooms", display_with = "display_right_5")]
    pub rooms: String,
    #[tabled(rename = "Location")]
    pub location: String,
    #[tabled(rename = "Flags")]
    pub flags: String,
}

fn display_right_14(s: &str) -> String {
    format!("{:>14}", s)
}

fn display_right_9(s: &str) -> String {
    format!("{:>9}", s)
}

fn display_right_5(s: &str) -> String {
    format!("{:>5}", s)
}

impl RecordTableRow {
    pub fn from_record(record: &PropertyRecord) -> Self {
        let price = record
            .price
            .map(|price| price.to_string())
            .unwrap_or_else(|| "N/A".to_string());

        let area = record
            .area_m2
            .map(|area| format!("{}m²", area.round() as i64))
            .unwrap_or_else(|| "N/A".to_string());

        let rooms = record
            .rooms
            .map(|rooms| rooms.to_string())
            .unwrap_or_else(|| "N/A".to_string());

        let location = record
            .location
            .as_ref()
            .map(|location| match (&location.colonia, &location.alcaldia) {
                (Some(colonia), Some(alcaldia)) => format!("{}, {}", colonia, alcaldia),
                _ => location.raw.clone(),
            })
            .unwrap_or_else(|| "N/A".to_string());

        let flags = record
            .quality_flags
            .iter()
            .map(|flag| flag.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            id: record.id.clone(),
            title: record.title.clone().unwrap_or_else(|| "N/A".to_string()),
            price,
            area,
            rooms,
            location,
            flags,
        }
    }
}

pub fn create_record_table(records: &[PropertyRecord]) -> String {
    let rows: Vec<RecordTableRow> = records.iter().map(RecordTableRow::from_record).collect();

    let mut table = Table::new(&rows);

    table
        .with(Style::modern())
        .with(Modify::new(Columns::single(0)).with(Width::truncate(30)))
        .with(Modify::new(Columns::single(1)).with(Width::truncate(36)))
        .with(Modify::new(Columns::single(2)).with(Width::truncate(14)))
        .with(Modify::new(Columns::single(3)).with(Width::truncate(9)))
        .with(Modify::new(Columns::single(4)).with(Width::truncate(5)))
        .with(Modify::new(Columns::single(5)).with(Width::wrap(40)))
        .with(Modify::new(Columns::single(6)).with(Width::wrap(30)));

    table.to_string()
}
