use crate::entry::{EntryRecord, LogEntry, LogVariant};
use chrono::NaiveDate;

const WOUND_VAC_HEADER: &[&str] = &["timestamp", "unit", "room", "bed", "serial", "notes", "source"];

const CRASH_CART_HEADER: &[&str] = &[
    "createdAt",
    "cartId",
    "firstExpire",
    "expDate",
    "lockNumber",
    "techName",
    "notes",
    "hasPhoto",
    "source",
];

pub fn csv_header(variant: LogVariant) -> &'static [&'static str] {
    match variant {
        LogVariant::WoundVac => WOUND_VAC_HEADER,
        LogVariant::CrashCart => CRASH_CART_HEADER,
    }
}

/// Quote a value when it holds a comma, quote or line break; inner quotes are doubled
pub fn csv_escape(value: &str) -> String {
    if value.contains(|c: char| matches!(c, ',' | '"' | '\r' | '\n')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn csv_file_name(variant: LogVariant, date: NaiveDate) -> String {
    format!("{}_{}.csv", variant.export_prefix(), date.format("%Y-%m-%d"))
}

fn row(entry: &LogEntry) -> Vec<String> {
    let created = entry.created_at.to_rfc3339();
    let source = entry.source.to_string();
    match &entry.record {
        EntryRecord::WoundVac(r) => vec![
            created,
            r.unit.clone(),
            r.room.clone(),
            r.bed.clone(),
            r.serial.clone(),
            r.notes.clone(),
            source,
        ],
        EntryRecord::CrashCart(r) => vec![
            created,
            r.cart_id.clone(),
            r.first_expire.clone(),
            r.exp_date.clone(),
            r.lock_number.clone(),
            r.tech_name.clone(),
            r.notes.clone(),
            if r.photo_data_url.is_empty() { "no" } else { "yes" }.to_string(),
            source,
        ],
    }
}

/// Header plus one row per entry of the given variant, in the order given
pub fn render_csv(variant: LogVariant, entries: &[LogEntry]) -> String {
    let mut lines = vec![csv_header(variant).join(",")];
    lines.extend(
        entries
            .iter()
            .filter(|entry| entry.variant() == variant)
            .map(|entry| {
                row(entry)
                    .iter()
                    .map(|value| csv_escape(value))
                    .collect::<Vec<_>>()
                    .join(",")
            }),
    );
    let mut csv = lines.join("\n");
    csv.push('\n');
    csv
}
