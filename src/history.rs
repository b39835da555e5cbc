use crate::config::DisplayConfig;
use crate::entry::{EntryRecord, LogEntry};
use chrono::{DateTime, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

/// Timezone used to show timestamps and decide what "today" is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayZone {
    #[default]
    Local,
    Named(Tz),
}

impl DisplayZone {
    pub fn from_config(config: &DisplayConfig) -> Self {
        match &config.timezone {
            Some(name) => match name.parse::<Tz>() {
                Ok(tz) => DisplayZone::Named(tz),
                Err(e) => {
                    warn!("Unknown timezone {}, using local time: {}", name, e);
                    DisplayZone::Local
                }
            },
            None => DisplayZone::Local,
        }
    }

    pub fn format_timestamp(&self, at: DateTime<Utc>) -> String {
        const FORMAT: &str = "%Y-%m-%d %H:%M";
        match self {
            DisplayZone::Local => at.with_timezone(&Local).format(FORMAT).to_string(),
            DisplayZone::Named(tz) => at.with_timezone(tz).format(FORMAT).to_string(),
        }
    }

    pub fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        match self {
            DisplayZone::Local => at.with_timezone(&Local).date_naive(),
            DisplayZone::Named(tz) => at.with_timezone(tz).date_naive(),
        }
    }
}

/// Counts shown at the top of the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total: usize,
    pub today: usize,
    pub distinct_locations: usize,
}

/// Show a YYYY-MM-DD expiry as "Nov 30, 2026"; anything else as typed
pub fn format_exp_date(value: &str) -> String {
    match NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
        Ok(date) => date.format("%b %d, %Y").to_string(),
        Err(_) => value.to_string(),
    }
}

/// Text a query is matched against: every value visible in the history row
pub fn searchable_text(entry: &LogEntry, zone: &DisplayZone) -> String {
    let mut parts = vec![zone.format_timestamp(entry.created_at)];
    match &entry.record {
        EntryRecord::WoundVac(r) => {
            parts.extend([&r.unit, &r.room, &r.bed, &r.serial, &r.notes].map(String::clone));
        }
        EntryRecord::CrashCart(r) => {
            parts.extend(
                [
                    &r.cart_id,
                    &r.first_expire,
                    &r.exp_date,
                    &r.lock_number,
                    &r.tech_name,
                    &r.notes,
                ]
                .map(String::clone),
            );
        }
    }
    parts.push(entry.source.to_string());
    parts.join(" ").to_lowercase()
}

/// Case-insensitive substring filter, newest first whatever the storage order
pub fn search(entries: &[LogEntry], query: &str, zone: &DisplayZone) -> Vec<LogEntry> {
    let needle = query.trim().to_lowercase();
    let mut matches: Vec<LogEntry> = entries
        .iter()
        .filter(|entry| needle.is_empty() || searchable_text(entry, zone).contains(&needle))
        .cloned()
        .collect();
    matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    matches
}

pub fn summarize(entries: &[LogEntry], zone: &DisplayZone, now: DateTime<Utc>) -> DashboardSummary {
    let today = zone.date_of(now);
    let locations: HashSet<&str> = entries
        .iter()
        .map(|entry| entry.record.location_id().trim())
        .filter(|location| !location.is_empty())
        .collect();

    DashboardSummary {
        total: entries.len(),
        today: entries
            .iter()
            .filter(|entry| zone.date_of(entry.created_at) == today)
            .count(),
        distinct_locations: locations.len(),
    }
}

/// Key/value lines for the detail view
pub fn render_detail(entry: &LogEntry, zone: &DisplayZone) -> String {
    let or_dash = |value: &str| {
        if value.trim().is_empty() {
            "—".to_string()
        } else {
            value.to_string()
        }
    };

    let mut rows: Vec<(&str, String)> = vec![("Date", zone.format_timestamp(entry.created_at))];
    match &entry.record {
        EntryRecord::WoundVac(r) => {
            rows.push(("Unit", r.unit.clone()));
            rows.push(("Room", r.room.clone()));
            rows.push(("Bed", r.bed.clone()));
            rows.push(("Serial", r.serial.clone()));
            rows.push(("Notes", or_dash(&r.notes)));
        }
        EntryRecord::CrashCart(r) => {
            rows.push(("Cart", r.cart_id.clone()));
            rows.push(("First to expire", r.first_expire.clone()));
            rows.push(("Exp date", format_exp_date(&r.exp_date)));
            rows.push(("Lock #", or_dash(&r.lock_number)));
            rows.push(("Tech", r.tech_name.clone()));
            rows.push(("Notes", or_dash(&r.notes)));
            rows.push((
                "Photo",
                if r.photo_data_url.is_empty() {
                    "No photo attached".to_string()
                } else {
                    "Attached".to_string()
                },
            ));
        }
    }
    rows.push(("Source", entry.source.to_string()));
    rows.push(("ID", entry.id.clone()));

    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let mut out = format!("{}\n", entry.variant().title());
    for (key, value) in rows {
        out.push_str(&format!("  {:<width$}  {}\n", key, value, width = width));
    }
    out
}
