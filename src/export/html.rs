use crate::entry::{EntryRecord, LogEntry, LogVariant};
use crate::error::ExportError;
use crate::history::{format_exp_date, DisplayZone};
use chrono::{DateTime, Utc};

/// Escape text for HTML element content and attribute values
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Display column names of the exported table
pub fn html_columns(variant: LogVariant) -> &'static [&'static str] {
    match variant {
        LogVariant::WoundVac => &["Date", "Unit", "Room", "Bed", "Serial", "Notes", "Source"],
        LogVariant::CrashCart => &[
            "Date",
            "Cart",
            "First to expire",
            "Exp date",
            "Lock #",
            "Tech",
            "Notes",
            "Photo",
        ],
    }
}

fn cells(entry: &LogEntry, zone: &DisplayZone) -> Vec<String> {
    let date = zone.format_timestamp(entry.created_at);
    match &entry.record {
        EntryRecord::WoundVac(r) => vec![
            date,
            r.unit.clone(),
            r.room.clone(),
            r.bed.clone(),
            r.serial.clone(),
            r.notes.clone(),
            entry.source.to_string(),
        ],
        EntryRecord::CrashCart(r) => vec![
            date,
            r.cart_id.clone(),
            r.first_expire.clone(),
            if r.exp_date.is_empty() {
                String::new()
            } else {
                format_exp_date(&r.exp_date)
            },
            r.lock_number.clone(),
            r.tech_name.clone(),
            r.notes.clone(),
            if r.photo_data_url.is_empty() { "No" } else { "Yes" }.to_string(),
        ],
    }
}

/// Keep the entries whose id is listed, in log order
pub fn select_entries(entries: &[LogEntry], ids: &[String]) -> Result<Vec<LogEntry>, ExportError> {
    let selected: Vec<LogEntry> = entries
        .iter()
        .filter(|entry| ids.iter().any(|id| id == &entry.id))
        .cloned()
        .collect();
    if selected.is_empty() {
        return Err(ExportError::NothingSelected);
    }
    Ok(selected)
}

/// `<table>` with a header row and one escaped row per entry
pub fn render_table(variant: LogVariant, entries: &[LogEntry], zone: &DisplayZone) -> String {
    let head: String = html_columns(variant)
        .iter()
        .map(|c| format!("<th>{}</th>", escape_html(c)))
        .collect();
    let body: String = entries
        .iter()
        .map(|entry| {
            let row: String = cells(entry, zone)
                .iter()
                .map(|v| format!("<td>{}</td>", escape_html(v)))
                .collect();
            format!("<tr>{}</tr>", row)
        })
        .collect();
    format!(
        "<table><thead><tr>{}</tr></thead><tbody>{}</tbody></table>",
        head, body
    )
}

/// Standalone document holding the table, styled inline
pub fn render_html_document(
    variant: LogVariant,
    entries: &[LogEntry],
    zone: &DisplayZone,
    generated_at: DateTime<Utc>,
) -> String {
    let title = format!("{} ({})", variant.title(), entries.len());
    format!(
        r#"<!doctype html><html><head>
<meta charset="utf-8" />
<meta name="viewport" content="width=device-width,initial-scale=1" />
<title>{title}</title>
<style>
body{{font-family:Arial,Helvetica,sans-serif;margin:24px;color:#111}}
h1{{font-size:18px;margin:0 0 12px}}
table{{border-collapse:collapse;width:100%}}
th,td{{border:1px solid #ccc;padding:8px;font-size:12px;vertical-align:top}}
th{{background:#f3f3f3;text-align:left}}
.muted{{color:#666;font-size:12px;margin-top:10px}}
</style>
</head><body>
<h1>{title}</h1>
{table}
<div class="muted">PHI-free export &bull; Generated {generated}</div>
</body></html>
"#,
        title = escape_html(&title),
        table = render_table(variant, entries, zone),
        generated = escape_html(&zone.format_timestamp(generated_at)),
    )
}
