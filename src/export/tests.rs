use super::*;
use crate::config::UnitflowConfig;
use crate::entry::{CrashCartRecord, EntryRecord, EntrySource, WoundVacRecord};
use chrono::{NaiveDate, TimeZone};
use tempfile::TempDir;

fn wound_vac(serial: &str, notes: &str) -> LogEntry {
    LogEntry::with_timestamp(
        EntryRecord::WoundVac(WoundVacRecord {
            unit: "3N".to_string(),
            room: "204".to_string(),
            bed: "A".to_string(),
            serial: serial.to_string(),
            notes: notes.to_string(),
        }),
        EntrySource::Scan,
        Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap(),
    )
}

fn crash_cart(lock: &str, photo: &str) -> LogEntry {
    LogEntry::with_timestamp(
        EntryRecord::CrashCart(CrashCartRecord {
            tech_name: "Dana <RN>".to_string(),
            cart_id: "CC-7".to_string(),
            first_expire: "Epinephrine".to_string(),
            exp_date: "2026-11-30".to_string(),
            lock_number: lock.to_string(),
            notes: String::new(),
            photo_data_url: photo.to_string(),
        }),
        EntrySource::Manual,
        Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap(),
    )
}

fn utc() -> DisplayZone {
    DisplayZone::Named(chrono_tz::UTC)
}

fn exporter(dir: &Path, variant: LogVariant) -> Exporter {
    Exporter::new(dir, variant, utc(), UnitflowConfig::default().sticker)
}

#[test]
fn test_csv_escape_quotes_and_commas() {
    assert_eq!(csv_escape(r#"He said "go", now"#), r#""He said ""go"", now""#);
    assert_eq!(csv_escape("plain"), "plain");
    assert_eq!(csv_escape("two\nlines"), "\"two\nlines\"");
}

#[test]
fn test_csv_wound_vac_layout() {
    let csv = render_csv(
        LogVariant::WoundVac,
        &[wound_vac("SN123", r#"He said "go", now"#)],
    );
    let mut lines = csv.lines();

    assert_eq!(lines.next(), Some("timestamp,unit,room,bed,serial,notes,source"));
    assert_eq!(
        lines.next(),
        Some(r#"2026-10-17T09:30:00+00:00,3N,204,A,SN123,"He said ""go"", now",scan"#)
    );
    assert_eq!(lines.next(), None);
}

#[test]
fn test_csv_crash_cart_has_photo_flag() {
    let csv = render_csv(
        LogVariant::CrashCart,
        &[crash_cart("L-1", "data:image/png;base64,AA=="), crash_cart("L-2", "")],
    );
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(
        lines[0],
        "createdAt,cartId,firstExpire,expDate,lockNumber,techName,notes,hasPhoto,source"
    );
    assert!(lines[1].ends_with(",yes,manual"));
    assert!(lines[2].ends_with(",no,manual"));
}

#[test]
fn test_csv_file_name() {
    let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
    assert_eq!(
        csv_file_name(LogVariant::CrashCart, date),
        "crash_cart_checks_2026-10-17.csv"
    );
    assert_eq!(csv_file_name(LogVariant::WoundVac, date), "wound_vac_logs_2026-10-17.csv");
}

#[test]
fn test_escape_html_covers_all_specials() {
    assert_eq!(
        escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
        "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#039;s&lt;/a&gt;"
    );
}

#[test]
fn test_html_document_escapes_values() {
    let doc = render_html_document(
        LogVariant::CrashCart,
        &[crash_cart("L-1", "")],
        &utc(),
        Utc::now(),
    );

    assert!(doc.contains("<title>Crash Cart Checks (1)</title>"));
    assert!(doc.contains("<th>Lock #</th>"));
    assert!(doc.contains("<td>Dana &lt;RN&gt;</td>"));
    assert!(doc.contains("<td>Nov 30, 2026</td>"));
    assert!(!doc.contains("Dana <RN>"));
}

#[test]
fn test_select_entries() {
    let a = wound_vac("SN1", "");
    let b = wound_vac("SN2", "");
    let entries = vec![a.clone(), b];

    assert_eq!(select_entries(&entries, &[a.id.clone()]).unwrap(), vec![a]);
    assert_eq!(
        select_entries(&entries, &["missing".to_string()]),
        Err(ExportError::NothingSelected)
    );
}

#[test]
fn test_sticker_only_for_crash_carts() {
    let sticker = UnitflowConfig::default().sticker;
    let doc = render_sticker(&crash_cart("L-0042", ""), &sticker, &utc()).unwrap();

    assert!(doc.contains("Central Supply"));
    assert!(doc.contains("L-0042"));
    assert!(doc.contains("window.print()"));

    assert!(matches!(
        render_sticker(&wound_vac("SN1", ""), &sticker, &utc()),
        Err(ExportError::Unsupported(_))
    ));
}

#[tokio::test]
async fn test_exporter_writes_files() {
    let dir = TempDir::new().unwrap();
    let exporter = exporter(&dir.path().join("out"), LogVariant::WoundVac);
    let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
    let entries = vec![wound_vac("SN1", "")];

    let csv_path = exporter.export_csv(&entries, now).await.unwrap();
    assert!(csv_path.ends_with("wound_vac_logs_2026-10-17.csv"));
    let written = std::fs::read_to_string(&csv_path).unwrap();
    assert!(written.starts_with("timestamp,unit"));

    let html_path = exporter.export_html(&entries, None, now).await.unwrap();
    assert!(html_path.ends_with("wound_vac_logs_2026-10-17.html"));

    assert_eq!(exporter.export_csv(&[], now).await, Err(ExportError::Empty));
    assert_eq!(
        exporter
            .export_html(&entries, Some(&["nope".to_string()]), now)
            .await,
        Err(ExportError::NothingSelected)
    );
}

#[tokio::test]
async fn test_exporter_write_failure() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let exporter = exporter(&blocker, LogVariant::CrashCart);
    let result = exporter.export_sticker(&crash_cart("L-1", "")).await;
    assert!(matches!(result, Err(ExportError::Write { .. })));
}
