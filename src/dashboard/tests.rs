use super::*;
use crate::config::UnitflowConfig;
use crate::entry::{CrashCartRecord, EntryRecord, EntrySource, LogEntry, LogVariant, WoundVacRecord};
use crate::events::EventBus;
use crate::store::{LogStore, MemoryBackend, Preferences};
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use tower::ServiceExt;

fn wound_vac(unit: &str, serial: &str) -> LogEntry {
    LogEntry::new(
        EntryRecord::WoundVac(WoundVacRecord {
            unit: unit.to_string(),
            room: "204".to_string(),
            bed: "A".to_string(),
            serial: serial.to_string(),
            notes: String::new(),
        }),
        EntrySource::Manual,
    )
}

async fn app_with(variant: LogVariant, entries: Vec<LogEntry>) -> (Router, Arc<LogStore>) {
    let mut config = UnitflowConfig::default();
    config.form.variant = variant;
    config.display.timezone = Some("UTC".to_string());

    let store = Arc::new(LogStore::new(
        Arc::new(MemoryBackend::new()),
        variant.storage_key(),
        config.store.order,
        config.store.max_entries,
    ));
    for entry in entries {
        store.append(entry).await.unwrap();
    }

    let state = DashboardState::new(Arc::clone(&store), EventBus::new(16), &config);
    (router(state), store)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_search_entries() {
    let (app, _) = app_with(
        LogVariant::WoundVac,
        vec![wound_vac("3N", "SN1"), wound_vac("4S", "SN2")],
    )
    .await;

    let (status, body) = send(&app, get("/api/entries?q=3n")).await;
    assert_eq!(status, StatusCode::OK);
    let entries: Vec<LogEntry> = serde_json::from_str(&body).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].record.location_id(), "3N");

    let (_, body) = send(&app, get("/api/entries")).await;
    let entries: Vec<LogEntry> = serde_json::from_str(&body).unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn test_summary() {
    let (app, _) = app_with(
        LogVariant::WoundVac,
        vec![wound_vac("3N", "SN1"), wound_vac("3N", "SN2"), wound_vac("4S", "SN3")],
    )
    .await;

    let (status, body) = send(&app, get("/api/summary")).await;
    assert_eq!(status, StatusCode::OK);
    let summary: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(summary["total"], 3);
    assert_eq!(summary["today"], 3);
    assert_eq!(summary["distinctLocations"], 2);
}

#[tokio::test]
async fn test_create_entry_and_validation() {
    let (app, store) = app_with(LogVariant::WoundVac, Vec::new()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/entries")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"unit":"3N","room":"204","bed":"A","serial":"SN123"}"#,
        ))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    let entry: LogEntry = serde_json::from_str(&body).unwrap();
    assert_eq!(entry.source, EntrySource::Manual);
    assert_eq!(store.len().await, 1);

    let request = Request::builder()
        .method("POST")
        .uri("/api/entries")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"unit":"3N","room":"","bed":"A","serial":"SN124"}"#))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body.contains("Room"));
    assert_eq!(store.len().await, 1);
}

fn post_entry(json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/entries")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_crash_cart_post_remembers_tech() {
    let (app, store) = app_with(LogVariant::CrashCart, Vec::new()).await;
    let prefs = Preferences::new(store.backend());

    let (status, _) = send(
        &app,
        post_entry(
            r#"{"tech_name":"Dana","cart_id":"CC-7","first_expire":"Epinephrine","exp_date":"2026-11-30","lock_number":"L-0042"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(prefs.tech_name().await.as_deref(), Some("Dana"));

    // The next check may leave the tech out
    let (status, body) = send(
        &app,
        post_entry(
            r#"{"cart_id":"CC-8","first_expire":"Atropine","exp_date":"2026-12-31","lock_number":"L-0043"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let entry: LogEntry = serde_json::from_str(&body).unwrap();
    match entry.record {
        EntryRecord::CrashCart(cart) => assert_eq!(cart.tech_name, "Dana"),
        other => panic!("Expected crash cart record, got {:?}", other),
    }
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn test_crash_cart_post_respects_remember_tech_off() {
    let mut config = UnitflowConfig::default();
    config.form.variant = LogVariant::CrashCart;
    config.form.remember_tech = false;
    let store = Arc::new(LogStore::new(
        Arc::new(MemoryBackend::new()),
        LogVariant::CrashCart.storage_key(),
        config.store.order,
        config.store.max_entries,
    ));
    let app = router(DashboardState::new(Arc::clone(&store), EventBus::new(16), &config));

    let (status, _) = send(
        &app,
        post_entry(
            r#"{"tech":"Dana","cart":"CC-7","first_expire":"Epinephrine","exp_date":"2026-11-30","lock":"L-0042"}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(Preferences::new(store.backend()).tech_name().await, None);
}

#[tokio::test]
async fn test_get_and_delete_entry() {
    let entry = wound_vac("3N", "SN1");
    let id = entry.id.clone();
    let (app, store) = app_with(LogVariant::WoundVac, vec![entry]).await;

    let (status, _) = send(&app, get(&format!("/api/entries/{}", id))).await;
    assert_eq!(status, StatusCode::OK);

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/entries/{}", id))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(store.is_empty().await);

    let (status, _) = send(&app, get(&format!("/api/entries/{}", id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_exports() {
    let first = wound_vac("3N", "SN1");
    let first_id = first.id.clone();
    let (app, _) = app_with(LogVariant::WoundVac, vec![first, wound_vac("4S", "<SN2>")]).await;

    let (status, body) = send(&app, get("/export.csv")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("timestamp,unit,room,bed,serial,notes,source"));

    let (status, body) = send(&app, get(&format!("/export.html?ids={}", first_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("SN1"));
    assert!(!body.contains("&lt;SN2&gt;"));

    let (status, _) = send(&app, get("/export.html?ids=missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_export_csv_empty_log() {
    let (app, _) = app_with(LogVariant::WoundVac, Vec::new()).await;
    let (status, body) = send(&app, get("/export.csv")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("No logs to export"));
}

#[tokio::test]
async fn test_sticker_by_variant() {
    let cart = LogEntry::new(
        EntryRecord::CrashCart(CrashCartRecord {
            tech_name: "Dana".to_string(),
            cart_id: "CC-7".to_string(),
            first_expire: "Epinephrine".to_string(),
            exp_date: "2026-11-30".to_string(),
            lock_number: "L-0042".to_string(),
            notes: String::new(),
            photo_data_url: String::new(),
        }),
        EntrySource::Scan,
    );
    let cart_id = cart.id.clone();
    let (app, _) = app_with(LogVariant::CrashCart, vec![cart]).await;
    let (status, body) = send(&app, get(&format!("/entries/{}/sticker", cart_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("L-0042"));

    let vac = wound_vac("3N", "SN1");
    let vac_id = vac.id.clone();
    let (app, _) = app_with(LogVariant::WoundVac, vec![vac]).await;
    let (status, _) = send(&app, get(&format!("/entries/{}/sticker", vac_id))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dashboard_page_and_health() {
    let (app, _) = app_with(LogVariant::WoundVac, vec![wound_vac("3N", "SN1")]).await;

    let (status, body) = send(&app, get("/?q=%3Cb%3E")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Wound Vac Log"));
    assert!(body.contains("value=\"&lt;b&gt;\""));
    assert!(body.contains("0 of 1 shown"));

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["entries"], 1);
}
