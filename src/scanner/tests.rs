use super::*;
use crate::config::{EngineChoice, UnitflowConfig};
use crate::error::DecodeError;
use crate::frame::{FrameData, FrameFormat};
use std::time::{Duration, Instant};

fn jpeg_frame() -> FrameData {
    FrameData::new(
        1,
        vec![0xFF, 0xD8, 0xFF, 0xD9],
        2,
        2,
        FrameFormat::Mjpeg,
    )
}

#[test]
fn test_filter_drops_repeat_inside_cooldown() {
    let mut filter = AcceptanceFilter::new(Duration::from_millis(2500));
    let start = Instant::now();

    assert_eq!(filter.accept_at("SN123", start), Some("SN123".to_string()));
    assert_eq!(filter.accept_at("SN123", start + Duration::from_millis(500)), None);
    assert_eq!(
        filter.accept_at("SN123", start + Duration::from_millis(3000)),
        Some("SN123".to_string())
    );
}

#[test]
fn test_filter_trims_and_rejects_empty() {
    let mut filter = AcceptanceFilter::new(Duration::from_millis(2500));
    let now = Instant::now();

    assert_eq!(filter.accept_at("   ", now), None);
    assert_eq!(filter.accept_at("  SN9 \n", now), Some("SN9".to_string()));
    // Same value once trimmed
    assert_eq!(filter.accept_at("SN9", now), None);
    assert_eq!(filter.last_accepted(), Some("SN9"));
}

#[test]
fn test_filter_accepts_different_value_immediately() {
    let mut filter = AcceptanceFilter::new(Duration::from_secs(10));
    let now = Instant::now();

    assert!(filter.accept_at("A", now).is_some());
    assert!(filter.accept_at("B", now).is_some());
    // "A" is no longer the reference value
    assert!(filter.accept_at("A", now).is_some());
}

#[test]
fn test_filter_reset_forgets_last_value() {
    let mut filter = AcceptanceFilter::new(Duration::from_secs(10));
    let now = Instant::now();

    assert!(filter.accept_at("A", now).is_some());
    filter.reset();
    assert!(filter.last_accepted().is_none());
    assert!(filter.accept_at("A", now).is_some());
}

#[test]
fn test_zbar_output_parsing() {
    let symbols = ZbarDecoder::parse_output("QR-Code:https://example.org/u/3N\nEAN-13:4006381333931\n\nCODE-128:SN:42\n");

    assert_eq!(
        symbols,
        vec![
            DecodedSymbol::new("https://example.org/u/3N", SymbolFormat::QrCode),
            DecodedSymbol::new("4006381333931", SymbolFormat::Ean13),
            // Only the first colon separates the type
            DecodedSymbol::new("SN:42", SymbolFormat::Code128),
        ]
    );
}

#[test]
fn test_zbar_unknown_type_keeps_whole_line() {
    let symbols = ZbarDecoder::parse_output("MYSTERY:abc\nplain");
    assert_eq!(
        symbols,
        vec![
            DecodedSymbol::new("MYSTERY:abc", SymbolFormat::Unknown),
            DecodedSymbol::new("plain", SymbolFormat::Unknown),
        ]
    );
}

#[test]
fn test_symbol_format_classes() {
    assert!(SymbolFormat::Code128.is_linear());
    assert!(!SymbolFormat::QrCode.is_linear());
    assert_eq!(SymbolFormat::from_zbar_name("i2/5"), SymbolFormat::Itf);

    let zbar = ZbarDecoder::new("zbarimg", std::env::temp_dir(), Duration::from_secs(1));
    assert!(zbar.supports_required_set());
    assert!(zbar.is_available());
}

#[tokio::test]
async fn test_unavailable_decoder_reports_reason() {
    let decoder = UnavailableDecoder::new("no barcode decoder found");

    assert!(!decoder.is_available());
    assert_eq!(decoder.unavailable_reason(), Some("no barcode decoder found"));
    assert!(!decoder.supports_required_set());

    match decoder.detect(&jpeg_frame()).await {
        Err(DecodeError::Unavailable { reason }) => assert_eq!(reason, "no barcode decoder found"),
        other => panic!("Expected unavailable error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_probe_engine_none_is_unavailable() {
    let mut config = UnitflowConfig::default().scanner;
    config.engine = EngineChoice::None;

    let (decoder, report) = probe_with_report(&config).await;
    assert!(!decoder.is_available());
    assert!(report.candidates.is_empty());
    assert_eq!(
        report.unavailable_reason.as_deref(),
        Some("scanning disabled by configuration")
    );
}

#[tokio::test]
async fn test_probe_missing_programs_falls_back_to_unavailable() {
    let mut config = UnitflowConfig::default().scanner;
    config.engine = EngineChoice::Auto;
    config.zbar_program = "unitflow-no-such-zbar".to_string();
    config.external_program = Some("unitflow-no-such-decoder".to_string());

    let (decoder, report) = probe_with_report(&config).await;
    assert!(!decoder.is_available());
    assert_eq!(report.candidates.len(), 2);
    assert!(report.candidates.iter().all(|c| !c.available));

    let reason = report.unavailable_reason.unwrap_or_default();
    assert!(reason.starts_with("no barcode decoder found"));
    assert!(reason.contains("unitflow-no-such-zbar"));
}

#[tokio::test]
async fn test_external_decoder_failure_is_engine_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let decoder = ExternalDecoder::new(
        "unitflow-no-such-decoder",
        vec!["--raw".to_string()],
        dir.path().to_path_buf(),
        Duration::from_secs(1),
    );

    let result = decoder.detect(&jpeg_frame()).await;
    assert!(matches!(result, Err(DecodeError::Engine { .. })));
    // Scratch frame is cleaned up even when the program cannot start
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
