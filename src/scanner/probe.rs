use super::decoder::ScanDecoder;
use super::engines::{probe_program, ExternalDecoder, UnavailableDecoder, ZbarDecoder};
use crate::config::{EngineChoice, ScannerConfig};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of checking one candidate engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineProbe {
    pub engine: String,
    pub program: String,
    pub available: bool,
    pub detail: String,
}

/// What the capability probe found, for the `probe` command
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub requested: EngineChoice,
    pub selected: String,
    pub candidates: Vec<EngineProbe>,
    pub unavailable_reason: Option<String>,
}

/// Pick the decoder for this host. Never fails: when no engine works the
/// returned decoder is the unavailable variant and scanning stays off.
pub async fn probe_decoder(config: &ScannerConfig) -> Arc<dyn ScanDecoder> {
    probe_with_report(config).await.0
}

pub async fn probe_with_report(config: &ScannerConfig) -> (Arc<dyn ScanDecoder>, ProbeReport) {
    let mut candidates = Vec::new();

    let decoder: Arc<dyn ScanDecoder> = match config.engine {
        EngineChoice::None => Arc::new(UnavailableDecoder::new("scanning disabled by configuration")),
        EngineChoice::Zbar => match check_zbar(config, &mut candidates).await {
            Some(decoder) => decoder,
            None => Arc::new(UnavailableDecoder::new(last_detail(&candidates))),
        },
        EngineChoice::External => match check_external(config, &mut candidates).await {
            Some(decoder) => decoder,
            None => Arc::new(UnavailableDecoder::new(last_detail(&candidates))),
        },
        EngineChoice::Auto => {
            if let Some(decoder) = check_zbar(config, &mut candidates).await {
                decoder
            } else if let Some(decoder) = check_external(config, &mut candidates).await {
                decoder
            } else {
                let reason = if candidates.is_empty() {
                    "no barcode decoder found".to_string()
                } else {
                    format!(
                        "no barcode decoder found ({})",
                        candidates
                            .iter()
                            .map(|c| c.detail.as_str())
                            .collect::<Vec<_>>()
                            .join("; ")
                    )
                };
                Arc::new(UnavailableDecoder::new(reason))
            }
        }
    };

    match decoder.unavailable_reason() {
        Some(reason) => warn!("Barcode scanning unavailable: {}", reason),
        None => info!(
            "Using {} decoder ({} formats)",
            decoder.name(),
            decoder.supported_formats().len()
        ),
    }

    let report = ProbeReport {
        requested: config.engine,
        selected: decoder.name().to_string(),
        candidates,
        unavailable_reason: decoder.unavailable_reason().map(str::to_string),
    };

    (decoder, report)
}

async fn check_zbar(
    config: &ScannerConfig,
    candidates: &mut Vec<EngineProbe>,
) -> Option<Arc<dyn ScanDecoder>> {
    let result = probe_program(&config.zbar_program, &["--version"], PROBE_TIMEOUT).await;
    let available = result.is_ok();
    candidates.push(EngineProbe {
        engine: "zbar".to_string(),
        program: config.zbar_program.clone(),
        available,
        detail: match result {
            Ok(version) if version.is_empty() => format!("{} is available", config.zbar_program),
            Ok(version) => format!("{} {}", config.zbar_program, version),
            Err(reason) => reason,
        },
    });

    available.then(|| {
        Arc::new(ZbarDecoder::new(
            config.zbar_program.clone(),
            config.scratch_path(),
            config.decode_timeout(),
        )) as Arc<dyn ScanDecoder>
    })
}

async fn check_external(
    config: &ScannerConfig,
    candidates: &mut Vec<EngineProbe>,
) -> Option<Arc<dyn ScanDecoder>> {
    let program = match &config.external_program {
        Some(program) => program.clone(),
        None => {
            if config.engine == EngineChoice::External {
                candidates.push(EngineProbe {
                    engine: "external".to_string(),
                    program: String::new(),
                    available: false,
                    detail: "no external decoder program configured".to_string(),
                });
            }
            return None;
        }
    };

    let result = probe_program(&program, &["--version"], PROBE_TIMEOUT).await;
    let available = result.is_ok();
    candidates.push(EngineProbe {
        engine: "external".to_string(),
        program: program.clone(),
        available,
        detail: match result {
            Ok(_) => format!("{} is available", program),
            Err(reason) => reason,
        },
    });

    available.then(|| {
        Arc::new(ExternalDecoder::new(
            program,
            config.external_args.clone(),
            config.scratch_path(),
            config.decode_timeout(),
        )) as Arc<dyn ScanDecoder>
    })
}

fn last_detail(candidates: &[EngineProbe]) -> String {
    candidates
        .last()
        .map(|c| c.detail.clone())
        .unwrap_or_else(|| "no barcode decoder found".to_string())
}
