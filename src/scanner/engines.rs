use super::decoder::{DecodedSymbol, ScanDecoder, SymbolFormat};
use crate::error::DecodeError;
use crate::frame::FrameData;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, trace};

const ZBAR_FORMATS: &[SymbolFormat] = &[
    SymbolFormat::QrCode,
    SymbolFormat::Ean13,
    SymbolFormat::Ean8,
    SymbolFormat::UpcA,
    SymbolFormat::UpcE,
    SymbolFormat::Code128,
    SymbolFormat::Code39,
    SymbolFormat::Code93,
    SymbolFormat::Codabar,
    SymbolFormat::Itf,
    SymbolFormat::DataBar,
];

// The fallback command only promises raw text; it is trusted to cover the basic set
const EXTERNAL_FORMATS: &[SymbolFormat] = &[
    SymbolFormat::QrCode,
    SymbolFormat::Code128,
    SymbolFormat::Code39,
    SymbolFormat::Ean13,
];

/// zbarimg exit status when an image holds no symbol
const ZBAR_NO_SYMBOL: i32 = 4;

/// Writes a frame to a scratch file and runs a decoder program on it
struct FrameCommand {
    program: String,
    scratch_dir: PathBuf,
    timeout: Duration,
    counter: AtomicU64,
}

impl FrameCommand {
    fn new(program: String, scratch_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            program,
            scratch_dir,
            timeout,
            counter: AtomicU64::new(0),
        }
    }

    async fn run(&self, frame: &FrameData, args: &[String]) -> Result<Output, DecodeError> {
        let (bytes, ext) = frame.to_image_file()?;

        fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| DecodeError::Engine {
                details: format!("Failed to create {}: {}", self.scratch_dir.display(), e),
            })?;

        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self
            .scratch_dir
            .join(format!("frame-{}-{}.{}", std::process::id(), seq, ext));

        fs::write(&path, bytes.as_slice())
            .await
            .map_err(|e| DecodeError::Engine {
                details: format!("Failed to write {}: {}", path.display(), e),
            })?;

        let path_str = path.to_string_lossy().to_string();
        let resolved: Vec<String> = args
            .iter()
            .map(|arg| arg.replace("{input}", &path_str))
            .collect();

        trace!("Running {} {:?} on frame {}", self.program, resolved, frame.id);

        let mut command = Command::new(&self.program);
        command
            .args(&resolved)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let result = tokio::time::timeout(self.timeout, command.output()).await;
        let _ = fs::remove_file(&path).await;

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(DecodeError::Engine {
                details: format!("Failed to run {}: {}", self.program, e),
            }),
            Err(_) => Err(DecodeError::Timeout(self.timeout)),
        }
    }
}

/// Check that a program starts and exits cleanly with the given arguments
pub(crate) async fn probe_program(program: &str, args: &[&str], timeout: Duration) -> Result<String, String> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok(version)
        }
        Ok(Ok(output)) => Err(format!("{} exited with {}", program, output.status)),
        Ok(Err(e)) => Err(format!("{} could not be started: {}", program, e)),
        Err(_) => Err(format!("{} did not answer within {:?}", program, timeout)),
    }
}

/// Native platform decoder backed by the zbar command line tool
pub struct ZbarDecoder {
    command: FrameCommand,
}

impl ZbarDecoder {
    pub fn new(program: impl Into<String>, scratch_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            command: FrameCommand::new(program.into(), scratch_dir, timeout),
        }
    }

    /// Parse `TYPE:data` lines printed by zbarimg
    pub fn parse_output(stdout: &str) -> Vec<DecodedSymbol> {
        stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| match line.split_once(':') {
                Some((kind, data)) => {
                    let format = SymbolFormat::from_zbar_name(kind);
                    if format == SymbolFormat::Unknown {
                        DecodedSymbol::new(line, SymbolFormat::Unknown)
                    } else {
                        DecodedSymbol::new(data, format)
                    }
                }
                None => DecodedSymbol::new(line, SymbolFormat::Unknown),
            })
            .collect()
    }
}

#[async_trait]
impl ScanDecoder for ZbarDecoder {
    fn name(&self) -> &str {
        "zbar"
    }

    fn supported_formats(&self) -> &[SymbolFormat] {
        ZBAR_FORMATS
    }

    async fn detect(&self, frame: &FrameData) -> Result<Vec<DecodedSymbol>, DecodeError> {
        let args = vec!["-q".to_string(), "{input}".to_string()];
        let output = self.command.run(frame, &args).await?;

        match output.status.code() {
            Some(0) => {
                let symbols = Self::parse_output(&String::from_utf8_lossy(&output.stdout));
                debug!("zbar found {} symbol(s) in frame {}", symbols.len(), frame.id);
                Ok(symbols)
            }
            Some(ZBAR_NO_SYMBOL) => Ok(Vec::new()),
            _ => Err(DecodeError::Engine {
                details: format!(
                    "zbarimg exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }),
        }
    }
}

/// Fallback decoder: any program printing one decoded value per line
pub struct ExternalDecoder {
    command: FrameCommand,
    args: Vec<String>,
}

impl ExternalDecoder {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        scratch_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        let args = if args.iter().any(|a| a.contains("{input}")) {
            args
        } else {
            let mut args = args;
            args.push("{input}".to_string());
            args
        };

        Self {
            command: FrameCommand::new(program.into(), scratch_dir, timeout),
            args,
        }
    }
}

#[async_trait]
impl ScanDecoder for ExternalDecoder {
    fn name(&self) -> &str {
        &self.command.program
    }

    fn supported_formats(&self) -> &[SymbolFormat] {
        EXTERNAL_FORMATS
    }

    async fn detect(&self, frame: &FrameData) -> Result<Vec<DecodedSymbol>, DecodeError> {
        let output = self.command.run(frame, &self.args).await?;

        if !output.status.success() {
            return Err(DecodeError::Engine {
                details: format!(
                    "{} exited with {}: {}",
                    self.command.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| DecodedSymbol::new(line, SymbolFormat::Unknown))
            .collect())
    }
}

/// Explicit "no decoder" variant; the system runs in manual-entry mode
pub struct UnavailableDecoder {
    reason: String,
}

impl UnavailableDecoder {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl ScanDecoder for UnavailableDecoder {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn unavailable_reason(&self) -> Option<&str> {
        Some(&self.reason)
    }

    fn supported_formats(&self) -> &[SymbolFormat] {
        &[]
    }

    async fn detect(&self, _frame: &FrameData) -> Result<Vec<DecodedSymbol>, DecodeError> {
        Err(DecodeError::Unavailable {
            reason: self.reason.clone(),
        })
    }
}
