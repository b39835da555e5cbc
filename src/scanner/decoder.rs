use crate::error::DecodeError;
use crate::frame::FrameData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Barcode symbologies the decoders report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolFormat {
    QrCode,
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Code128,
    Code39,
    Code93,
    Codabar,
    Itf,
    DataBar,
    Unknown,
}

impl SymbolFormat {
    /// One-dimensional symbologies
    pub fn is_linear(&self) -> bool {
        !matches!(self, SymbolFormat::QrCode | SymbolFormat::Unknown)
    }

    /// Map a zbar symbol type name ("QR-Code", "EAN-13", "I2/5", ...)
    pub fn from_zbar_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "QR-CODE" => SymbolFormat::QrCode,
            "EAN-13" | "ISBN-13" => SymbolFormat::Ean13,
            "EAN-8" => SymbolFormat::Ean8,
            "UPC-A" => SymbolFormat::UpcA,
            "UPC-E" => SymbolFormat::UpcE,
            "CODE-128" => SymbolFormat::Code128,
            "CODE-39" => SymbolFormat::Code39,
            "CODE-93" => SymbolFormat::Code93,
            "CODABAR" => SymbolFormat::Codabar,
            "I2/5" => SymbolFormat::Itf,
            "DATABAR" | "DATABAR-EXP" => SymbolFormat::DataBar,
            _ => SymbolFormat::Unknown,
        }
    }
}

impl fmt::Display for SymbolFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SymbolFormat::QrCode => "QR",
            SymbolFormat::Ean13 => "EAN-13",
            SymbolFormat::Ean8 => "EAN-8",
            SymbolFormat::UpcA => "UPC-A",
            SymbolFormat::UpcE => "UPC-E",
            SymbolFormat::Code128 => "Code 128",
            SymbolFormat::Code39 => "Code 39",
            SymbolFormat::Code93 => "Code 93",
            SymbolFormat::Codabar => "Codabar",
            SymbolFormat::Itf => "ITF",
            SymbolFormat::DataBar => "DataBar",
            SymbolFormat::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Raw text read from one symbol in a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSymbol {
    pub text: String,
    pub format: SymbolFormat,
}

impl DecodedSymbol {
    pub fn new<S: Into<String>>(text: S, format: SymbolFormat) -> Self {
        Self {
            text: text.into(),
            format,
        }
    }
}

/// A barcode/QR engine working on single still frames
#[async_trait]
pub trait ScanDecoder: Send + Sync {
    /// Short engine name for logs and status lines
    fn name(&self) -> &str;

    /// Why this engine cannot decode; `Some` only for the unavailable variant
    fn unavailable_reason(&self) -> Option<&str> {
        None
    }

    fn is_available(&self) -> bool {
        self.unavailable_reason().is_none()
    }

    fn supported_formats(&self) -> &[SymbolFormat];

    /// Decode every symbol visible in the frame. An empty vec means nothing was found.
    async fn detect(&self, frame: &FrameData) -> Result<Vec<DecodedSymbol>, DecodeError>;

    /// Drop any internal state (called on soft stop)
    fn reset(&self) {}

    /// Whether the engine covers linear barcodes and QR codes
    fn supports_required_set(&self) -> bool {
        let formats = self.supported_formats();
        formats.contains(&SymbolFormat::QrCode) && formats.iter().any(|f| f.is_linear())
    }
}
