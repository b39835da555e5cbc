//! Barcode and QR decoding on still frames.
//!
//! The engine is chosen once at startup by probing the host. When nothing
//! works the unavailable decoder is used and the form runs in manual mode.

mod decoder;
mod engines;
mod filter;
mod probe;
#[cfg(test)]
mod tests;

pub use decoder::{DecodedSymbol, ScanDecoder, SymbolFormat};
pub use engines::{ExternalDecoder, UnavailableDecoder, ZbarDecoder};
pub use filter::AcceptanceFilter;
pub use probe::{probe_decoder, probe_with_report, EngineProbe, ProbeReport};
