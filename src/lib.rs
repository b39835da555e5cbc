pub mod app;
pub mod camera;
pub mod config;
pub mod entry;
pub mod error;
pub mod events;
pub mod export;
pub mod form;
pub mod frame;
pub mod history;
pub mod scanner;
pub mod store;

#[cfg(feature = "dashboard")]
pub mod dashboard;

pub use app::{ScanCommand, ScanSession, ShutdownReason};
pub use camera::{CameraSessionManager, CaptureDevice, MockCaptureDevice, SessionState};
pub use config::UnitflowConfig;
pub use entry::{EntryRecord, EntrySource, Field, LogEntry, LogVariant};
pub use error::{Result, UnitflowError};
pub use events::{EventBus, OperatorStatus, UnitflowEvent};
pub use export::Exporter;
pub use form::{EntryForm, ScanOutcome};
pub use frame::{FrameData, FrameFormat};
pub use history::{DashboardSummary, DisplayZone};
pub use scanner::{AcceptanceFilter, ScanDecoder};
pub use store::{FileBackend, KeyValueBackend, LogStore, MemoryBackend, Preferences};

#[cfg(feature = "dashboard")]
pub use dashboard::{DashboardServer, DashboardState};
