use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UnitflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Camera error: {0}")]
    Camera(#[from] CaptureError),

    #[error("Decoder error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl UnitflowError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Form validation failures. Never change persisted state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please complete: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Photos can only be attached to crash cart checks")]
    PhotoUnsupported,

    #[error("Photo too large ({size} bytes). Keep it under {limit} bytes")]
    PhotoTooLarge { size: u64, limit: u64 },

    #[error("Unknown field '{0}'")]
    UnknownField(String),
}

/// Storage write failures. Read failures are recovered as an empty log.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write key {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove key {key}: {source}")]
    Remove {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode entries: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Capture device acquisition and frame errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Camera permission denied: {details}")]
    PermissionDenied { details: String },

    #[error("No camera found: {details}")]
    NotFound { details: String },

    #[error("Camera busy: {details}")]
    Busy { details: String },

    #[error("Camera start aborted: {details}")]
    Aborted { details: String },

    #[error("Camera cannot satisfy requested constraints: {details}")]
    OverConstrained { details: String },

    #[error("No frame within {timeout:?}")]
    FrameTimeout { timeout: Duration },

    #[error("Capture session is not active")]
    NoSession,

    #[error("Camera platform error: {details}")]
    Platform { details: String },
}

impl CaptureError {
    /// Errors worth one more attempt with relaxed constraints
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CaptureError::Busy { .. }
                | CaptureError::Aborted { .. }
                | CaptureError::OverConstrained { .. }
        )
    }

    /// Actionable hint shown to the operator next to the status line
    pub fn hint(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied { .. } => {
                "Grant camera access to this user (video group) and try again"
            }
            CaptureError::NotFound { .. } => "Connect a camera or check camera.index",
            CaptureError::Busy { .. } => "Close other apps using the camera, then start again",
            CaptureError::Aborted { .. } => "Start the scanner again",
            CaptureError::OverConstrained { .. } => {
                "Lower camera.resolution or set camera.facing = \"any\""
            }
            CaptureError::FrameTimeout { .. } => "Check the camera connection",
            CaptureError::NoSession => "Start the scanner first",
            CaptureError::Platform { .. } => "Use manual entry; restart the scanner if it persists",
        }
    }
}

/// Per-frame decode failures and engine availability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("No barcode decoder available: {reason}")]
    Unavailable { reason: String },

    #[error("Frame format {format} cannot be decoded")]
    UnsupportedFrame { format: String },

    #[error("Decoder timed out after {0:?}")]
    Timeout(Duration),

    #[error("Decoder failed: {details}")]
    Engine { details: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("No logs to export")]
    Empty,

    #[error("Select at least one entry to export")]
    NothingSelected,

    #[error("{0} is not available for this log type")]
    Unsupported(&'static str),

    #[error("Entry {0} not found")]
    NotFound(String),

    #[error("Failed to write export {path}: {details}")]
    Write { path: String, details: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, UnitflowError>;
