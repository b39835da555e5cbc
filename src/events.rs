use crate::camera::SessionState;
use crate::entry::EntrySource;
use crate::error::EventBusError;
use crate::scanner::SymbolFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Severity of an operator status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// One-line status message plus an optional actionable hint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorStatus {
    pub level: StatusLevel,
    pub message: String,
    pub hint: Option<String>,
}

impl OperatorStatus {
    pub fn info<S: Into<String>>(message: S) -> Self {
        Self {
            level: StatusLevel::Info,
            message: message.into(),
            hint: None,
        }
    }

    pub fn warning<S: Into<String>>(message: S) -> Self {
        Self {
            level: StatusLevel::Warning,
            message: message.into(),
            hint: None,
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            level: StatusLevel::Error,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint<S: Into<String>>(mut self, hint: S) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for OperatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{} ({})", self.message, hint),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Events that can occur in the unitflow system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UnitflowEvent {
    /// Camera session moved to a new lifecycle state
    CameraStateChanged {
        state: SessionState,
        timestamp: SystemTime,
    },
    /// A decoded value passed the acceptance filter
    ScanAccepted {
        value: String,
        format: SymbolFormat,
        timestamp: SystemTime,
    },
    /// Many consecutive frames produced nothing usable
    DecodeStalled { failed_frames: u32 },
    /// An entry was written to the store
    EntryLogged {
        id: String,
        source: EntrySource,
        timestamp: SystemTime,
    },
    /// Status line for the operator
    Status(OperatorStatus),
    /// The scan view was hidden or shown
    VisibilityChanged { visible: bool, timestamp: SystemTime },
    /// The session is being torn down
    TeardownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl UnitflowEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            UnitflowEvent::CameraStateChanged { timestamp, .. } => *timestamp,
            UnitflowEvent::ScanAccepted { timestamp, .. } => *timestamp,
            UnitflowEvent::DecodeStalled { .. } => SystemTime::now(),
            UnitflowEvent::EntryLogged { timestamp, .. } => *timestamp,
            UnitflowEvent::Status(_) => SystemTime::now(),
            UnitflowEvent::VisibilityChanged { timestamp, .. } => *timestamp,
            UnitflowEvent::TeardownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            UnitflowEvent::CameraStateChanged { state, .. } => {
                format!("Camera {:?}", state)
            }
            UnitflowEvent::ScanAccepted { value, format, .. } => {
                format!("Scanned {} ({})", value, format)
            }
            UnitflowEvent::DecodeStalled { failed_frames } => {
                format!("No barcode read in {} frames", failed_frames)
            }
            UnitflowEvent::EntryLogged { id, source, .. } => {
                format!("Entry {} logged ({})", id, source)
            }
            UnitflowEvent::Status(status) => status.to_string(),
            UnitflowEvent::VisibilityChanged { visible, .. } => {
                format!("View {}", if *visible { "visible" } else { "hidden" })
            }
            UnitflowEvent::TeardownRequested { reason, .. } => {
                format!("Teardown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            UnitflowEvent::CameraStateChanged { .. } => "camera_state_changed",
            UnitflowEvent::ScanAccepted { .. } => "scan_accepted",
            UnitflowEvent::DecodeStalled { .. } => "decode_stalled",
            UnitflowEvent::EntryLogged { .. } => "entry_logged",
            UnitflowEvent::Status(_) => "status",
            UnitflowEvent::VisibilityChanged { .. } => "visibility_changed",
            UnitflowEvent::TeardownRequested { .. } => "teardown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<UnitflowEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<UnitflowEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: UnitflowEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            UnitflowEvent::ScanAccepted { value, .. } => {
                info!("Scan accepted: {}", value);
            }
            UnitflowEvent::DecodeStalled { failed_frames } => {
                warn!("No barcode decoded in {} consecutive frames", failed_frames);
            }
            UnitflowEvent::Status(status) => match status.level {
                StatusLevel::Info => info!("{}", status),
                StatusLevel::Warning => warn!("{}", status),
                StatusLevel::Error => error!("{}", status),
            },
            UnitflowEvent::TeardownRequested { reason, .. } => {
                info!("Teardown requested: {}", reason);
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish an operator status line, ignoring a missing audience
    pub fn status(&self, status: OperatorStatus) {
        let _ = self.publish(UnitflowEvent::Status(status));
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
