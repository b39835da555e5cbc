use crate::config::{CameraConfig, Facing};
use crate::error::CaptureError;
use crate::frame::FrameData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the camera session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Suspended,
    Stopping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Suspended => "suspended",
            SessionState::Stopping => "stopping",
        };
        write!(f, "{}", name)
    }
}

/// What the capture device is asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub facing: Facing,
    pub resolution: Option<(u32, u32)>,
    pub fps: Option<u32>,
}

impl CaptureConstraints {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            facing: config.facing,
            resolution: Some(config.resolution),
            fps: Some(config.fps),
        }
    }

    /// Drop the size, rate and sensor preferences so any device mode will do
    pub fn relaxed(&self) -> Self {
        Self {
            facing: Facing::Any,
            resolution: None,
            fps: None,
        }
    }

    pub fn is_relaxed(&self) -> bool {
        self.facing == Facing::Any && self.resolution.is_none() && self.fps.is_none()
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self::from_config(&crate::config::UnitflowConfig::default().camera)
    }
}

/// Something that can hand out a live capture session
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    fn name(&self) -> &str;

    /// Open the device. A returned session already delivers frames.
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureSession>, CaptureError>;
}

/// An open camera stream, exclusively owned by the session manager
#[async_trait]
pub trait CaptureSession: Send {
    fn description(&self) -> String;

    /// Resume frame delivery on a session kept alive across a soft stop
    async fn attach(&mut self) -> Result<(), CaptureError>;

    /// Sample the most recent frame
    async fn grab_frame(&mut self) -> Result<FrameData, CaptureError>;

    /// Stop the stream and give the device back
    async fn release(&mut self);
}

/// Stand-in when no camera could be opened; every acquisition repeats why
pub struct UnavailableDevice {
    error: CaptureError,
}

impl UnavailableDevice {
    pub fn new(error: CaptureError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl CaptureDevice for UnavailableDevice {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn acquire(
        &self,
        _constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureSession>, CaptureError> {
        Err(self.error.clone())
    }
}
