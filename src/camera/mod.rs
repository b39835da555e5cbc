mod device;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
mod mock;
mod retry;
mod session;
#[cfg(test)]
mod tests;

pub use device::{CaptureConstraints, CaptureDevice, CaptureSession, SessionState, UnavailableDevice};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GstCaptureDevice;
pub use mock::MockCaptureDevice;
pub use retry::{AcquisitionPolicy, RetryDecision};
pub use session::{CameraSessionManager, SessionSettings, StartOutcome};

use crate::config::CameraConfig;
use crate::error::CaptureError;
use std::sync::Arc;

/// Open the platform camera for this build
pub fn platform_device(config: &CameraConfig) -> Result<Arc<dyn CaptureDevice>, CaptureError> {
    #[cfg(all(feature = "camera", target_os = "linux"))]
    {
        Ok(Arc::new(GstCaptureDevice::new(config)?))
    }

    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    {
        Err(CaptureError::NotFound {
            details: format!(
                "camera {} unavailable: built without GStreamer capture support",
                config.index
            ),
        })
    }
}
