use super::{ScanSession, ShutdownReason};
use crate::error::{Result, UnitflowError};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const KEYBOARD_STOP_TIMEOUT: Duration = Duration::from_secs(2);
const CAMERA_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl ScanSession {
    /// Release everything the session holds. Returns the process exit code.
    pub async fn shutdown(&mut self, reason: ShutdownReason) -> Result<i32> {
        info!("Beginning graceful shutdown");
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if let Some(keyboard) = &self.keyboard_handler {
            match timeout(KEYBOARD_STOP_TIMEOUT, keyboard.stop()).await {
                Ok(Ok(())) => info!("keyboard component stopped"),
                Ok(Err(e)) => {
                    error!("Error stopping keyboard: {}", e);
                    exit_code = 1;
                }
                Err(_) => {
                    error!("keyboard component stop timeout");
                    exit_code = 1;
                }
            }
        }

        let teardown_reason = match &reason {
            ShutdownReason::Signal(name) => format!("signal {}", name),
            ShutdownReason::UserRequest => "user request".to_string(),
            ShutdownReason::InputClosed => "input closed".to_string(),
        };
        let camera_result = match timeout(CAMERA_STOP_TIMEOUT, self.camera.on_teardown(&teardown_reason)).await {
            Ok(result) => result,
            Err(_) => Err(UnitflowError::component("camera", "stop timeout")),
        };
        if let Err(e) = camera_result {
            error!("Error stopping camera: {}", e);
            exit_code = 1;
        }

        for task in self.tasks.drain(..) {
            task.abort();
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
