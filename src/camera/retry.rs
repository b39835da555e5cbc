use super::device::{CaptureConstraints, CaptureDevice, CaptureSession};
use crate::config::CameraConfig;
use crate::error::CaptureError;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// What to do after a failed acquisition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Try again after the delay with these constraints
    RetryAfterDelay {
        delay: Duration,
        constraints: CaptureConstraints,
    },
    /// Surface the error
    GiveUp,
}

/// Bounded retry for opening the camera
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
    /// Retry with relaxed constraints instead of the original ones
    pub relax_on_retry: bool,
}

impl Default for AcquisitionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay: Duration::from_millis(300),
            relax_on_retry: true,
        }
    }
}

impl AcquisitionPolicy {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            max_attempts: config.acquire_max_attempts.max(1),
            retry_delay: Duration::from_millis(config.acquire_retry_delay_ms),
            relax_on_retry: true,
        }
    }

    /// Decide after `attempt` (1-based) failed with `error`
    pub fn decide(
        &self,
        attempt: u32,
        error: &CaptureError,
        constraints: &CaptureConstraints,
    ) -> RetryDecision {
        if !error.is_transient() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let constraints = if self.relax_on_retry {
            constraints.relaxed()
        } else {
            *constraints
        };

        RetryDecision::RetryAfterDelay {
            delay: self.retry_delay,
            constraints,
        }
    }

    /// Acquire a session, retrying transient failures per policy
    pub async fn acquire(
        &self,
        device: &dyn CaptureDevice,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureSession>, CaptureError> {
        let mut attempt = 1;
        let mut current = *constraints;

        loop {
            match device.acquire(&current).await {
                Ok(session) => {
                    info!(
                        "Acquired {} on attempt {} ({})",
                        device.name(),
                        attempt,
                        session.description()
                    );
                    return Ok(session);
                }
                Err(e) => match self.decide(attempt, &e, &current) {
                    RetryDecision::RetryAfterDelay { delay, constraints } => {
                        warn!(
                            "Camera acquisition attempt {}/{} failed: {}; retrying in {:?}{}",
                            attempt,
                            self.max_attempts,
                            e,
                            delay,
                            if constraints.is_relaxed() {
                                " with relaxed constraints"
                            } else {
                                ""
                            }
                        );
                        sleep(delay).await;
                        current = constraints;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => {
                        warn!("Camera acquisition failed after {} attempt(s): {}", attempt, e);
                        return Err(e);
                    }
                },
            }
        }
    }
}
