use super::device::{CaptureConstraints, CaptureDevice, CaptureSession};
use crate::error::CaptureError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

#[derive(Default)]
struct MockState {
    failures: Mutex<VecDeque<CaptureError>>,
    attempts: Mutex<Vec<CaptureConstraints>>,
    frame_bytes: Mutex<Option<Arc<Vec<u8>>>>,
    acquire_delay: Mutex<Option<Duration>>,
    attaches: AtomicU32,
    releases: AtomicU32,
    live_sessions: AtomicU32,
    frame_counter: AtomicU64,
}

/// Scripted capture device for tests and camera-less hosts
#[derive(Clone)]
pub struct MockCaptureDevice {
    resolution: (u32, u32),
    state: Arc<MockState>,
}

impl MockCaptureDevice {
    pub fn new(resolution: (u32, u32)) -> Self {
        Self {
            resolution,
            state: Arc::new(MockState::default()),
        }
    }

    /// Fail the next acquisition with this error (queued in order)
    pub fn fail_next(self, error: CaptureError) -> Self {
        self.state.failures.lock().push_back(error);
        self
    }

    /// Serve this encoded JPEG instead of the generated pattern
    pub fn with_frame_bytes(self, bytes: Vec<u8>) -> Self {
        *self.state.frame_bytes.lock() = Some(Arc::new(bytes));
        self
    }

    /// Make every acquisition take this long
    pub fn with_acquire_delay(self, delay: Duration) -> Self {
        *self.state.acquire_delay.lock() = Some(delay);
        self
    }

    /// Constraints of every acquisition attempt, in order
    pub fn acquire_attempts(&self) -> Vec<CaptureConstraints> {
        self.state.attempts.lock().clone()
    }

    pub fn attach_count(&self) -> u32 {
        self.state.attaches.load(Ordering::Acquire)
    }

    pub fn release_count(&self) -> u32 {
        self.state.releases.load(Ordering::Acquire)
    }

    /// Sessions acquired and not yet released
    pub fn live_sessions(&self) -> u32 {
        self.state.live_sessions.load(Ordering::Acquire)
    }
}

#[async_trait]
impl CaptureDevice for MockCaptureDevice {
    fn name(&self) -> &str {
        "mock camera"
    }

    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureSession>, CaptureError> {
        self.state.attempts.lock().push(*constraints);

        let delay = *self.state.acquire_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.state.failures.lock().pop_front();
        if let Some(error) = failure {
            debug!("Mock camera failing acquisition: {}", error);
            return Err(error);
        }

        let resolution = constraints.resolution.unwrap_or(self.resolution);
        self.state.live_sessions.fetch_add(1, Ordering::AcqRel);
        info!("Mock camera acquired at {}x{}", resolution.0, resolution.1);

        Ok(Box::new(MockCaptureSession {
            resolution,
            state: Arc::clone(&self.state),
            released: false,
        }))
    }
}

struct MockCaptureSession {
    resolution: (u32, u32),
    state: Arc<MockState>,
    released: bool,
}

#[async_trait]
impl CaptureSession for MockCaptureSession {
    fn description(&self) -> String {
        format!("mock {}x{}", self.resolution.0, self.resolution.1)
    }

    async fn attach(&mut self) -> Result<(), CaptureError> {
        if self.released {
            return Err(CaptureError::NoSession);
        }
        self.state.attaches.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn grab_frame(&mut self) -> Result<FrameData, CaptureError> {
        if self.released {
            return Err(CaptureError::NoSession);
        }

        let frame_id = self.state.frame_counter.fetch_add(1, Ordering::Relaxed);
        let (width, height) = self.resolution;

        let data = match self.state.frame_bytes.lock().clone() {
            Some(bytes) => bytes.as_ref().clone(),
            None => synthetic_jpeg(frame_id),
        };

        trace!("Generated mock frame {} ({} bytes)", frame_id, data.len());
        Ok(FrameData::new(
            frame_id,
            data,
            width,
            height,
            FrameFormat::Mjpeg,
        ))
    }

    async fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.releases.fetch_add(1, Ordering::AcqRel);
            self.state.live_sessions.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// JFIF header, a varying filler pattern and the end marker
fn synthetic_jpeg(frame_id: u64) -> Vec<u8> {
    let mut data = vec![
        0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x01, 0x00,
        0x48, 0x00, 0x48, 0x00, 0x00,
    ];
    let pattern_size = 1000 + (frame_id % 500) as usize;
    data.extend(vec![(frame_id % 256) as u8; pattern_size]);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}
