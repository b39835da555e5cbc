use super::device::{CaptureConstraints, CaptureDevice, CaptureSession};
use crate::config::{CameraConfig, Facing};
use crate::error::CaptureError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

const STATE_CHANGE_TIMEOUT_SECS: u64 = 3;

/// V4L2 camera opened through a GStreamer appsink pipeline
pub struct GstCaptureDevice {
    index: u32,
    frame_timeout: Duration,
    frame_counter: Arc<AtomicU64>,
}

impl GstCaptureDevice {
    pub fn new(config: &CameraConfig) -> Result<Self, CaptureError> {
        gstreamer::init().map_err(|e| CaptureError::Platform {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        info!(
            "GStreamer camera device ready (index {}, {}x{} @ {}fps)",
            config.index, config.resolution.0, config.resolution.1, config.fps
        );

        Ok(Self {
            index: config.index,
            frame_timeout: Duration::from_millis(config.frame_timeout_ms),
            frame_counter: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Pick a device node, preferring one whose name matches the requested sensor
    fn resolve_device_path(&self, facing: Facing) -> String {
        let fallback = format!("/dev/video{}", self.index);
        let keywords: &[&str] = match facing {
            Facing::Rear => &["rear", "back", "world"],
            Facing::Front => &["front", "user", "face"],
            Facing::Any => return fallback,
        };

        let monitor = gstreamer::DeviceMonitor::new();
        let _ = monitor.add_filter(Some("Video/Source"), None);
        if let Err(e) = monitor.start() {
            debug!("Device monitor unavailable, using {}: {}", fallback, e);
            return fallback;
        }
        let devices = monitor.devices();
        monitor.stop();

        for device in devices.iter() {
            let name = device.display_name().to_lowercase();
            if !keywords.iter().any(|k| name.contains(k)) {
                continue;
            }
            let path = device.properties().and_then(|props| {
                props
                    .get::<String>("api.v4l2.path")
                    .or_else(|_| props.get::<String>("device.path"))
                    .ok()
            });
            if let Some(path) = path {
                info!("Using {:?} camera '{}' at {}", facing, name, path);
                return path;
            }
        }

        debug!("No {:?} camera advertised, using {}", facing, fallback);
        fallback
    }

    fn build_pipeline_string(device: &str, constraints: &CaptureConstraints) -> String {
        let sink = "appsink name=sink sync=false max-buffers=1 drop=true enable-last-sample=false";
        match constraints.resolution {
            Some((width, height)) => {
                let fps = constraints.fps.unwrap_or(30);
                format!(
                    "v4l2src device={} io-mode=mmap ! \
                     image/jpeg,width={},height={},framerate={}/1 ! {}",
                    device, width, height, fps, sink
                )
            }
            None => format!(
                "v4l2src device={} ! decodebin ! videoconvert ! video/x-raw,format=RGB ! {}",
                device, sink
            ),
        }
    }

    fn open(
        device: String,
        constraints: CaptureConstraints,
    ) -> Result<(Pipeline, AppSink), CaptureError> {
        let description = Self::build_pipeline_string(&device, &constraints);
        info!("Creating GStreamer pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| CaptureError::Platform {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CaptureError::Platform {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| CaptureError::Platform {
                details: "Pipeline has no appsink".to_string(),
            })?;

        if pipeline.set_state(gstreamer::State::Playing).is_err() {
            let error = Self::bus_error(&pipeline, &device);
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(error);
        }

        let (result, _, _) =
            pipeline.state(gstreamer::ClockTime::from_seconds(STATE_CHANGE_TIMEOUT_SECS));
        if result.is_err() {
            let error = Self::bus_error(&pipeline, &device);
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(error);
        }

        Ok((pipeline, appsink))
    }

    /// Turn the first error on the bus into a capture error kind
    fn bus_error(pipeline: &Pipeline, device: &str) -> CaptureError {
        let message = pipeline
            .bus()
            .and_then(|bus| bus.pop_filtered(&[gstreamer::MessageType::Error]))
            .and_then(|msg| match msg.view() {
                gstreamer::MessageView::Error(err) => Some(format!(
                    "{} ({})",
                    err.error(),
                    err.debug().map(|d| d.to_string()).unwrap_or_default()
                )),
                _ => None,
            })
            .unwrap_or_else(|| format!("{} failed to start", device));

        classify_error(&message)
    }
}

/// Map GStreamer/V4L2 error text onto capture error kinds
pub(crate) fn classify_error(message: &str) -> CaptureError {
    let lower = message.to_lowercase();
    let details = message.to_string();

    if lower.contains("permission denied") || lower.contains("not permitted") {
        CaptureError::PermissionDenied { details }
    } else if lower.contains("no such file")
        || lower.contains("cannot identify device")
        || lower.contains("not a capture device")
    {
        CaptureError::NotFound { details }
    } else if lower.contains("busy") {
        CaptureError::Busy { details }
    } else if lower.contains("not-negotiated") || lower.contains("not negotiated") || lower.contains("format") {
        CaptureError::OverConstrained { details }
    } else if lower.contains("interrupted") || lower.contains("aborted") {
        CaptureError::Aborted { details }
    } else {
        CaptureError::Platform { details }
    }
}

#[async_trait]
impl CaptureDevice for GstCaptureDevice {
    fn name(&self) -> &str {
        "v4l2 camera"
    }

    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureSession>, CaptureError> {
        let device = self.resolve_device_path(constraints.facing);
        let constraints = *constraints;
        let path = device.clone();

        let (pipeline, appsink) =
            tokio::task::spawn_blocking(move || Self::open(path, constraints))
                .await
                .map_err(|e| CaptureError::Aborted {
                    details: format!("Camera start task failed: {}", e),
                })??;

        Ok(Box::new(GstCaptureSession {
            device,
            pipeline,
            appsink,
            frame_timeout: self.frame_timeout,
            frame_counter: Arc::clone(&self.frame_counter),
            released: false,
        }))
    }
}

struct GstCaptureSession {
    device: String,
    pipeline: Pipeline,
    appsink: AppSink,
    frame_timeout: Duration,
    frame_counter: Arc<AtomicU64>,
    released: bool,
}

impl GstCaptureSession {
    fn sample_to_frame(sample: gstreamer::Sample, frame_id: u64) -> Result<FrameData, CaptureError> {
        let buffer = sample.buffer().ok_or_else(|| CaptureError::Platform {
            details: "No buffer in sample".to_string(),
        })?;
        let caps = sample.caps().ok_or_else(|| CaptureError::Platform {
            details: "No caps in sample".to_string(),
        })?;
        let map = buffer.map_readable().map_err(|e| CaptureError::Platform {
            details: format!("Failed to map buffer: {}", e),
        })?;

        let structure = caps.structure(0).ok_or_else(|| CaptureError::Platform {
            details: "Empty caps".to_string(),
        })?;

        if structure.name() == "image/jpeg" {
            let width = structure.get::<i32>("width").unwrap_or(0).max(0) as u32;
            let height = structure.get::<i32>("height").unwrap_or(0).max(0) as u32;
            return Ok(FrameData::new(
                frame_id,
                map.as_slice().to_vec(),
                width,
                height,
                FrameFormat::Mjpeg,
            ));
        }

        let info = VideoInfo::from_caps(caps).map_err(|e| CaptureError::Platform {
            details: format!("Failed to get video info: {}", e),
        })?;
        let width = info.width();
        let height = info.height();
        let row_bytes = width as usize * 3;
        let stride = info.stride()[0].max(0) as usize;
        let src = map.as_slice();

        // Rows may be padded; copy them out tightly packed
        let data = if stride == row_bytes {
            src.to_vec()
        } else {
            let mut packed = Vec::with_capacity(row_bytes * height as usize);
            for row in 0..height as usize {
                let start = row * stride;
                let end = start + row_bytes;
                if end > src.len() {
                    break;
                }
                packed.extend_from_slice(&src[start..end]);
            }
            packed
        };

        Ok(FrameData::new(
            frame_id,
            data,
            width,
            height,
            FrameFormat::Rgb24,
        ))
    }
}

#[async_trait]
impl CaptureSession for GstCaptureSession {
    fn description(&self) -> String {
        format!("{} via GStreamer", self.device)
    }

    async fn attach(&mut self) -> Result<(), CaptureError> {
        if self.released {
            return Err(CaptureError::NoSession);
        }
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| classify_error(&e.to_string()))?;
        Ok(())
    }

    async fn grab_frame(&mut self) -> Result<FrameData, CaptureError> {
        if self.released {
            return Err(CaptureError::NoSession);
        }

        let appsink = self.appsink.clone();
        let timeout = self.frame_timeout;
        let frame_id = self.frame_counter.fetch_add(1, Ordering::Relaxed);

        let sample = tokio::task::spawn_blocking(move || {
            appsink.try_pull_sample(gstreamer::ClockTime::from_mseconds(timeout.as_millis() as u64))
        })
        .await
        .map_err(|e| CaptureError::Platform {
            details: format!("Frame task failed: {}", e),
        })?
        .ok_or(CaptureError::FrameTimeout { timeout })?;

        let frame = Self::sample_to_frame(sample, frame_id)?;
        trace!(
            "Captured {:?} frame {} ({}x{}, {} bytes)",
            frame.format,
            frame.id,
            frame.width,
            frame.height,
            frame.data.len()
        );
        Ok(frame)
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop GStreamer pipeline for {}: {}", self.device, e);
        }
        info!("GStreamer pipeline for {} stopped", self.device);
    }
}

impl Drop for GstCaptureSession {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.pipeline.set_state(gstreamer::State::Null);
        }
    }
}
