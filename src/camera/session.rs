use super::device::{CaptureConstraints, CaptureDevice, CaptureSession, SessionState};
use super::retry::AcquisitionPolicy;
use crate::config::{CameraConfig, ScannerConfig};
use crate::error::{CaptureError, DecodeError, Result};
use crate::events::{EventBus, OperatorStatus, UnitflowEvent};
use crate::scanner::{AcceptanceFilter, DecodedSymbol, ScanDecoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

type SharedSession = Arc<Mutex<Option<Box<dyn CaptureSession>>>>;

/// Result of a `start()` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new capture session was acquired
    Started,
    /// A session kept alive by a soft stop was reattached
    Resumed,
    /// Scanning was already running
    AlreadyRunning,
    /// Another start is in flight; this one was ignored
    AlreadyStarting,
    /// A stop arrived while starting and won
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopKind {
    Soft,
    Release,
}

/// Timing knobs for the manager, taken from the camera and scanner sections
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub constraints: CaptureConstraints,
    pub policy: AcquisitionPolicy,
    pub poll_interval: Duration,
    pub frame_timeout: Duration,
    pub cooldown: Duration,
    pub warn_after_failed_frames: u32,
    pub resume_on_visible: bool,
}

impl SessionSettings {
    pub fn from_config(camera: &CameraConfig, scanner: &ScannerConfig) -> Self {
        Self {
            constraints: CaptureConstraints::from_config(camera),
            policy: AcquisitionPolicy::from_config(camera),
            poll_interval: scanner.poll_interval(),
            frame_timeout: Duration::from_millis(camera.frame_timeout_ms),
            cooldown: scanner.cooldown(),
            warn_after_failed_frames: scanner.warn_after_failed_frames,
            resume_on_visible: camera.resume_on_visible,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        let config = crate::config::UnitflowConfig::default();
        Self::from_config(&config.camera, &config.scanner)
    }
}

struct DecodeLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Session state plus any stop that arrived while starting. Both live under
/// one lock so a stop either sees `Running` or is consumed by `start()`.
#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    pending_stop: Option<StopKind>,
}

/// Clears the in-flight start flag however `start()` exits. A start dropped
/// before it settled is rolled back out of `Starting`.
struct StartGuard<'a> {
    manager: &'a CameraSessionManager,
    settled: bool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.manager.abandon_start();
        }
        self.manager.starting.store(false, Ordering::Release);
    }
}

/// Owns the capture session and the decode poll task
pub struct CameraSessionManager {
    device: Arc<dyn CaptureDevice>,
    decoder: Arc<dyn ScanDecoder>,
    filter: Arc<parking_lot::Mutex<AcceptanceFilter>>,
    pub(super) session: SharedSession,
    lifecycle: parking_lot::Mutex<Lifecycle>,
    starting: AtomicBool,
    suspended_by_visibility: AtomicBool,
    unavailable_reported: AtomicBool,
    decode_loop: parking_lot::Mutex<Option<DecodeLoop>>,
    event_bus: EventBus,
    settings: SessionSettings,
}

impl CameraSessionManager {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        decoder: Arc<dyn ScanDecoder>,
        event_bus: EventBus,
        settings: SessionSettings,
    ) -> Self {
        Self {
            device,
            decoder,
            filter: Arc::new(parking_lot::Mutex::new(AcceptanceFilter::new(
                settings.cooldown,
            ))),
            session: Arc::new(Mutex::new(None)),
            lifecycle: parking_lot::Mutex::new(Lifecycle {
                state: SessionState::Idle,
                pending_stop: None,
            }),
            starting: AtomicBool::new(false),
            suspended_by_visibility: AtomicBool::new(false),
            unavailable_reported: AtomicBool::new(false),
            decode_loop: parking_lot::Mutex::new(None),
            event_bus,
            settings,
        }
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    pub fn decoder(&self) -> &Arc<dyn ScanDecoder> {
        &self.decoder
    }

    /// Whether a capture session is currently held
    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    fn set_state(&self, next: SessionState) {
        let mut lifecycle = self.lifecycle.lock();
        self.transition(&mut lifecycle, next);
    }

    fn transition(&self, lifecycle: &mut Lifecycle, next: SessionState) {
        let previous = std::mem::replace(&mut lifecycle.state, next);
        if previous != next {
            debug!("Camera session {} -> {}", previous, next);
            let _ = self.event_bus.publish(UnitflowEvent::CameraStateChanged {
                state: next,
                timestamp: SystemTime::now(),
            });
        }
    }

    /// Start or resume scanning
    pub async fn start(&self) -> Result<StartOutcome> {
        if let Some(reason) = self.decoder.unavailable_reason() {
            if !self.unavailable_reported.swap(true, Ordering::AcqRel) {
                self.event_bus.status(
                    OperatorStatus::warning(format!("Barcode scanning unavailable: {}", reason))
                        .with_hint("Manual entry only"),
                );
            }
            return Err(DecodeError::Unavailable {
                reason: reason.to_string(),
            }
            .into());
        }

        if self
            .starting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Camera start already in flight, ignoring");
            return Ok(StartOutcome::AlreadyStarting);
        }
        let mut guard = StartGuard {
            manager: self,
            settled: true,
        };

        if self.state() == SessionState::Running && self.decode_loop.lock().is_some() {
            debug!("Camera already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.suspended_by_visibility.store(false, Ordering::Release);
        {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.pending_stop = None;
            self.transition(&mut lifecycle, SessionState::Starting);
        }
        guard.settled = false;

        let outcome = {
            let mut slot = self.session.lock().await;
            let reused = match slot.as_mut() {
                Some(session) => match session.attach().await {
                    Ok(()) => {
                        info!("Reattached live capture session {}", session.description());
                        true
                    }
                    Err(e) => {
                        warn!("Could not reattach capture session, reacquiring: {}", e);
                        session.release().await;
                        false
                    }
                },
                None => false,
            };

            if reused {
                StartOutcome::Resumed
            } else {
                *slot = None;
                match self
                    .settings
                    .policy
                    .acquire(self.device.as_ref(), &self.settings.constraints)
                    .await
                {
                    Ok(session) => {
                        *slot = Some(session);
                        StartOutcome::Started
                    }
                    Err(e) => {
                        drop(slot);
                        self.set_state(SessionState::Idle);
                        guard.settled = true;
                        self.report_capture_error(&e);
                        return Err(e.into());
                    }
                }
            }
        };

        // A stop requested while we were acquiring wins over the start
        let stop = {
            let mut lifecycle = self.lifecycle.lock();
            let stop = lifecycle.pending_stop.take();
            match stop {
                Some(StopKind::Soft) => self.transition(&mut lifecycle, SessionState::Suspended),
                Some(StopKind::Release) => self.transition(&mut lifecycle, SessionState::Stopping),
                None => {
                    self.spawn_decode_loop();
                    self.transition(&mut lifecycle, SessionState::Running);
                }
            }
            stop
        };

        match stop {
            Some(StopKind::Soft) => {
                guard.settled = true;
                info!("Scanning paused while the camera was starting");
                Ok(StartOutcome::Superseded)
            }
            Some(StopKind::Release) => {
                if let Some(mut session) = self.session.lock().await.take() {
                    session.release().await;
                }
                info!("Camera released while it was starting");
                self.set_state(SessionState::Idle);
                guard.settled = true;
                Ok(StartOutcome::Superseded)
            }
            None => {
                guard.settled = true;
                self.event_bus.status(OperatorStatus::info(format!(
                    "Scanning with {} decoder",
                    self.decoder.name()
                )));
                Ok(outcome)
            }
        }
    }

    /// Undo a start whose future was dropped part way through
    fn abandon_start(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if !matches!(
            lifecycle.state,
            SessionState::Starting | SessionState::Stopping
        ) {
            return;
        }
        let stop = lifecycle.pending_stop.take();

        // A busy slot may still hold a session; keep it for a later resume or release
        let (held, orphan) = match self.session.try_lock() {
            Ok(mut slot) => match stop {
                Some(StopKind::Release) => (false, slot.take()),
                _ => (slot.is_some(), None),
            },
            Err(_) => (true, None),
        };

        let next = if held {
            SessionState::Suspended
        } else {
            SessionState::Idle
        };
        warn!("Camera start abandoned, back to {}", next);
        self.transition(&mut lifecycle, next);
        drop(lifecycle);

        if let Some(mut session) = orphan {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        session.release().await;
                    });
                }
                Err(_) => drop(session),
            }
        }
    }

    fn report_capture_error(&self, error: &CaptureError) {
        self.event_bus.status(
            OperatorStatus::error(format!("Camera unavailable: {}", error)).with_hint(error.hint()),
        );
    }

    /// Pause decoding but keep the capture session for a quick resume
    pub async fn soft_stop(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.state {
                SessionState::Starting => {
                    lifecycle.pending_stop.get_or_insert(StopKind::Soft);
                    return Ok(());
                }
                SessionState::Running => {}
                other => {
                    debug!("Soft stop ignored in state {}", other);
                    return Ok(());
                }
            }
        }

        self.stop_decode_loop().await;
        self.decoder.reset();
        self.filter.lock().reset();
        self.set_state(SessionState::Suspended);
        info!("Scanning paused, capture session kept alive");
        Ok(())
    }

    /// Stop decoding and give the camera back
    pub async fn hard_release(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == SessionState::Starting {
                lifecycle.pending_stop = Some(StopKind::Release);
                return Ok(());
            }
        }

        let had_session = self.session.lock().await.is_some();
        if !had_session && self.decode_loop.lock().is_none() {
            debug!("Hard release with nothing to release");
            self.set_state(SessionState::Idle);
            return Ok(());
        }

        self.set_state(SessionState::Stopping);
        self.stop_decode_loop().await;
        self.decoder.reset();
        self.filter.lock().reset();
        self.suspended_by_visibility.store(false, Ordering::Release);

        if let Some(mut session) = self.session.lock().await.take() {
            let description = session.description();
            session.release().await;
            info!("Released capture session {}", description);
        }

        self.set_state(SessionState::Idle);
        Ok(())
    }

    /// Hidden views pause scanning; visible views resume what visibility paused
    pub async fn on_visibility_change(&self, visible: bool) -> Result<Option<StartOutcome>> {
        let _ = self.event_bus.publish(UnitflowEvent::VisibilityChanged {
            visible,
            timestamp: SystemTime::now(),
        });

        if !visible {
            if matches!(
                self.state(),
                SessionState::Running | SessionState::Starting
            ) {
                self.soft_stop().await?;
                self.suspended_by_visibility.store(true, Ordering::Release);
            }
            return Ok(None);
        }

        if self.suspended_by_visibility.swap(false, Ordering::AcqRel) {
            if self.settings.resume_on_visible {
                return self.start().await.map(Some);
            }
            debug!("View visible again; resume_on_visible is off");
        }
        Ok(None)
    }

    /// The owning view is going away
    pub async fn on_teardown(&self, reason: &str) -> Result<()> {
        let _ = self.event_bus.publish(UnitflowEvent::TeardownRequested {
            timestamp: SystemTime::now(),
            reason: reason.to_string(),
        });
        self.hard_release().await
    }

    fn spawn_decode_loop(&self) {
        let cancel = CancellationToken::new();
        let task = DecodeTask {
            session: Arc::clone(&self.session),
            decoder: Arc::clone(&self.decoder),
            filter: Arc::clone(&self.filter),
            event_bus: self.event_bus.clone(),
            cancel: cancel.clone(),
            poll_interval: self.settings.poll_interval,
            frame_timeout: self.settings.frame_timeout,
            warn_after_failed_frames: self.settings.warn_after_failed_frames,
        };

        let handle = tokio::spawn(task.run());
        if let Some(previous) = self.decode_loop.lock().replace(DecodeLoop { cancel, handle }) {
            previous.cancel.cancel();
        }
    }

    async fn stop_decode_loop(&self) {
        let current = self.decode_loop.lock().take();
        if let Some(DecodeLoop { cancel, handle }) = current {
            cancel.cancel();
            match tokio::time::timeout(Duration::from_secs(3), handle).await {
                Ok(Ok(())) => debug!("Decode loop stopped"),
                Ok(Err(e)) => error!("Decode loop task failed: {}", e),
                Err(_) => warn!("Decode loop did not stop within timeout"),
            }
        }
    }
}

impl Drop for CameraSessionManager {
    fn drop(&mut self) {
        if let Some(decode_loop) = self.decode_loop.lock().take() {
            decode_loop.cancel.cancel();
        }
    }
}

/// Everything the poll task needs, moved into the spawned future
struct DecodeTask {
    session: SharedSession,
    decoder: Arc<dyn ScanDecoder>,
    filter: Arc<parking_lot::Mutex<AcceptanceFilter>>,
    event_bus: EventBus,
    cancel: CancellationToken,
    poll_interval: Duration,
    frame_timeout: Duration,
    warn_after_failed_frames: u32,
}

impl DecodeTask {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failed_frames: u32 = 0;
        let mut warned = false;

        debug!("Decode loop started ({:?} interval)", self.poll_interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = self.sample_once().await;
            if self.cancel.is_cancelled() {
                trace!("Discarding decode result after cancellation");
                break;
            }

            match result {
                Ok(Some(symbol)) => {
                    failed_frames = 0;
                    warned = false;
                    let accepted = self.filter.lock().accept(&symbol.text);
                    if let Some(value) = accepted {
                        let _ = self.event_bus.publish(UnitflowEvent::ScanAccepted {
                            value,
                            format: symbol.format,
                            timestamp: SystemTime::now(),
                        });
                    }
                }
                Ok(None) => {
                    failed_frames = failed_frames.saturating_add(1);
                }
                Err(e) => {
                    trace!("Frame skipped: {}", e);
                    failed_frames = failed_frames.saturating_add(1);
                }
            }

            if !warned
                && self.warn_after_failed_frames > 0
                && failed_frames >= self.warn_after_failed_frames
            {
                warned = true;
                let _ = self
                    .event_bus
                    .publish(UnitflowEvent::DecodeStalled { failed_frames });
                self.event_bus.status(
                    OperatorStatus::warning("Having trouble reading the barcode")
                        .with_hint("Hold steady, add light, or type the value"),
                );
            }
        }

        debug!("Decode loop exited");
    }

    /// Grab one frame and decode it. `Ok(None)` when the frame holds no symbol.
    async fn sample_once(&self) -> Result<Option<DecodedSymbol>> {
        let frame = {
            let mut slot = self.session.lock().await;
            let session = slot.as_mut().ok_or(CaptureError::NoSession)?;
            match tokio::time::timeout(self.frame_timeout, session.grab_frame()).await {
                Ok(frame) => frame?,
                Err(_) => {
                    return Err(CaptureError::FrameTimeout {
                        timeout: self.frame_timeout,
                    }
                    .into())
                }
            }
        };

        let symbols = self.decoder.detect(&frame).await?;
        trace!("Frame {} produced {} symbol(s)", frame.id, symbols.len());
        Ok(symbols.into_iter().find(|s| !s.text.trim().is_empty()))
    }
}
