use super::*;
use crate::config::Facing;
use crate::error::{CaptureError, DecodeError, UnitflowError};
use crate::events::{EventBus, StatusLevel, UnitflowEvent};
use crate::frame::FrameData;
use crate::scanner::{DecodedSymbol, ScanDecoder, SymbolFormat, UnavailableDecoder};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

/// Decoder returning the same answer for every frame
struct ScriptedDecoder {
    text: Option<String>,
    calls: AtomicU32,
    resets: AtomicU32,
}

impl ScriptedDecoder {
    fn reading(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: Some(text.to_string()),
            calls: AtomicU32::new(0),
            resets: AtomicU32::new(0),
        })
    }

    fn blank() -> Arc<Self> {
        Arc::new(Self {
            text: None,
            calls: AtomicU32::new(0),
            resets: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ScanDecoder for ScriptedDecoder {
    fn name(&self) -> &str {
        "scripted"
    }

    fn supported_formats(&self) -> &[SymbolFormat] {
        &[SymbolFormat::QrCode, SymbolFormat::Code128]
    }

    async fn detect(&self, _frame: &FrameData) -> Result<Vec<DecodedSymbol>, DecodeError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .text
            .iter()
            .map(|t| DecodedSymbol::new(t.clone(), SymbolFormat::Code128))
            .collect())
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }
}

fn fast_settings() -> SessionSettings {
    SessionSettings {
        poll_interval: Duration::from_millis(10),
        warn_after_failed_frames: 3,
        ..SessionSettings::default()
    }
}

fn manager_with(
    device: &MockCaptureDevice,
    decoder: Arc<dyn ScanDecoder>,
) -> (CameraSessionManager, broadcast::Receiver<UnitflowEvent>) {
    let bus = EventBus::new(256);
    let rx = bus.subscribe();
    let manager = CameraSessionManager::new(Arc::new(device.clone()), decoder, bus, fast_settings());
    (manager, rx)
}

async fn wait_for<F>(rx: &mut broadcast::Receiver<UnitflowEvent>, mut pred: F) -> Option<UnitflowEvent>
where
    F: FnMut(&UnitflowEvent) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

fn drain(rx: &mut broadcast::Receiver<UnitflowEvent>) -> Vec<UnitflowEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_constraints_relaxed() {
    let strict = CaptureConstraints {
        facing: Facing::Rear,
        resolution: Some((1280, 720)),
        fps: Some(30),
    };
    let relaxed = strict.relaxed();

    assert!(!strict.is_relaxed());
    assert!(relaxed.is_relaxed());
    assert_eq!(relaxed.facing, Facing::Any);
}

#[test]
fn test_policy_only_retries_transient_errors() {
    let policy = AcquisitionPolicy::default();
    let constraints = CaptureConstraints::default();
    let busy = CaptureError::Busy {
        details: "in use".to_string(),
    };
    let denied = CaptureError::PermissionDenied {
        details: "no".to_string(),
    };

    match policy.decide(1, &busy, &constraints) {
        RetryDecision::RetryAfterDelay { delay, constraints } => {
            assert_eq!(delay, Duration::from_millis(300));
            assert!(constraints.is_relaxed());
        }
        RetryDecision::GiveUp => panic!("Busy should be retried"),
    }

    // Second failure exhausts the default budget of two attempts
    assert_eq!(policy.decide(2, &busy, &constraints), RetryDecision::GiveUp);
    assert_eq!(policy.decide(1, &denied, &constraints), RetryDecision::GiveUp);
}

#[tokio::test]
async fn test_transient_failure_retries_with_relaxed_constraints() {
    let device = MockCaptureDevice::new((640, 480)).fail_next(CaptureError::OverConstrained {
        details: "1280x720 not supported".to_string(),
    });
    let (manager, _rx) = manager_with(&device, ScriptedDecoder::blank());

    assert_eq!(manager.start().await.unwrap(), StartOutcome::Started);
    assert_eq!(manager.state(), SessionState::Running);

    let attempts = device.acquire_attempts();
    assert_eq!(attempts.len(), 2);
    assert!(!attempts[0].is_relaxed());
    assert!(attempts[1].is_relaxed());

    manager.hard_release().await.unwrap();
}

#[tokio::test]
async fn test_permission_denied_is_not_retried() {
    let device = MockCaptureDevice::new((640, 480)).fail_next(CaptureError::PermissionDenied {
        details: "/dev/video0".to_string(),
    });
    let (manager, mut rx) = manager_with(&device, ScriptedDecoder::blank());

    let result = manager.start().await;
    assert!(matches!(
        result,
        Err(UnitflowError::Camera(CaptureError::PermissionDenied { .. }))
    ));
    assert_eq!(device.acquire_attempts().len(), 1);
    assert_eq!(manager.state(), SessionState::Idle);

    let status = wait_for(&mut rx, |e| matches!(e, UnitflowEvent::Status(_))).await;
    match status {
        Some(UnitflowEvent::Status(status)) => {
            assert_eq!(status.level, StatusLevel::Error);
            assert!(status.hint.is_some());
        }
        other => panic!("Expected status event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unavailable_device_keeps_manager_idle() {
    let bus = EventBus::new(64);
    let device = Arc::new(UnavailableDevice::new(CaptureError::NotFound {
        details: "built without capture support".to_string(),
    }));
    let manager = CameraSessionManager::new(device, ScriptedDecoder::blank(), bus, fast_settings());

    for _ in 0..2 {
        assert!(matches!(
            manager.start().await,
            Err(UnitflowError::Camera(CaptureError::NotFound { .. }))
        ));
        assert_eq!(manager.state(), SessionState::Idle);
    }
    assert!(!manager.has_session().await);
}

#[tokio::test]
async fn test_concurrent_start_is_ignored() {
    let device = MockCaptureDevice::new((640, 480)).with_acquire_delay(Duration::from_millis(100));
    let (manager, _rx) = manager_with(&device, ScriptedDecoder::blank());

    let (first, second) = tokio::join!(manager.start(), manager.start());
    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|o| *o == StartOutcome::Started);

    assert_eq!(
        outcomes,
        vec![StartOutcome::AlreadyStarting, StartOutcome::Started]
    );
    assert_eq!(device.acquire_attempts().len(), 1);

    // Once running, another start is a no-op
    assert_eq!(manager.start().await.unwrap(), StartOutcome::AlreadyRunning);
    manager.hard_release().await.unwrap();
}

#[tokio::test]
async fn test_soft_stop_keeps_session_and_restart_reuses_it() {
    let device = MockCaptureDevice::new((640, 480));
    let decoder = ScriptedDecoder::blank();
    let (manager, _rx) = manager_with(&device, decoder.clone());

    manager.start().await.unwrap();
    manager.soft_stop().await.unwrap();

    assert_eq!(manager.state(), SessionState::Suspended);
    assert!(manager.has_session().await);
    assert_eq!(device.live_sessions(), 1);
    assert_eq!(decoder.resets.load(Ordering::Relaxed), 1);

    assert_eq!(manager.start().await.unwrap(), StartOutcome::Resumed);
    assert_eq!(device.acquire_attempts().len(), 1);
    assert_eq!(device.attach_count(), 1);

    manager.hard_release().await.unwrap();
}

#[tokio::test]
async fn test_hard_release_drops_session() {
    let device = MockCaptureDevice::new((640, 480));
    let (manager, _rx) = manager_with(&device, ScriptedDecoder::blank());

    manager.start().await.unwrap();
    manager.hard_release().await.unwrap();

    assert_eq!(manager.state(), SessionState::Idle);
    assert!(!manager.has_session().await);
    assert_eq!(device.release_count(), 1);
    assert_eq!(device.live_sessions(), 0);

    // A later start has to acquire again
    assert_eq!(manager.start().await.unwrap(), StartOutcome::Started);
    assert_eq!(device.acquire_attempts().len(), 2);
    manager.on_teardown("test finished").await.unwrap();
    assert_eq!(device.live_sessions(), 0);
}

#[tokio::test]
async fn test_visibility_suspends_and_resumes() {
    let device = MockCaptureDevice::new((640, 480));
    let (manager, _rx) = manager_with(&device, ScriptedDecoder::blank());

    manager.start().await.unwrap();
    assert_eq!(manager.on_visibility_change(false).await.unwrap(), None);
    assert_eq!(manager.state(), SessionState::Suspended);

    assert_eq!(
        manager.on_visibility_change(true).await.unwrap(),
        Some(StartOutcome::Resumed)
    );
    assert_eq!(manager.state(), SessionState::Running);

    // Visible again without a visibility pause does nothing
    manager.soft_stop().await.unwrap();
    assert_eq!(manager.on_visibility_change(true).await.unwrap(), None);
    assert_eq!(manager.state(), SessionState::Suspended);

    manager.hard_release().await.unwrap();
}

#[tokio::test]
async fn test_release_during_start_wins() {
    let device = MockCaptureDevice::new((640, 480)).with_acquire_delay(Duration::from_millis(100));
    let (manager, _rx) = manager_with(&device, ScriptedDecoder::blank());

    let (started, released) = tokio::join!(manager.start(), async {
        sleep(Duration::from_millis(20)).await;
        manager.hard_release().await
    });

    assert_eq!(started.unwrap(), StartOutcome::Superseded);
    released.unwrap();
    assert_eq!(manager.state(), SessionState::Idle);
    assert_eq!(device.live_sessions(), 0);
}

#[tokio::test]
async fn test_pause_during_start_keeps_session() {
    let device = MockCaptureDevice::new((640, 480)).with_acquire_delay(Duration::from_millis(100));
    let (manager, _rx) = manager_with(&device, ScriptedDecoder::blank());

    let (started, paused) = tokio::join!(manager.start(), async {
        sleep(Duration::from_millis(20)).await;
        manager.soft_stop().await
    });

    assert_eq!(started.unwrap(), StartOutcome::Superseded);
    paused.unwrap();
    assert_eq!(manager.state(), SessionState::Suspended);
    assert_eq!(device.live_sessions(), 1);

    manager.hard_release().await.unwrap();
    assert_eq!(device.live_sessions(), 0);
}

#[tokio::test]
async fn test_cancelled_start_rolls_back_and_release_completes() {
    let device = MockCaptureDevice::new((640, 480)).with_acquire_delay(Duration::from_millis(200));
    let (manager, _rx) = manager_with(&device, ScriptedDecoder::blank());

    assert!(timeout(Duration::from_millis(20), manager.start())
        .await
        .is_err());
    assert_eq!(manager.state(), SessionState::Idle);

    manager.hard_release().await.unwrap();
    assert_eq!(manager.state(), SessionState::Idle);
    assert!(!manager.has_session().await);
    assert_eq!(device.live_sessions(), 0);

    // The in-flight flag was cleared too
    assert_eq!(manager.start().await.unwrap(), StartOutcome::Started);
    manager.on_teardown("test finished").await.unwrap();
    assert_eq!(device.live_sessions(), 0);
}

#[tokio::test]
async fn test_hiding_after_cancelled_start_does_not_wedge() {
    let device = MockCaptureDevice::new((640, 480)).with_acquire_delay(Duration::from_millis(200));
    let (manager, _rx) = manager_with(&device, ScriptedDecoder::blank());

    assert!(timeout(Duration::from_millis(20), manager.start())
        .await
        .is_err());

    assert_eq!(manager.on_visibility_change(false).await.unwrap(), None);
    assert_ne!(manager.state(), SessionState::Starting);
    assert_eq!(manager.state(), SessionState::Idle);

    // Nothing was paused by visibility, so showing the view again starts nothing
    assert_eq!(manager.on_visibility_change(true).await.unwrap(), None);
    assert_eq!(device.acquire_attempts().len(), 1);
}

#[tokio::test]
async fn test_cancelled_resume_keeps_suspended_session() {
    let device = MockCaptureDevice::new((640, 480));
    let (manager, _rx) = manager_with(&device, ScriptedDecoder::blank());

    manager.start().await.unwrap();
    manager.soft_stop().await.unwrap();

    // Hold the slot so the resume parks mid-start, then drop it
    let slot = manager.session.lock().await;
    assert!(timeout(Duration::from_millis(20), manager.start())
        .await
        .is_err());
    drop(slot);

    assert_eq!(manager.state(), SessionState::Suspended);
    assert_eq!(manager.start().await.unwrap(), StartOutcome::Resumed);
    manager.hard_release().await.unwrap();
    assert_eq!(device.live_sessions(), 0);
}

#[tokio::test]
async fn test_unavailable_decoder_blocks_start() {
    let device = MockCaptureDevice::new((640, 480));
    let decoder = Arc::new(UnavailableDecoder::new("no barcode decoder found"));
    let (manager, mut rx) = manager_with(&device, decoder);

    assert!(matches!(
        manager.start().await,
        Err(UnitflowError::Decode(DecodeError::Unavailable { .. }))
    ));
    assert!(manager.start().await.is_err());
    assert!(device.acquire_attempts().is_empty());

    // Reported once only
    let statuses = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, UnitflowEvent::Status(_)))
        .count();
    assert_eq!(statuses, 1);
}

#[tokio::test]
async fn test_decode_loop_publishes_accepted_scan_once() {
    let device = MockCaptureDevice::new((640, 480));
    let decoder = ScriptedDecoder::reading("  SN123 ");
    let (manager, mut rx) = manager_with(&device, decoder.clone());

    manager.start().await.unwrap();

    let event = wait_for(&mut rx, |e| matches!(e, UnitflowEvent::ScanAccepted { .. })).await;
    match event {
        Some(UnitflowEvent::ScanAccepted { value, format, .. }) => {
            assert_eq!(value, "SN123");
            assert_eq!(format, SymbolFormat::Code128);
        }
        other => panic!("Expected scan event, got {:?}", other),
    }

    // Same code held in view: the cooldown swallows the repeats
    sleep(Duration::from_millis(100)).await;
    manager.soft_stop().await.unwrap();
    assert!(decoder.calls.load(Ordering::Relaxed) > 2);

    let repeats = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, UnitflowEvent::ScanAccepted { .. }))
        .count();
    assert_eq!(repeats, 0);

    manager.hard_release().await.unwrap();
}

#[tokio::test]
async fn test_stalled_decoding_warns_once() {
    let device = MockCaptureDevice::new((640, 480));
    let (manager, mut rx) = manager_with(&device, ScriptedDecoder::blank());

    manager.start().await.unwrap();

    let stalled = wait_for(&mut rx, |e| matches!(e, UnitflowEvent::DecodeStalled { .. })).await;
    assert!(matches!(
        stalled,
        Some(UnitflowEvent::DecodeStalled { failed_frames: 3 })
    ));

    sleep(Duration::from_millis(100)).await;
    manager.hard_release().await.unwrap();

    let again = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, UnitflowEvent::DecodeStalled { .. }))
        .count();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn test_state_changes_are_published() {
    let device = MockCaptureDevice::new((640, 480));
    let (manager, mut rx) = manager_with(&device, ScriptedDecoder::blank());

    manager.start().await.unwrap();
    manager.soft_stop().await.unwrap();
    manager.hard_release().await.unwrap();

    let states: Vec<SessionState> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            UnitflowEvent::CameraStateChanged { state, .. } => Some(state),
            _ => None,
        })
        .collect();

    assert_eq!(
        states,
        vec![
            SessionState::Starting,
            SessionState::Running,
            SessionState::Suspended,
            SessionState::Stopping,
            SessionState::Idle,
        ]
    );
}
