use super::keyboard::KeyboardInputHandler;
use super::types::ScanCommand;
use crate::camera::{CameraSessionManager, CaptureDevice, SessionSettings};
use crate::config::UnitflowConfig;
use crate::entry::LogEntry;
use crate::error::{Result, UnitflowError};
use crate::events::{EventBus, OperatorStatus, UnitflowEvent};
use crate::form::{EntryForm, ScanOutcome};
use crate::scanner::ScanDecoder;
use crate::store::LogStore;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Interactive scan session: camera, form and store wired over the event bus
pub struct ScanSession {
    pub(super) event_bus: EventBus,
    pub(super) store: Arc<LogStore>,
    pub(super) form: Arc<Mutex<EntryForm>>,
    pub(super) camera: Arc<CameraSessionManager>,

    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) command_sender: mpsc::UnboundedSender<ScanCommand>,
    pub(super) command_receiver: Option<mpsc::UnboundedReceiver<ScanCommand>>,
    pub(super) tasks: Vec<JoinHandle<()>>,
    pub(super) cancellation_token: CancellationToken,
}

impl ScanSession {
    pub fn new(
        config: &UnitflowConfig,
        device: Arc<dyn CaptureDevice>,
        decoder: Arc<dyn ScanDecoder>,
        store: Arc<LogStore>,
        form: EntryForm,
        event_bus: EventBus,
    ) -> Self {
        let camera = Arc::new(CameraSessionManager::new(
            device,
            decoder,
            event_bus.clone(),
            SessionSettings::from_config(&config.camera, &config.scanner),
        ));
        let (command_sender, command_receiver) = mpsc::unbounded_channel();

        Self {
            event_bus,
            store,
            form: Arc::new(Mutex::new(form)),
            camera,
            keyboard_handler: None,
            command_sender,
            command_receiver: Some(command_receiver),
            tasks: Vec::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Read commands from the terminal while running
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_handler = enabled.then(|| KeyboardInputHandler::new(self.command_sender.clone()));
    }

    /// Sender for feeding commands from elsewhere (tests, other front ends)
    pub fn commands(&self) -> mpsc::UnboundedSender<ScanCommand> {
        self.command_sender.clone()
    }

    pub fn camera(&self) -> &Arc<CameraSessionManager> {
        &self.camera
    }

    pub fn form(&self) -> &Arc<Mutex<EntryForm>> {
        &self.form
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Route accepted scans from the decode loop into the form
    pub fn spawn_scan_handler(&mut self) {
        let receiver = self.event_bus.subscribe();
        let handler = ScanHandler {
            event_bus: self.event_bus.clone(),
            store: Arc::clone(&self.store),
            form: Arc::clone(&self.form),
            cancel: self.cancellation_token.clone(),
        };
        self.tasks.push(tokio::spawn(handler.run(receiver)));
    }

    /// Apply one operator command. Returns false when the session should end.
    pub async fn handle_command(&self, command: ScanCommand) -> Result<bool> {
        debug!("Scan command {:?}", command);
        match command {
            ScanCommand::Start => {
                let outcome = self.camera.start().await?;
                debug!("Start outcome {:?}", outcome);
            }
            ScanCommand::Pause => self.camera.soft_stop().await?,
            ScanCommand::Hidden => {
                self.camera.on_visibility_change(false).await?;
            }
            ScanCommand::Visible => {
                self.camera.on_visibility_change(true).await?;
            }
            ScanCommand::Clear => {
                self.form.lock().await.clear();
                self.event_bus.status(OperatorStatus::info("Form cleared"));
            }
            ScanCommand::Submit => {
                let entry = self.form.lock().await.submit_manual(&self.store).await?;
                announce_logged(&self.event_bus, &entry);
                self.event_bus.status(OperatorStatus::info(format!(
                    "Logged {}",
                    entry.record.primary_value()
                )));
            }
            ScanCommand::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Like `handle_command`, but failures become status lines
    pub async fn dispatch(&self, command: ScanCommand) -> bool {
        match self.handle_command(command).await {
            Ok(keep_running) => keep_running,
            Err(e) => {
                report_error(&self.event_bus, &e);
                true
            }
        }
    }
}

fn announce_logged(event_bus: &EventBus, entry: &LogEntry) {
    let _ = event_bus.publish(UnitflowEvent::EntryLogged {
        id: entry.id.clone(),
        source: entry.source,
        timestamp: SystemTime::now(),
    });
}

/// Turn an operation failure into an operator status line
pub(super) fn report_error(event_bus: &EventBus, error: &UnitflowError) {
    let status = match error {
        UnitflowError::Validation(e) => OperatorStatus::warning(e.to_string()),
        // The camera manager already reported these
        UnitflowError::Camera(_) | UnitflowError::Decode(_) => return,
        UnitflowError::Store(e) => {
            OperatorStatus::error(format!("Could not save: {}", e)).with_hint("Check store.path")
        }
        other => OperatorStatus::error(other.to_string()),
    };
    event_bus.status(status);
}

struct ScanHandler {
    event_bus: EventBus,
    store: Arc<LogStore>,
    form: Arc<Mutex<EntryForm>>,
    cancel: CancellationToken,
}

impl ScanHandler {
    async fn run(self, mut receiver: broadcast::Receiver<UnitflowEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = receiver.recv() => event,
            };

            match event {
                Ok(UnitflowEvent::ScanAccepted { value, .. }) => self.on_scan(&value).await,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Scan handler lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Scan handler exited");
    }

    async fn on_scan(&self, value: &str) {
        let result = self
            .form
            .lock()
            .await
            .on_scan_accepted(value, &self.store)
            .await;

        match result {
            Ok(outcome) => {
                if let ScanOutcome::Logged(entry) = &outcome {
                    info!("Scan {} logged as {}", value, entry.id);
                    announce_logged(&self.event_bus, entry);
                }
                self.event_bus.status(outcome.status());
            }
            Err(e) => {
                error!("Failed to apply scan {}: {}", value, e);
                report_error(&self.event_bus, &e);
            }
        }
    }
}
