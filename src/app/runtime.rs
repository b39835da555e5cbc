use super::{ScanCommand, ScanSession, ShutdownReason};
use crate::error::{Result, UnitflowError};
use crate::events::{StatusLevel, UnitflowEvent};
use std::io::Write;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

impl ScanSession {
    /// Run the interactive loop until quit, end of input or a signal
    pub async fn run(&mut self, start_immediately: bool) -> Result<i32> {
        info!("Scan session is running");

        let mut commands = self
            .command_receiver
            .take()
            .ok_or_else(|| UnitflowError::system("Command receiver already taken"))?;

        let (shutdown_sender, mut shutdown_receiver) = oneshot::channel();
        self.setup_signal_handlers(shutdown_sender);

        self.spawn_scan_handler();
        self.tasks.push(tokio::spawn(print_status_lines(
            self.event_bus.subscribe(),
            self.cancellation_token.clone(),
        )));

        if let Some(keyboard) = &self.keyboard_handler {
            keyboard.start().await?;
        }

        if start_immediately && !self.dispatch(ScanCommand::Start).await {
            return self.shutdown(ShutdownReason::UserRequest).await;
        }

        let reason = loop {
            tokio::select! {
                signal = &mut shutdown_receiver => {
                    break signal.unwrap_or_else(|_| ShutdownReason::Signal("unknown".to_string()));
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.dispatch(command).await {
                            break ShutdownReason::UserRequest;
                        }
                    }
                    None => break ShutdownReason::InputClosed,
                },
            }
        };

        info!("Shutdown initiated: {:?}", reason);
        self.shutdown(reason).await
    }

    fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // SIGTERM from a service manager
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}

/// Operator-facing status lines. Raw mode needs explicit carriage returns.
pub(super) fn status_line(event: &UnitflowEvent) -> Option<String> {
    match event {
        UnitflowEvent::Status(status) => {
            let tag = match status.level {
                StatusLevel::Info => "",
                StatusLevel::Warning => "[!] ",
                StatusLevel::Error => "[x] ",
            };
            Some(format!("{}{}", tag, status))
        }
        UnitflowEvent::CameraStateChanged { state, .. } => Some(format!("camera: {}", state)),
        _ => None,
    }
}

async fn print_status_lines(
    mut receiver: broadcast::Receiver<UnitflowEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = receiver.recv() => event,
        };
        match event {
            Ok(event) => {
                if let Some(line) = status_line(&event) {
                    let mut stdout = std::io::stdout().lock();
                    let _ = write!(stdout, "{}\r\n", line);
                    let _ = stdout.flush();
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
