use super::types::ScanCommand;
use crate::error::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Map a key press to a scan command
pub fn command_for_key(code: KeyCode) -> Option<ScanCommand> {
    match code {
        KeyCode::Char('s') | KeyCode::Char('S') => Some(ScanCommand::Start),
        KeyCode::Char('p') | KeyCode::Char('P') => Some(ScanCommand::Pause),
        KeyCode::Char('h') | KeyCode::Char('H') => Some(ScanCommand::Hidden),
        KeyCode::Char('v') | KeyCode::Char('V') => Some(ScanCommand::Visible),
        KeyCode::Char('c') | KeyCode::Char('C') => Some(ScanCommand::Clear),
        KeyCode::Enter => Some(ScanCommand::Submit),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(ScanCommand::Quit),
        _ => None,
    }
}

/// Raw-mode terminal reader feeding scan commands
pub struct KeyboardInputHandler {
    commands: mpsc::UnboundedSender<ScanCommand>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(commands: mpsc::UnboundedSender<ScanCommand>) -> Self {
        Self {
            commands,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Keys: s start, p pause, h/v hide/show, c clear, Enter log, q quit");

        let commands = self.commands.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            if key_event.kind != KeyEventKind::Press {
                                continue;
                            }
                            match command_for_key(key_event.code) {
                                Some(command) => {
                                    debug!("Key {:?} -> {:?}", key_event.code, command);
                                    if commands.send(command).is_err() {
                                        break;
                                    }
                                    if command == ScanCommand::Quit {
                                        break;
                                    }
                                }
                                None => debug!("Key pressed: {:?}", key_event.code),
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Let the poll loop notice and restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}
