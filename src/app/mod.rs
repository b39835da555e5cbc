mod keyboard;
mod orchestrator;
mod runtime;
mod shutdown;
mod types;


pub use keyboard::{command_for_key, KeyboardInputHandler};
pub use orchestrator::ScanSession;
pub use types::{ScanCommand, ShutdownReason};
