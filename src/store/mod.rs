mod backend;
mod log_store;
mod preferences;

pub use backend::{FileBackend, KeyValueBackend, MemoryBackend};
pub use log_store::LogStore;
pub use preferences::Preferences;
