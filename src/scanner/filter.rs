use std::time::{Duration, Instant};
use tracing::trace;

/// Drops repeated reads of the same barcode held in front of the camera
#[derive(Debug, Clone)]
pub struct AcceptanceFilter {
    cooldown: Duration,
    last: Option<(String, Instant)>,
}

impl AcceptanceFilter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Accept a raw decoded value now
    pub fn accept(&mut self, raw: &str) -> Option<String> {
        self.accept_at(raw, Instant::now())
    }

    /// Trim the value and reject empties and repeats inside the cooldown window.
    /// Accepted values become the new reference for the window.
    pub fn accept_at(&mut self, raw: &str, now: Instant) -> Option<String> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }

        if let Some((last_value, accepted_at)) = &self.last {
            if last_value == value && now.saturating_duration_since(*accepted_at) < self.cooldown {
                trace!("Dropping repeated read of {}", value);
                return None;
            }
        }

        self.last = Some((value.to_string(), now));
        Some(value.to_string())
    }

    /// Forget the last accepted value
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn last_accepted(&self) -> Option<&str> {
        self.last.as_ref().map(|(value, _)| value.as_str())
    }
}
