/// Operator commands driving a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCommand {
    /// Start or resume scanning
    Start,
    /// Soft stop; the camera stays open
    Pause,
    /// The scan view went out of sight
    Hidden,
    /// The scan view came back
    Visible,
    /// Empty the form
    Clear,
    /// Log the form as a manual entry
    Submit,
    /// Tear the session down
    Quit,
}

/// Why the scan session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest,
    InputClosed,
}
