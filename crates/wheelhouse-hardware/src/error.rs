//! Error types for serial port operations.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to a serial port.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Port is not connected or has been unplugged.
    #[error("Port disconnected: {port}")]
    Disconnected { port: String },

    /// Port exists but cannot be opened right now.
    #[error("Port unavailable: {port}: {reason}")]
    Unavailable { port: String, reason: String },

    /// Serial driver error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(port: impl Into<String>) -> Self {
        Self::Disconnected { port: port.into() }
    }

    /// Create a new unavailable error.
    pub fn unavailable(port: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            port: port.into(),
            reason: reason.into(),
        }
    }
}
