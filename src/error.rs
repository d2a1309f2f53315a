//! Error types shared by the capture engine and its backends

use thiserror::Error;

/// Errors surfaced by GPIO backends and the edge capture engine
///
/// "No signal before timeout" is not an error: it is an empty capture.
/// Everything here is a configuration or hardware fault that must reach
/// the caller.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Could not connect to pigpio daemon at {addr}: {source}")]
    BackendUnavailable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pigpio daemon rejected {command} (error {code})")]
    Backend { command: &'static str, code: i32 },

    #[error("Edge notification stream closed: {0}")]
    StreamClosed(String),

    #[error("Invalid capture configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid GPIO pin {0} (expected 0..={max})", max = crate::pin::MAX_GPIO)]
    InvalidPin(u32),

    #[error("Backend I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// True when the hardware service itself could not be reached
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, CaptureError::BackendUnavailable { .. })
    }
}

/// Result type for capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;
