//! Error types for serial operations

use std::time::Duration;

use iotprov_core::ErrorKind;
use thiserror::Error;

/// Serial-specific errors
#[derive(Debug, Error)]
pub enum SerialError {
    /// A step's deadline passed before its prompt arrived
    #[error("Timed out after {after:?} waiting for {}", prompt.as_deref().unwrap_or("the device"))]
    Timeout {
        prompt: Option<String>,
        after: Duration,
    },

    /// The device closed the connection mid-conversation
    #[error("Serial port closed early")]
    Closed,

    /// The device answered, but not in a form we understand
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The query is not available on this device family
    #[error("{0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Port(#[from] serialport::Error),

    #[error(transparent)]
    Core(#[from] iotprov_core::Error),
}

impl SerialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SerialError::Timeout { .. } => ErrorKind::Timeout,
            SerialError::Closed => ErrorKind::TransportFailure,
            SerialError::UnexpectedResponse(_) => ErrorKind::TransportFailure,
            SerialError::Unsupported(_) => ErrorKind::NoDeviceSpec,
            SerialError::Io(_) => ErrorKind::Io,
            SerialError::Port(_) => ErrorKind::TransportFailure,
            SerialError::Core(e) => e.kind(),
        }
    }
}

/// Result type for serial operations
pub type Result<T> = std::result::Result<T, SerialError>;
