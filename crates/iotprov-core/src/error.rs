//! Error types for provisioning operations

use std::net::Ipv4Addr;
use std::path::PathBuf;

use thiserror::Error;

use crate::spec::{ModelId, Protocol};

/// Coarse classification of an [`Error`], stable across message changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DeviceNotFound,
    NoDeviceSpec,
    SegmentUndefined,
    TransportFailure,
    Timeout,
    AmbiguousAddress,
    NoAddress,
    FileNotFound,
    FileTooLarge,
    InvalidAddress,
    UnsupportedProtocol,
    ToolFailure,
    Io,
}

/// Provisioning errors
#[derive(Debug, Error)]
pub enum Error {
    /// No attached device matched a known model
    #[error("No device found: {message}")]
    DeviceNotFound { message: String },

    /// The model has no entry in the device table
    #[error("No device specs for model {0}")]
    UnknownModel(ModelId),

    /// The model exists but does not define the named segment
    #[error("Segment '{segment}' is not defined for model {model}")]
    SegmentUndefined { model: ModelId, segment: String },

    /// The programming transport reported a failure
    #[error("Transport failure: {message}")]
    TransportFailure { message: String },

    /// "mine" matched more than one local address
    #[error("Multiple valid IP addresses: {}", format_addrs(.0))]
    AmbiguousAddress(Vec<Ipv4Addr>),

    /// "mine" matched no local address
    #[error("No IP addresses found")]
    NoAddress,

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// An image does not fit inside its target segment
    #[error("{} is {size} bytes but the segment holds {limit}", path.display())]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    /// The model cannot talk to the cloud over this protocol
    #[error("Model {model} does not support the {protocol} protocol")]
    UnsupportedProtocol { model: ModelId, protocol: Protocol },

    /// The external key tool failed
    #[error("Key tool failure: {message}")]
    KeyTool { message: String },

    /// The segment has no size, so an image cannot be laid out for it
    #[error("Segment '{segment}' has no size")]
    MissingSegmentSize { segment: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
            Error::UnknownModel(_) => ErrorKind::NoDeviceSpec,
            Error::SegmentUndefined { .. } => ErrorKind::SegmentUndefined,
            Error::TransportFailure { .. } => ErrorKind::TransportFailure,
            Error::AmbiguousAddress(_) => ErrorKind::AmbiguousAddress,
            Error::NoAddress => ErrorKind::NoAddress,
            Error::FileNotFound(_) => ErrorKind::FileNotFound,
            Error::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            Error::InvalidAddress(_) => ErrorKind::InvalidAddress,
            Error::UnsupportedProtocol { .. } => ErrorKind::UnsupportedProtocol,
            Error::KeyTool { .. } => ErrorKind::ToolFailure,
            Error::MissingSegmentSize { .. } => ErrorKind::SegmentUndefined,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Error::TransportFailure {
            message: message.into(),
        }
    }
}

fn format_addrs(addrs: &[Ipv4Addr]) -> String {
    addrs
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for provisioning operations
pub type Result<T> = std::result::Result<T, Error>;
