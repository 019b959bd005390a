//! Programming transport abstraction
//!
//! A transport moves whole files between the host and a device that is
//! already in DFU mode. Implementations own the mechanics (spawning
//! `dfu-util`, USB access, ...) and report failures as opaque messages.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::spec::ModelId;

/// Opaque transport failure carrying the collaborator's raw output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// DFU programming transport
///
/// `address` is the argument built by [`Segment::transport_address`], either
/// `"<address>"` or `"<address>:<size>"`. The returned string is the
/// transport's raw output and carries no meaning beyond success.
///
/// [`Segment::transport_address`]: crate::spec::Segment::transport_address
pub trait DfuTransport {
    /// List the ids of attached devices in DFU mode
    fn enumerate(&self, timeout: Duration) -> Result<Vec<ModelId>, TransportError>;

    /// Read flash at `address` into `dest`
    fn read(
        &self,
        device: ModelId,
        alt: u8,
        address: &str,
        dest: &Path,
        leave: bool,
    ) -> Result<String, TransportError>;

    /// Write `src` to flash at `address`
    fn write(
        &self,
        device: ModelId,
        alt: u8,
        address: &str,
        src: &Path,
        leave: bool,
    ) -> Result<String, TransportError>;
}
