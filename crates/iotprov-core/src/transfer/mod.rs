//! Segment transfers over a DFU programming transport

mod dfu_util;
mod segment;
mod transport;

pub use dfu_util::{parse_device_list, DfuUtil, DfuUtilConfig};
pub use segment::{
    discover, list_devices, Direction, SegmentTransfer, TransferRequest, DISCOVERY_TIMEOUT,
};
pub use transport::{DfuTransport, TransportError};
