//! iotprov-serial - Talking to devices in listening mode
//!
//! Devices in listening mode expose a USB serial console at 9600 baud.
//! This crate finds those consoles, runs scripted prompt/answer
//! conversations over them ([`SerialHandshake`]) and builds the Wi-Fi setup
//! conversation and the one-letter queries on top.
//!
//! Every conversation is written against `AsyncRead + AsyncWrite`, so the
//! same code drives a [`tokio_serial::SerialStream`] or an in-memory pipe.

#![warn(rust_2018_idioms)]

pub mod command;
pub mod error;
pub mod handshake;
pub mod port;
pub mod wifi;

pub use command::{firmware_version, identify, mac_address, DeviceIdentity, COMMAND_TIMEOUT};
pub use error::{Result, SerialError};
pub use handshake::{HandshakeStep, SerialHandshake};
pub use port::{find_serial_devices, match_ports, open, SerialDevice, UsbPort, BAUD_RATE};
pub use wifi::{DeviceFamily, FlowTimeouts, WifiCredentials, WifiProvisioning, WifiSecurity};
