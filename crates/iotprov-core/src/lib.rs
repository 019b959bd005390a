//! iotprov-core - Device specs and DFU provisioning
//!
//! This crate knows the flash layout of each supported device model and
//! moves images in and out of named segments through a DFU transport. It
//! also lays out server key images carrying a custom server address, and
//! generates and converts key files through an external key tool.
//!
//! # Example
//!
//! ```ignore
//! use iotprov_core::spec::DeviceRegistry;
//! use iotprov_core::transfer::{discover, DfuUtil, SegmentTransfer, DISCOVERY_TIMEOUT};
//!
//! let registry = DeviceRegistry::builtin();
//! let dfu = DfuUtil::default();
//! let model = discover(&dfu, &registry, DISCOVERY_TIMEOUT, None)?;
//! SegmentTransfer::new(&registry, &dfu).write(model, "userFirmware", "app.bin".as_ref(), true)?;
//! ```

#![warn(rust_2018_idioms)]

pub mod address;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod spec;
pub mod transfer;

pub use error::{Error, ErrorKind, Result};
