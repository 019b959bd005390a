//! CLI command implementations
//!
//! DFU-mode commands (`dfu`, `segment`, `keys`) find the device with
//! [`discover`](iotprov_core::transfer::discover) and drive it through a
//! [`DfuTransport`](iotprov_core::transfer::DfuTransport). Listening-mode
//! commands (`serial`) are async and run on a single-threaded runtime.

pub mod dfu;
pub mod keys;
mod list;
pub mod segment;
pub mod serial;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub use list::list_models;

/// Spinner shown while an external transfer runs
pub(crate) fn spinner(
    message: impl Into<String>,
) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}
