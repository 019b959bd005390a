//! Device models, flash segments and the registry that serves them

pub mod builtin;
mod file;
mod registry;
mod types;

pub use file::{parse_number, parse_overrides, ModelOverride, SpecFileError};
pub use registry::DeviceRegistry;
pub use types::{
    DeviceModel, ImageFormat, KeyAlgorithm, ModelId, Protocol, Segment, DEFAULT_ADDRESS_OFFSET,
};
