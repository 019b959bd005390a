//! JSON device-spec override files
//!
//! An override file is a JSON object keyed by model id (`"2b04:d006"`). Each
//! model entry is flat: a few metadata keys sit next to segment definitions,
//! and any key whose value is an object with an `address` is a segment.
//!
//! ```json
//! {
//!   "2b04:d006": {
//!     "productName": "Photon",
//!     "defaultProtocol": "tcp",
//!     "serial": { "vid": "2b04", "pid": "c006" },
//!     "serverKey": { "address": "2082", "size": 512, "format": "der", "alt": "1" },
//!     "userFirmware": { "address": "0x080A0000", "alt": 0 }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{ImageFormat, KeyAlgorithm, ModelId, Protocol, Segment};

/// Error type for override file parsing
#[derive(Debug, Error)]
pub enum SpecFileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// One model entry from an override file
///
/// Metadata left unset keeps the value of the model being overridden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelOverride {
    pub id: ModelId,
    pub product_name: Option<String>,
    pub product_id: Option<u16>,
    pub serial: Option<ModelId>,
    pub default_protocol: Option<Protocol>,
    pub alternative_protocol: Option<Protocol>,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SegmentEntry {
    #[serde(deserialize_with = "deserialize_hex_u32")]
    address: u32,
    #[serde(default, deserialize_with = "deserialize_opt_u32")]
    size: Option<u32>,
    #[serde(default)]
    format: ImageFormat,
    #[serde(default, deserialize_with = "deserialize_opt_u32")]
    alt: Option<u32>,
    #[serde(default)]
    alg: KeyAlgorithm,
    #[serde(default, deserialize_with = "deserialize_opt_u32")]
    address_offset: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_u32")]
    port_offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SerialEntry {
    vid: String,
    pid: String,
}

/// Load an override file from disk
pub fn load_file(path: &Path) -> Result<Vec<ModelOverride>, SpecFileError> {
    let contents = fs::read_to_string(path)?;
    parse_overrides(&contents)
}

/// Parse override JSON
///
/// Parsing is all-or-nothing: one malformed entry rejects the whole document.
pub fn parse_overrides(json: &str) -> Result<Vec<ModelOverride>, SpecFileError> {
    let root: BTreeMap<String, Map<String, Value>> = serde_json::from_str(json)?;

    root.into_iter()
        .map(|(key, entry)| {
            let id: ModelId = key.parse().map_err(SpecFileError::Validation)?;
            parse_model(id, entry)
        })
        .collect()
}

fn parse_model(id: ModelId, entry: Map<String, Value>) -> Result<ModelOverride, SpecFileError> {
    let mut model = ModelOverride {
        id,
        product_name: None,
        product_id: None,
        serial: None,
        default_protocol: None,
        alternative_protocol: None,
        segments: Vec::new(),
    };

    for (key, value) in entry {
        match key.as_str() {
            "productName" => model.product_name = Some(serde_json::from_value(value)?),
            "productId" => {
                let n = value_to_u32(&value).map_err(|e| invalid(id, &key, e))?;
                let n = u16::try_from(n).map_err(|e| invalid(id, &key, e.to_string()))?;
                model.product_id = Some(n);
            }
            "defaultProtocol" => model.default_protocol = Some(serde_json::from_value(value)?),
            "alternativeProtocol" => {
                model.alternative_protocol = Some(serde_json::from_value(value)?)
            }
            "serial" => {
                let serial: SerialEntry = serde_json::from_value(value)?;
                let serial = format!("{}:{}", serial.vid, serial.pid)
                    .parse()
                    .map_err(|e| invalid(id, &key, e))?;
                model.serial = Some(serial);
            }
            _ => {
                if value.get("address").is_some() {
                    let segment: SegmentEntry = serde_json::from_value(value)?;
                    model.segments.push(segment.into_segment(id, key)?);
                } else {
                    log::debug!("{}: ignoring key '{}'", id, key);
                }
            }
        }
    }

    if model.segments.is_empty() {
        return Err(SpecFileError::Validation(format!(
            "{}: override defines no segments",
            id
        )));
    }
    model.segments.sort_by_key(|s| (s.alt, s.address));

    Ok(model)
}

impl SegmentEntry {
    fn into_segment(self, id: ModelId, name: String) -> Result<Segment, SpecFileError> {
        let alt = self.alt.unwrap_or(0);
        let alt = u8::try_from(alt)
            .map_err(|_| invalid(id, &name, format!("alt {} out of range", alt)))?;
        if self.size == Some(0) {
            return Err(invalid(id, &name, "size must be non-zero"));
        }

        Ok(Segment {
            name,
            address: self.address,
            size: self.size,
            format: self.format,
            alt,
            alg: self.alg,
            address_offset: self.address_offset,
            port_offset: self.port_offset,
        })
    }
}

fn invalid(id: ModelId, key: &str, msg: impl std::fmt::Display) -> SpecFileError {
    SpecFileError::Validation(format!("{} '{}': {}", id, key, msg))
}

fn value_to_u32(value: &Value) -> Result<u32, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| format!("invalid number: {}", n)),
        Value::String(s) => parse_number(s),
        other => Err(format!("expected number, got {}", other)),
    }
}

/// Deserialize a u32 from either a JSON number or a string (hex or decimal)
fn deserialize_hex_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_u32(&value).map_err(serde::de::Error::custom)
}

fn deserialize_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_hex_u32(deserializer).map(Some)
}

/// Parse a number that can be hex (0x...) or decimal
pub fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}
