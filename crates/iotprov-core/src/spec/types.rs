//! Device model and flash segment types

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Address-record offset used when a segment does not set one
pub const DEFAULT_ADDRESS_OFFSET: u32 = 384;

/// USB vendor/product pair identifying a device model, written `vvvv:pppp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelId {
    pub vendor: u16,
    pub product: u16,
}

impl ModelId {
    pub const fn new(vendor: u16, product: u16) -> Self {
        Self { vendor, product }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor, self.product)
    }
}

impl FromStr for ModelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (vendor, product) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid model id '{}': expected vvvv:pppp", s))?;
        let parse = |part: &str| {
            u16::from_str_radix(part.trim(), 16)
                .map_err(|e| format!("Invalid model id '{}': {}", s, e))
        };
        Ok(Self::new(parse(vendor)?, parse(product)?))
    }
}

/// On-flash encoding of a segment's contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Der,
    #[default]
    None,
}

/// Key algorithm stored in a key segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    #[default]
    Rsa,
    Ec,
}

impl KeyAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa => "rsa",
            KeyAlgorithm::Ec => "ec",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloud transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }

    /// Algorithm of the device keys used with this protocol
    pub fn key_algorithm(self) -> KeyAlgorithm {
        match self {
            Protocol::Tcp => KeyAlgorithm::Rsa,
            Protocol::Udp => KeyAlgorithm::Ec,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(format!("Unknown protocol '{}' (expected tcp or udp)", other)),
        }
    }
}

/// A named flash region on a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    /// Flash offset
    pub address: u32,
    /// Byte count, when the segment has a fixed size
    pub size: Option<u32>,
    pub format: ImageFormat,
    /// DFU alternate setting
    pub alt: u8,
    pub alg: KeyAlgorithm,
    /// Offset of the server address record inside a key image
    pub address_offset: Option<u32>,
    /// Offset of the big-endian server port inside a key image
    pub port_offset: Option<u32>,
}

impl Segment {
    pub fn new(name: impl Into<String>, address: u32, alt: u8) -> Self {
        Self {
            name: name.into(),
            address,
            size: None,
            format: ImageFormat::None,
            alt,
            alg: KeyAlgorithm::Rsa,
            address_offset: None,
            port_offset: None,
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Mark the segment as a DER key slot with the given record offsets
    pub fn der_key(mut self, alg: KeyAlgorithm, address_offset: u32, port_offset: u32) -> Self {
        self.format = ImageFormat::Der;
        self.alg = alg;
        self.address_offset = Some(address_offset);
        self.port_offset = Some(port_offset);
        self
    }

    pub fn der(mut self, alg: KeyAlgorithm) -> Self {
        self.format = ImageFormat::Der;
        self.alg = alg;
        self
    }

    pub fn address_offset(&self) -> u32 {
        self.address_offset.unwrap_or(DEFAULT_ADDRESS_OFFSET)
    }

    /// Address argument handed to the programming transport
    pub fn transport_address(&self) -> String {
        match self.size {
            Some(size) => format!("0x{:08X}:{}", self.address, size),
            None => format!("0x{:08X}", self.address),
        }
    }
}

/// A device model and its flash layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceModel {
    pub id: ModelId,
    pub product_name: String,
    /// Platform id reported to the cloud
    pub product_id: Option<u16>,
    /// USB ids of the device when it enumerates as a serial port
    pub serial: Option<ModelId>,
    pub default_protocol: Protocol,
    pub alternative_protocol: Option<Protocol>,
    /// Ordered by alt setting, then address
    pub segments: Vec<Segment>,
}

impl DeviceModel {
    pub fn new(id: ModelId, product_name: impl Into<String>) -> Self {
        Self {
            id,
            product_name: product_name.into(),
            product_id: None,
            serial: None,
            default_protocol: Protocol::Tcp,
            alternative_protocol: None,
            segments: Vec::new(),
        }
    }

    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name == name)
    }

    pub fn sort_segments(&mut self) {
        self.segments.sort_by_key(|s| (s.alt, s.address));
    }

    pub fn supports(&self, protocol: Protocol) -> bool {
        self.default_protocol == protocol || self.alternative_protocol == Some(protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_id_round_trip() {
        let id: ModelId = "2b04:d006".parse().unwrap();
        assert_eq!(id, ModelId::new(0x2b04, 0xd006));
        assert_eq!(id.to_string(), "2b04:d006");
    }

    #[test]
    fn test_model_id_rejects_garbage() {
        assert!("2b04".parse::<ModelId>().is_err());
        assert!("zz:0001".parse::<ModelId>().is_err());
    }

    #[test]
    fn test_transport_address() {
        let sized = Segment::new("serverKey", 2082, 1).with_size(512);
        assert_eq!(sized.transport_address(), "0x00000822:512");

        let sizeless = Segment::new("userFirmware", 0x080A_0000, 0);
        assert_eq!(sizeless.transport_address(), "0x080A0000");
    }

    #[test]
    fn test_address_offset_default() {
        let seg = Segment::new("serverKey", 0x1000, 1).with_size(2048);
        assert_eq!(seg.address_offset(), 384);

        let seg = seg.der_key(KeyAlgorithm::Ec, 192, 258);
        assert_eq!(seg.address_offset(), 192);
    }
}
