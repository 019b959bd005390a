//! Server address records in key images
//!
//! A server key segment holds the DER public key followed by `0xFF` filler.
//! At a fixed offset inside the segment a small type-length-value record
//! names the server the device should connect to:
//!
//! | byte    | meaning                                  |
//! |---------|------------------------------------------|
//! | 0       | type: `0` IPv4, `1` domain name          |
//! | 1       | payload length (4 for IPv4)              |
//! | 2..     | 4 address octets, or the ASCII domain    |
//!
//! Segments with a port offset also carry the server port as a big-endian
//! `u16`; `0xFFFF` means the protocol default.

use std::fmt;
use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::spec::{Protocol, Segment};

const TYPE_IPV4: u8 = 0;
const TYPE_DOMAIN: u8 = 1;
const ERASED: u8 = 0xFF;

/// Host name that resolves to this machine's single IPv4 address
pub const LOCAL_HOST_ALIAS: &str = "mine";

pub const DEFAULT_TCP_HOST: &str = "device.spark.io";
pub const DEFAULT_UDP_HOST: &str = "udp.particle.io";
pub const DEFAULT_TCP_PORT: u16 = 5683;
pub const DEFAULT_UDP_PORT: u16 = 5684;

/// Server address stored in a key image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    Ipv4(Ipv4Addr),
    Domain(String),
}

impl ServerAddress {
    /// Classify a host string
    ///
    /// Anything made only of digits and dots is treated as an IPv4 address
    /// and must have four decimal octets. Leading zeros are accepted and
    /// read as decimal (`010.0.0.1` is 10.0.0.1).
    pub fn parse(host: &str) -> Result<Self> {
        if host.is_empty() {
            return Err(Error::InvalidAddress("empty host".to_string()));
        }
        if host.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return parse_dotted_quad(host)
                .map(ServerAddress::Ipv4)
                .ok_or_else(|| Error::InvalidAddress(host.to_string()));
        }
        if !host.is_ascii() || host.len() > usize::from(u8::MAX) {
            return Err(Error::InvalidAddress(host.to_string()));
        }
        Ok(ServerAddress::Domain(host.to_string()))
    }

    /// Encode as a type-length-value record
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ServerAddress::Ipv4(ip) => {
                let mut record = vec![TYPE_IPV4, 4];
                record.extend_from_slice(&ip.octets());
                record
            }
            ServerAddress::Domain(name) => {
                // Length fits: parse() caps domains at 255 bytes
                let mut record = vec![TYPE_DOMAIN, name.len() as u8];
                record.extend_from_slice(name.as_bytes());
                record
            }
        }
    }

    /// Decode the record at `offset`
    ///
    /// Returns `None` for an erased, empty, truncated or unknown record.
    pub fn decode(image: &[u8], offset: usize) -> Option<Self> {
        let header = image.get(offset..offset + 2)?;
        let (kind, len) = (header[0], usize::from(header[1]));
        if len == 0 {
            return None;
        }
        let payload = image.get(offset + 2..offset + 2 + len)?;

        match kind {
            TYPE_IPV4 if len == 4 => Some(ServerAddress::Ipv4(Ipv4Addr::new(
                payload[0], payload[1], payload[2], payload[3],
            ))),
            TYPE_DOMAIN => Some(ServerAddress::Domain(
                String::from_utf8_lossy(payload).into_owned(),
            )),
            _ => None,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerAddress::Ipv4(ip) => write!(f, "{}", ip),
            ServerAddress::Domain(name) => f.write_str(name),
        }
    }
}

/// Source of this machine's IPv4 addresses
pub trait LocalAddresses {
    fn ipv4_addresses(&self) -> io::Result<Vec<Ipv4Addr>>;
}

/// Non-loopback IPv4 addresses of the host's interfaces
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAddresses;

impl LocalAddresses for SystemAddresses {
    fn ipv4_addresses(&self) -> io::Result<Vec<Ipv4Addr>> {
        let mut addrs = Vec::new();
        for iface in if_addrs::get_if_addrs()? {
            if iface.is_loopback() {
                continue;
            }
            if let if_addrs::IfAddr::V4(v4) = iface.addr {
                if !addrs.contains(&v4.ip) {
                    addrs.push(v4.ip);
                }
            }
        }
        Ok(addrs)
    }
}

/// Resolve the `mine` alias to this machine's address
///
/// Any other host is returned unchanged. `mine` must match exactly one
/// address: picking one of several would silently point the device at the
/// wrong interface.
pub fn resolve_host(host: &str, local: &dyn LocalAddresses) -> Result<String> {
    if host != LOCAL_HOST_ALIAS {
        return Ok(host.to_string());
    }

    let addrs = local.ipv4_addresses()?;
    match addrs.as_slice() {
        [] => Err(Error::NoAddress),
        [ip] => {
            log::info!("Using local address {}", ip);
            Ok(ip.to_string())
        }
        _ => Err(Error::AmbiguousAddress(addrs)),
    }
}

fn parse_dotted_quad(host: &str) -> Option<Ipv4Addr> {
    let octets: Vec<u8> = host
        .split('.')
        .map(|part| part.parse().ok())
        .collect::<Option<_>>()?;
    let octets: [u8; 4] = octets.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

fn segment_size(segment: &Segment) -> Result<usize> {
    segment
        .size
        .map(|s| s as usize)
        .ok_or_else(|| Error::MissingSegmentSize {
            segment: segment.name.clone(),
        })
}

fn read_key(path: &Path, limit: usize) -> Result<Vec<u8>> {
    let key = fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })?;
    if key.len() > limit {
        return Err(Error::FileTooLarge {
            path: path.to_path_buf(),
            size: key.len() as u64,
            limit: limit as u64,
        });
    }
    Ok(key)
}

/// `<dir>/<stem><suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}", stem, suffix))
}

/// Lay out a key image that points the device at `host`
///
/// `host` must already be resolved (see [`resolve_host`]). The image is
/// written next to the key as `<stem>-<host>-<alg>.der` with dots in the host
/// replaced by underscores, and its path returned.
pub fn build_addressed_key_image(
    key_path: &Path,
    host: &str,
    segment: &Segment,
    port: Option<u16>,
) -> Result<PathBuf> {
    let address = ServerAddress::parse(host)?;
    let size = segment_size(segment)?;
    let key = read_key(key_path, size)?;

    let record = address.encode();
    let offset = segment.address_offset() as usize;
    let limit = size as u64;
    if offset + record.len() > size {
        return Err(Error::FileTooLarge {
            path: key_path.to_path_buf(),
            size: (offset + record.len()) as u64,
            limit,
        });
    }

    let mut image = vec![ERASED; size];
    image[..key.len()].copy_from_slice(&key);
    image[offset..offset + record.len()].copy_from_slice(&record);

    if let (Some(port), Some(port_offset)) = (port, segment.port_offset) {
        let port_offset = port_offset as usize;
        if port_offset + 2 > size {
            return Err(Error::FileTooLarge {
                path: key_path.to_path_buf(),
                size: (port_offset + 2) as u64,
                limit,
            });
        }
        image[port_offset..port_offset + 2].copy_from_slice(&port.to_be_bytes());
    }

    let out = sibling(
        key_path,
        &format!("-{}-{}.der", host.replace('.', "_"), segment.alg),
    );
    fs::write(&out, &image)?;
    log::debug!("Wrote {} ({} bytes) for {}", out.display(), image.len(), address);
    Ok(out)
}

/// Pad a key to its segment size with `0xFF`
///
/// Returns the key path itself when it already fills the segment, otherwise
/// the path of a `<stem>-padded.der` copy.
pub fn pad_key_image(key_path: &Path, segment: &Segment) -> Result<PathBuf> {
    let size = segment_size(segment)?;
    let key = read_key(key_path, size)?;
    if key.len() == size {
        return Ok(key_path.to_path_buf());
    }

    let mut image = vec![ERASED; size];
    image[..key.len()].copy_from_slice(&key);
    let out = sibling(key_path, "-padded.der");
    fs::write(&out, &image)?;
    Ok(out)
}

/// Server a device is configured to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl ServerEndpoint {
    /// Decode the endpoint from a server key image read off a device
    ///
    /// An erased or empty address record means the protocol's default cloud
    /// host; an erased port means the protocol's default port.
    pub fn decode(image: &[u8], segment: &Segment, protocol: Protocol) -> Self {
        let (default_host, default_port) = match protocol {
            Protocol::Tcp => (DEFAULT_TCP_HOST, DEFAULT_TCP_PORT),
            Protocol::Udp => (DEFAULT_UDP_HOST, DEFAULT_UDP_PORT),
        };

        let host = ServerAddress::decode(image, segment.address_offset() as usize)
            .map(|a| a.to_string())
            .unwrap_or_else(|| default_host.to_string());

        let port = segment
            .port_offset
            .and_then(|off| image.get(off as usize..off as usize + 2))
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .filter(|&p| p != u16::MAX)
            .unwrap_or(default_port);

        Self {
            host,
            port,
            protocol,
        }
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}
