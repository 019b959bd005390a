//! Key slot operations on a device in DFU mode
//!
//! Devices that speak both cloud protocols keep one key pair per protocol and
//! a one-byte `transport` flag selecting the active one: `0xFF` (erased)
//! means the model's default protocol, anything else the alternative.

use std::io;
use std::path::{Path, PathBuf};

use crate::address::{self, LocalAddresses, ServerEndpoint};
use crate::error::{Error, Result};
use crate::spec::builtin::{ALT_PRIVATE_KEY, ALT_SERVER_KEY, PRIVATE_KEY, SERVER_KEY, TRANSPORT};
use crate::spec::{DeviceModel, KeyAlgorithm, ModelId, Protocol, Segment};
use crate::transfer::{DfuTransport, SegmentTransfer};

const FLAG_DEFAULT: u8 = 0xFF;
const FLAG_ALTERNATIVE: u8 = 0x00;

/// Server public key segment for a protocol
pub fn server_key_segment(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp => SERVER_KEY,
        Protocol::Udp => ALT_SERVER_KEY,
    }
}

/// Device private key segment for a protocol
pub fn private_key_segment(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp => PRIVATE_KEY,
        Protocol::Udp => ALT_PRIVATE_KEY,
    }
}

/// Key operations on one attached device
pub struct DeviceKeys<'a, T: DfuTransport + ?Sized> {
    transfer: SegmentTransfer<'a, T>,
    model: &'a DeviceModel,
}

impl<'a, T: DfuTransport + ?Sized> DeviceKeys<'a, T> {
    pub fn new(transfer: SegmentTransfer<'a, T>, model: ModelId) -> Result<Self> {
        let model = transfer.registry().lookup(model)?;
        Ok(Self { transfer, model })
    }

    pub fn model(&self) -> &DeviceModel {
        self.model
    }

    /// Protocol the device is currently configured for
    ///
    /// Only multi-protocol models with a transport flag are queried; all
    /// others use their default protocol.
    pub fn detect_protocol(&self) -> Result<Protocol> {
        let alternative = match self.model.alternative_protocol {
            Some(alt) if self.model.segment(TRANSPORT).is_some() => alt,
            _ => return Ok(self.model.default_protocol),
        };

        let flag = self.transfer.read_buffer(self.model.id, TRANSPORT)?;
        let protocol = match flag.first() {
            Some(&FLAG_DEFAULT) => self.model.default_protocol,
            _ => alternative,
        };
        log::debug!("Device transport flag {:02X?}: {}", flag.first(), protocol);
        Ok(protocol)
    }

    /// Use `requested` if given, otherwise the device's current protocol,
    /// and check the model supports it
    pub fn resolve_protocol(&self, requested: Option<Protocol>) -> Result<Protocol> {
        let protocol = match requested {
            Some(p) => p,
            None => self.detect_protocol()?,
        };
        if !self.model.supports(protocol) {
            return Err(Error::UnsupportedProtocol {
                model: self.model.id,
                protocol,
            });
        }
        Ok(protocol)
    }

    /// Switch the device's active protocol
    pub fn set_protocol(&self, protocol: Protocol) -> Result<()> {
        self.resolve_protocol(Some(protocol))?;
        let flag = if protocol == self.model.default_protocol {
            FLAG_DEFAULT
        } else {
            FLAG_ALTERNATIVE
        };
        self.transfer
            .write_buffer(self.model.id, TRANSPORT, &[flag], false)?;
        log::info!("Protocol changed to {}", protocol);
        Ok(())
    }

    fn segment(&self, name: &str) -> Result<&'a Segment> {
        self.transfer.registry().lookup_segment(self.model.id, name)
    }

    /// Algorithm of the private key used for `protocol`
    pub fn private_key_algorithm(&self, protocol: Protocol) -> Result<KeyAlgorithm> {
        Ok(self.segment(private_key_segment(protocol))?.alg)
    }

    /// Algorithm of the server public key used for `protocol`
    pub fn server_key_algorithm(&self, protocol: Protocol) -> Result<KeyAlgorithm> {
        Ok(self.segment(server_key_segment(protocol))?.alg)
    }

    /// Read the device private key into `dest`
    ///
    /// An existing `dest` is only replaced with `force`.
    pub fn save_private_key(&self, dest: &Path, protocol: Protocol, force: bool) -> Result<()> {
        if dest.exists() && !force {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", dest.display()),
            )));
        }
        self.transfer
            .read(self.model.id, private_key_segment(protocol), dest, false)
    }

    /// Write a private key, backing up the current one first
    ///
    /// The backup lands next to `key` as `backup_<alg>_<name>` and its path is
    /// returned.
    pub fn write_private_key(&self, key: &Path, protocol: Protocol, leave: bool) -> Result<PathBuf> {
        let segment = private_key_segment(protocol);
        let alg = self.segment(segment)?.alg;

        let name = key
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let backup = key.with_file_name(format!("backup_{}_{}", alg, name));
        self.save_private_key(&backup, protocol, true)?;
        log::info!("Backed up device key to {}", backup.display());

        self.transfer.write(self.model.id, segment, key, leave)?;
        Ok(backup)
    }

    /// Write a server public key, optionally pointing the device at `host`
    ///
    /// `host` may be `mine` to use this machine's address. Returns the image
    /// that was written.
    pub fn write_server_key(
        &self,
        key: &Path,
        host: Option<&str>,
        port: Option<u16>,
        protocol: Protocol,
        local: &dyn LocalAddresses,
    ) -> Result<PathBuf> {
        let name = server_key_segment(protocol);
        let segment = self.segment(name)?;

        let image = match host {
            Some(host) => {
                let host = address::resolve_host(host, local)?;
                address::build_addressed_key_image(key, &host, segment, port)?
            }
            None => address::pad_key_image(key, segment)?,
        };

        self.transfer.write(self.model.id, name, &image, false)?;
        Ok(image)
    }

    /// Server the device is configured to connect to over `protocol`
    pub fn read_server_address(&self, protocol: Protocol) -> Result<ServerEndpoint> {
        let name = server_key_segment(protocol);
        let segment = self.segment(name)?;
        let image = self.transfer.read_buffer(self.model.id, name)?;
        Ok(ServerEndpoint::decode(&image, segment, protocol))
    }
}
