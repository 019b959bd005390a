//! Named segment transfers
//!
//! [`SegmentTransfer`] resolves a segment name against the device registry
//! and hands the resulting address to a [`DfuTransport`]. Every check that
//! can fail locally (unknown model or segment, missing or oversized file)
//! runs before the transport is touched.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::transport::{DfuTransport, TransportError};
use crate::error::{Error, Result};
use crate::spec::{DeviceRegistry, ModelId, Segment};

/// Default time allowed for device enumeration
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(6);

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device flash to local file
    Read,
    /// Local file to device flash
    Write,
}

/// One segment transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub model: ModelId,
    pub segment: String,
    pub direction: Direction,
    pub path: PathBuf,
    /// Leave DFU mode and start the firmware once the transfer is done
    pub leave: bool,
}

/// List attached DFU devices that have an entry in the registry
pub fn list_devices<T: DfuTransport + ?Sized>(
    transport: &T,
    registry: &DeviceRegistry,
    timeout: Duration,
) -> Result<Vec<ModelId>> {
    let found = transport
        .enumerate(timeout)
        .map_err(|e| Error::DeviceNotFound { message: e.message })?;

    Ok(found
        .into_iter()
        .filter(|id| {
            let known = registry.contains(*id);
            if !known {
                log::debug!("Ignoring DFU device {} with no device specs", id);
            }
            known
        })
        .collect())
}

/// Find the one attached device to operate on
///
/// With `select` set, that model must be attached. Otherwise exactly one
/// known device must be present.
pub fn discover<T: DfuTransport + ?Sized>(
    transport: &T,
    registry: &DeviceRegistry,
    timeout: Duration,
    select: Option<ModelId>,
) -> Result<ModelId> {
    let devices = list_devices(transport, registry, timeout)?;

    let id = match (select, devices.as_slice()) {
        (Some(id), found) if found.contains(&id) => id,
        (Some(id), _) => {
            return Err(Error::DeviceNotFound {
                message: format!("{} is not attached in DFU mode", id),
            })
        }
        (None, [id]) => *id,
        (None, []) => {
            return Err(Error::DeviceNotFound {
                message: "no DFU device found".to_string(),
            })
        }
        (None, found) => {
            return Err(Error::DeviceNotFound {
                message: format!(
                    "{} DFU devices attached ({}); select one",
                    found.len(),
                    found
                        .iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })
        }
    };

    log::info!("Found DFU device {}", id);
    Ok(id)
}

/// Reads and writes named segments through a transport
pub struct SegmentTransfer<'a, T: DfuTransport + ?Sized> {
    registry: &'a DeviceRegistry,
    transport: &'a T,
}

impl<'a, T: DfuTransport + ?Sized> SegmentTransfer<'a, T> {
    pub fn new(registry: &'a DeviceRegistry, transport: &'a T) -> Self {
        Self {
            registry,
            transport,
        }
    }

    pub fn registry(&self) -> &'a DeviceRegistry {
        self.registry
    }

    pub fn execute(&self, request: &TransferRequest) -> Result<()> {
        match request.direction {
            Direction::Read => self.read(
                request.model,
                &request.segment,
                &request.path,
                request.leave,
            ),
            Direction::Write => self.write(
                request.model,
                &request.segment,
                &request.path,
                request.leave,
            ),
        }
    }

    /// Write a file to a segment
    ///
    /// An odd-length file is first padded on disk with one zero byte, unless
    /// that byte would fall past the end of a sized segment.
    pub fn write(&self, model: ModelId, segment: &str, path: &Path, leave: bool) -> Result<()> {
        let segment = self.registry.lookup_segment(model, segment)?;

        let metadata = fs::metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        let len = metadata.len();
        if let Some(limit) = segment.size {
            if len > u64::from(limit) {
                return Err(Error::FileTooLarge {
                    path: path.to_path_buf(),
                    size: len,
                    limit: u64::from(limit),
                });
            }
        }

        let padded = padded_len(len, segment.size);
        if padded > len {
            log::debug!("Padding {} to {} bytes", path.display(), padded);
            OpenOptions::new().append(true).open(path)?.write_all(&[0])?;
        }

        log::info!(
            "Writing {} to {} on {} ({})",
            path.display(),
            segment.name,
            model,
            segment.transport_address()
        );
        let output = self
            .transport
            .write(model, segment.alt, &segment.transport_address(), path, leave)
            .map_err(transport_failure)?;
        log::debug!("{}", output.trim_end());
        Ok(())
    }

    /// Read a segment into a file
    pub fn read(&self, model: ModelId, segment: &str, dest: &Path, leave: bool) -> Result<()> {
        let segment = self.registry.lookup_segment(model, segment)?;
        self.read_segment(model, segment, dest, leave)
    }

    /// Read a segment into memory
    pub fn read_buffer(&self, model: ModelId, segment: &str) -> Result<Vec<u8>> {
        let segment = self.registry.lookup_segment(model, segment)?;
        let temp = tempfile::Builder::new()
            .prefix("iotprov-")
            .suffix(".bin")
            .tempfile()?;
        self.read_segment(model, segment, temp.path(), false)?;
        Ok(fs::read(temp.path())?)
    }

    /// Write bytes to a segment through a temporary file
    pub fn write_buffer(
        &self,
        model: ModelId,
        segment: &str,
        data: &[u8],
        leave: bool,
    ) -> Result<()> {
        self.registry.lookup_segment(model, segment)?;
        let mut temp = tempfile::Builder::new()
            .prefix("iotprov-")
            .suffix(".bin")
            .tempfile()?;
        temp.write_all(data)?;
        temp.flush()?;
        self.write(model, segment, temp.path(), leave)
    }

    fn read_segment(
        &self,
        model: ModelId,
        segment: &Segment,
        dest: &Path,
        leave: bool,
    ) -> Result<()> {
        log::info!(
            "Reading {} from {} ({}) into {}",
            segment.name,
            model,
            segment.transport_address(),
            dest.display()
        );
        let output = self
            .transport
            .read(model, segment.alt, &segment.transport_address(), dest, leave)
            .map_err(transport_failure)?;
        log::debug!("{}", output.trim_end());
        Ok(())
    }
}

fn transport_failure(e: TransportError) -> Error {
    Error::transport(e.message)
}

/// DFU writes must be an even number of bytes, within the segment
fn padded_len(len: u64, limit: Option<u32>) -> u64 {
    let even = len + len % 2;
    match limit {
        Some(limit) if even > u64::from(limit) => len,
        _ => even,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::spec::builtin::{ELECTRON, PHOTON, SERVER_KEY, TRANSPORT, USER_FIRMWARE};
    use crate::spec::DeviceModel;
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Call {
        write: bool,
        device: ModelId,
        alt: u8,
        address: String,
        path: PathBuf,
        leave: bool,
    }

    /// Transport that records calls and serves reads from a fixed buffer
    #[derive(Default)]
    struct MockTransport {
        attached: Vec<ModelId>,
        contents: Vec<u8>,
        fail: Option<String>,
        calls: RefCell<Vec<Call>>,
        written: RefCell<Vec<Vec<u8>>>,
    }

    impl MockTransport {
        fn record(
            &self,
            write: bool,
            device: ModelId,
            alt: u8,
            address: &str,
            path: &Path,
            leave: bool,
        ) {
            self.calls.borrow_mut().push(Call {
                write,
                device,
                alt,
                address: address.to_string(),
                path: path.to_path_buf(),
                leave,
            });
        }
    }

    impl DfuTransport for MockTransport {
        fn enumerate(
            &self,
            _timeout: Duration,
        ) -> std::result::Result<Vec<ModelId>, TransportError> {
            Ok(self.attached.clone())
        }

        fn read(
            &self,
            device: ModelId,
            alt: u8,
            address: &str,
            dest: &Path,
            leave: bool,
        ) -> std::result::Result<String, TransportError> {
            self.record(false, device, alt, address, dest, leave);
            if let Some(msg) = &self.fail {
                return Err(TransportError::new(msg.clone()));
            }
            fs::write(dest, &self.contents).map_err(|e| TransportError::new(e.to_string()))?;
            Ok("Upload done.".to_string())
        }

        fn write(
            &self,
            device: ModelId,
            alt: u8,
            address: &str,
            src: &Path,
            leave: bool,
        ) -> std::result::Result<String, TransportError> {
            self.record(true, device, alt, address, src, leave);
            if let Some(msg) = &self.fail {
                return Err(TransportError::new(msg.clone()));
            }
            let data = fs::read(src).map_err(|e| TransportError::new(e.to_string()))?;
            self.written.borrow_mut().push(data);
            Ok("Download done.".to_string())
        }
    }

    fn temp_file(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_unknown_segment_makes_no_transport_calls() {
        let registry = DeviceRegistry::builtin();
        let transport = MockTransport::default();
        let transfer = SegmentTransfer::new(&registry, &transport);
        let dir = tempfile::tempdir().unwrap();
        let path = temp_file(&dir, "fw.bin", &[1, 2, 3]);

        let err = transfer.write(PHOTON, "bootloader", &path, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SegmentUndefined);
        let err = transfer.read(PHOTON, "bootloader", &path, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SegmentUndefined);

        assert!(transport.calls.borrow().is_empty());
        // Not padded either
        assert_eq!(fs::read(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_model() {
        let registry = DeviceRegistry::builtin();
        let transport = MockTransport::default();
        let transfer = SegmentTransfer::new(&registry, &transport);

        let err = transfer
            .read(ModelId::new(0xdead, 0xbeef), USER_FIRMWARE, Path::new("x"), false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDeviceSpec);
        assert!(transport.calls.borrow().is_empty());
    }

    #[test]
    fn test_write_pads_odd_file() {
        let registry = DeviceRegistry::builtin();
        let transport = MockTransport::default();
        let transfer = SegmentTransfer::new(&registry, &transport);
        let dir = tempfile::tempdir().unwrap();
        let path = temp_file(&dir, "fw.bin", &[0xAA; 7]);

        transfer.write(PHOTON, USER_FIRMWARE, &path, true).unwrap();

        let on_disk = fs::read(&path).unwrap();
        assert_eq!(on_disk.len(), 8);
        assert_eq!(on_disk[7], 0x00);
        assert_eq!(transport.written.borrow()[0], on_disk);

        let calls = transport.calls.borrow();
        assert_eq!(
            calls[0],
            Call {
                write: true,
                device: PHOTON,
                alt: 0,
                address: "0x080A0000".to_string(),
                path: path.clone(),
                leave: true,
            }
        );
    }

    #[test]
    fn test_write_leaves_even_file() {
        let registry = DeviceRegistry::builtin();
        let transport = MockTransport::default();
        let transfer = SegmentTransfer::new(&registry, &transport);
        let dir = tempfile::tempdir().unwrap();
        let path = temp_file(&dir, "fw.bin", &[0xAA; 6]);

        transfer.write(PHOTON, USER_FIRMWARE, &path, false).unwrap();
        assert_eq!(fs::read(&path).unwrap(), [0xAA; 6]);
    }

    #[test]
    fn test_padding_never_overruns_segment() {
        let id = ModelId::new(0x1234, 0x0001);
        let mut model = DeviceModel::new(id, "Odd");
        model.segments = vec![Segment::new(TRANSPORT, 0x0BA1, 1).with_size(3)];
        let registry = DeviceRegistry::from_models([model]);
        let transport = MockTransport::default();
        let transfer = SegmentTransfer::new(&registry, &transport);
        let dir = tempfile::tempdir().unwrap();

        // Room for the pad byte
        let short = temp_file(&dir, "short.bin", &[0x01]);
        transfer.write(id, TRANSPORT, &short, false).unwrap();
        assert_eq!(fs::read(&short).unwrap(), [0x01, 0x00]);

        // Already segment-sized: written as is
        let full = temp_file(&dir, "full.bin", &[0x01, 0x02, 0x03]);
        transfer.write(id, TRANSPORT, &full, false).unwrap();
        assert_eq!(fs::read(&full).unwrap(), [0x01, 0x02, 0x03]);

        for written in transport.written.borrow().iter() {
            assert!(written.len() <= 3);
        }
    }

    #[test]
    fn test_padded_len() {
        assert_eq!(padded_len(7, None), 8);
        assert_eq!(padded_len(6, None), 6);
        assert_eq!(padded_len(1, Some(1)), 1);
        assert_eq!(padded_len(511, Some(512)), 512);
        assert_eq!(padded_len(0, Some(0)), 0);
    }

    #[test]
    fn test_write_missing_file() {
        let registry = DeviceRegistry::builtin();
        let transport = MockTransport::default();
        let transfer = SegmentTransfer::new(&registry, &transport);
        let dir = tempfile::tempdir().unwrap();

        let err = transfer
            .write(PHOTON, USER_FIRMWARE, &dir.path().join("nope.bin"), false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert!(transport.calls.borrow().is_empty());
    }

    #[test]
    fn test_write_too_large() {
        let registry = DeviceRegistry::builtin();
        let transport = MockTransport::default();
        let transfer = SegmentTransfer::new(&registry, &transport);
        let dir = tempfile::tempdir().unwrap();
        let path = temp_file(&dir, "key.der", &[0u8; 513]);

        let err = transfer.write(PHOTON, SERVER_KEY, &path, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileTooLarge);
        assert!(transport.calls.borrow().is_empty());
    }

    #[test]
    fn test_read_sized_segment() {
        let registry = DeviceRegistry::builtin();
        let transport = MockTransport {
            contents: vec![0x30; 512],
            ..Default::default()
        };
        let transfer = SegmentTransfer::new(&registry, &transport);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("server.der");

        transfer
            .execute(&TransferRequest {
                model: ELECTRON,
                segment: SERVER_KEY.to_string(),
                direction: Direction::Read,
                path: dest.clone(),
                leave: false,
            })
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap().len(), 512);
        let calls = transport.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].write);
        assert_eq!(calls[0].alt, 1);
        assert_eq!(calls[0].address, "0x00000822:512");
    }

    #[test]
    fn test_read_buffer() {
        let registry = DeviceRegistry::builtin();
        let transport = MockTransport {
            contents: vec![0xFF],
            ..Default::default()
        };
        let transfer = SegmentTransfer::new(&registry, &transport);

        assert_eq!(transfer.read_buffer(ELECTRON, "transport").unwrap(), [0xFF]);
    }

    #[test]
    fn test_write_buffer() {
        let registry = DeviceRegistry::builtin();
        let transport = MockTransport::default();
        let transfer = SegmentTransfer::new(&registry, &transport);

        transfer.write_buffer(ELECTRON, TRANSPORT, &[0x00], false).unwrap();

        let size = registry.lookup_segment(ELECTRON, TRANSPORT).unwrap().size;
        let written = transport.written.borrow();
        assert_eq!(written[0], [0x00]);
        assert!(written[0].len() as u64 <= u64::from(size.unwrap()));
        assert_eq!(transport.calls.borrow()[0].address, "0x00000BA1:1");
    }

    #[test]
    fn test_transport_failure_keeps_message() {
        let registry = DeviceRegistry::builtin();
        let transport = MockTransport {
            fail: Some("dfu-util: Cannot open DFU device 2b04:d006".to_string()),
            ..Default::default()
        };
        let transfer = SegmentTransfer::new(&registry, &transport);
        let dir = tempfile::tempdir().unwrap();
        let path = temp_file(&dir, "fw.bin", &[0u8; 4]);

        let err = transfer.write(PHOTON, USER_FIRMWARE, &path, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert!(err.to_string().contains("Cannot open DFU device"));
        // No retry
        assert_eq!(transport.calls.borrow().len(), 1);
    }

    #[test]
    fn test_discover() {
        let registry = DeviceRegistry::builtin();
        let unknown = ModelId::new(0x05ac, 0x8290);

        let transport = MockTransport {
            attached: vec![unknown, PHOTON],
            ..Default::default()
        };
        assert_eq!(
            discover(&transport, &registry, DISCOVERY_TIMEOUT, None).unwrap(),
            PHOTON
        );

        let transport = MockTransport {
            attached: vec![unknown],
            ..Default::default()
        };
        let err = discover(&transport, &registry, DISCOVERY_TIMEOUT, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
    }

    #[test]
    fn test_discover_multiple() {
        let registry = DeviceRegistry::builtin();
        let transport = MockTransport {
            attached: vec![PHOTON, ELECTRON],
            ..Default::default()
        };

        let err = discover(&transport, &registry, DISCOVERY_TIMEOUT, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
        assert_eq!(
            discover(&transport, &registry, DISCOVERY_TIMEOUT, Some(ELECTRON)).unwrap(),
            ELECTRON
        );
    }
}
