//! Finding and opening devices in listening mode

use iotprov_core::spec::{DeviceRegistry, ModelId};
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialPortType, SerialStream, StopBits,
};

use crate::error::Result;
use crate::wifi::DeviceFamily;

/// Listening mode always runs at this rate
pub const BAUD_RATE: u32 = 9600;

/// A USB serial port as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbPort {
    pub name: String,
    pub vid: u16,
    pub pid: u16,
}

/// A known device attached in listening mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialDevice {
    pub port: String,
    /// DFU-mode identity of the matching model
    pub model: ModelId,
    pub product_name: String,
    pub family: DeviceFamily,
}

/// Pick out the ports whose USB ids belong to a known model
pub fn match_ports<I>(ports: I, registry: &DeviceRegistry) -> Vec<SerialDevice>
where
    I: IntoIterator<Item = UsbPort>,
{
    ports
        .into_iter()
        .filter_map(|port| {
            let Some(model) = registry.find_by_serial(port.vid, port.pid) else {
                log::trace!("Ignoring {} ({:04x}:{:04x})", port.name, port.vid, port.pid);
                return None;
            };
            Some(SerialDevice {
                port: port.name,
                model: model.id,
                product_name: model.product_name.clone(),
                family: DeviceFamily::of(model),
            })
        })
        .collect()
}

/// Enumerate attached devices in listening mode
pub fn find_serial_devices(registry: &DeviceRegistry) -> Result<Vec<SerialDevice>> {
    let ports = tokio_serial::available_ports()?
        .into_iter()
        .filter_map(|info| match info.port_type {
            SerialPortType::UsbPort(usb) => Some(UsbPort {
                name: info.port_name,
                vid: usb.vid,
                pid: usb.pid,
            }),
            _ => None,
        });

    let devices = match_ports(ports, registry);
    log::debug!("Found {} device(s) in listening mode", devices.len());
    Ok(devices)
}

/// Open a port at 9600 8N1 without flow control
pub fn open(path: &str) -> Result<SerialStream> {
    let stream = tokio_serial::new(path, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()?;

    log::info!("Opened serial port {} at {} baud", path, BAUD_RATE);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iotprov_core::spec::builtin;

    fn usb(name: &str, vid: u16, pid: u16) -> UsbPort {
        UsbPort {
            name: name.to_string(),
            vid,
            pid,
        }
    }

    #[test]
    fn test_match_ports() {
        let registry = DeviceRegistry::builtin();
        let ports = vec![
            usb("/dev/ttyACM0", 0x2b04, 0xc006),
            usb("/dev/ttyUSB0", 0x0403, 0x6001),
            usb("/dev/ttyACM1", 0x1d50, 0x607d),
        ];

        let found = match_ports(ports, &registry);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].port, "/dev/ttyACM0");
        assert_eq!(found[0].model, builtin::PHOTON);
        assert_eq!(found[0].family, DeviceFamily::Photon);
        assert_eq!(found[1].model, builtin::CORE);
        assert_eq!(found[1].family, DeviceFamily::Core);
    }

    #[test]
    fn test_match_ports_empty_registry() {
        let found = match_ports(vec![usb("/dev/ttyACM0", 0x2b04, 0xc006)], &DeviceRegistry::new());
        assert!(found.is_empty());
    }
}
