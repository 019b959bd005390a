//! Listening-mode commands

use crate::cli::SerialCommands;
use iotprov_core::spec::DeviceRegistry;
use iotprov_serial::{
    find_serial_devices, firmware_version, identify, mac_address, open, DeviceFamily,
    SerialDevice, WifiCredentials, WifiProvisioning, COMMAND_TIMEOUT,
};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub async fn run(registry: &DeviceRegistry, command: SerialCommands) -> CmdResult {
    match command {
        SerialCommands::List => cmd_list(registry),
        SerialCommands::Identify { port } => {
            let (port, _) = select_port(registry, port, None)?;
            let identity = identify(open(&port)?, COMMAND_TIMEOUT).await?;
            println!("Device id: {}", identity.id);
            if let Some(imei) = identity.imei {
                println!("IMEI:      {}", imei);
            }
            if let Some(iccid) = identity.iccid {
                println!("ICCID:     {}", iccid);
            }
            Ok(())
        }
        SerialCommands::Mac { port, family } => {
            let (port, family) = select_port(registry, port, family)?;
            let mac = mac_address(open(&port)?, family, COMMAND_TIMEOUT).await?;
            println!("{}", mac);
            Ok(())
        }
        SerialCommands::Version { port } => {
            let (port, _) = select_port(registry, port, None)?;
            let version = firmware_version(open(&port)?, COMMAND_TIMEOUT).await?;
            println!("System firmware {}", version);
            Ok(())
        }
        SerialCommands::Wifi {
            port,
            ssid,
            security,
            password,
            family,
        } => {
            let (port, family) = select_port(registry, port, family)?;
            let credentials = WifiCredentials {
                ssid,
                password,
                security,
            };
            let pb =
                super::spinner(format!("Sending credentials for '{}'...", credentials.ssid))?;
            let result = WifiProvisioning::new(family)
                .run(open(&port)?, &credentials)
                .await;
            pb.finish_and_clear();
            result?;
            println!("Wi-Fi credentials accepted, the device will now connect");
            Ok(())
        }
    }
}

fn cmd_list(registry: &DeviceRegistry) -> CmdResult {
    let devices = find_serial_devices(registry)?;
    if devices.is_empty() {
        println!("No devices in listening mode found.");
        return Ok(());
    }

    println!("Devices in listening mode:");
    for device in devices {
        println!("  {:<16} {} ({})", device.port, device.product_name, device.model);
    }
    Ok(())
}

fn select_port(
    registry: &DeviceRegistry,
    port: Option<String>,
    family: Option<DeviceFamily>,
) -> Result<(String, DeviceFamily), Box<dyn std::error::Error>> {
    let devices = find_serial_devices(registry)?;
    Ok(pick_port(&devices, port, family)?)
}

/// Port to talk to and the family of the device behind it
///
/// Without an explicit port exactly one known device must be attached.
/// `family` overrides the detected family; a port that matches no known
/// device needs it, and falls back to Photon firmware with a warning.
fn pick_port(
    devices: &[SerialDevice],
    port: Option<String>,
    family: Option<DeviceFamily>,
) -> Result<(String, DeviceFamily), String> {
    if let Some(port) = port {
        let detected = devices.iter().find(|d| d.port == port).map(|d| d.family);
        let family = match (family, detected) {
            (Some(family), _) => family,
            (None, Some(detected)) => detected,
            (None, None) => {
                log::warn!(
                    "{} is not a known device; assuming Photon firmware (use --family to override)",
                    port
                );
                DeviceFamily::Photon
            }
        };
        return Ok((port, family));
    }

    match devices {
        [] => Err(
            "No devices in listening mode found (hold SETUP until the LED blinks blue)".to_string(),
        ),
        [device] => Ok((device.port.clone(), family.unwrap_or(device.family))),
        _ => {
            let ports: Vec<&str> = devices.iter().map(|d| d.port.as_str()).collect();
            Err(format!(
                "Multiple devices in listening mode ({}), choose one with --port",
                ports.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iotprov_core::spec::builtin;

    fn device(port: &str, family: DeviceFamily) -> SerialDevice {
        SerialDevice {
            port: port.to_string(),
            model: builtin::CORE,
            product_name: "Core".to_string(),
            family,
        }
    }

    #[test]
    fn test_pick_only_device() {
        let devices = [device("/dev/ttyACM0", DeviceFamily::Core)];
        assert_eq!(
            pick_port(&devices, None, None).unwrap(),
            ("/dev/ttyACM0".to_string(), DeviceFamily::Core)
        );
    }

    #[test]
    fn test_pick_requires_single_device() {
        assert!(pick_port(&[], None, None).is_err());

        let devices = [
            device("/dev/ttyACM0", DeviceFamily::Core),
            device("/dev/ttyACM1", DeviceFamily::Photon),
        ];
        let err = pick_port(&devices, None, None).unwrap_err();
        assert!(err.contains("/dev/ttyACM0, /dev/ttyACM1"));
    }

    #[test]
    fn test_explicit_port_uses_detected_family() {
        let devices = [
            device("/dev/ttyACM0", DeviceFamily::Photon),
            device("/dev/ttyACM1", DeviceFamily::Core),
        ];
        let (_, family) = pick_port(&devices, Some("/dev/ttyACM1".to_string()), None).unwrap();
        assert_eq!(family, DeviceFamily::Core);
    }

    #[test]
    fn test_unknown_port_family() {
        // Unrecognised adapter: Photon unless told otherwise
        let port = Some("/dev/ttyUSB3".to_string());
        assert_eq!(
            pick_port(&[], port.clone(), None).unwrap().1,
            DeviceFamily::Photon
        );
        assert_eq!(
            pick_port(&[], port, Some(DeviceFamily::Core)).unwrap().1,
            DeviceFamily::Core
        );
    }
}
