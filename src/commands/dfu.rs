//! DFU device listing

use iotprov_core::spec::DeviceRegistry;
use iotprov_core::transfer::{list_devices, DfuTransport, DISCOVERY_TIMEOUT};

pub fn cmd_list<T: DfuTransport + ?Sized>(
    transport: &T,
    registry: &DeviceRegistry,
) -> Result<(), Box<dyn std::error::Error>> {
    let devices = list_devices(transport, registry, DISCOVERY_TIMEOUT)?;

    if devices.is_empty() {
        println!("No devices in DFU mode found.");
        return Ok(());
    }

    println!("Devices in DFU mode:");
    for id in devices {
        // list_devices only returns ids the registry knows
        let name = registry
            .lookup(id)
            .map(|m| m.product_name.as_str())
            .unwrap_or("unknown");
        println!("  {}  {}", id, name);
    }
    Ok(())
}
