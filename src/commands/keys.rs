//! Key and server address commands

use crate::cli::KeyCommands;
use iotprov_core::address::SystemAddresses;
use iotprov_core::crypto::{der_key_file, generate_key_pair, KeyKind, KeyPair, KeyTool};
use iotprov_core::keys::DeviceKeys;
use iotprov_core::spec::{DeviceRegistry, ModelId};
use iotprov_core::transfer::{discover, DfuTransport, SegmentTransfer, DISCOVERY_TIMEOUT};

pub fn run<T: DfuTransport + ?Sized, K: KeyTool + ?Sized>(
    transport: &T,
    tool: &K,
    registry: &DeviceRegistry,
    select: Option<ModelId>,
    command: KeyCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    // Generating without loading needs no device
    if let KeyCommands::New {
        file,
        protocol,
        load: false,
    } = &command
    {
        let alg = protocol.unwrap_or_default().key_algorithm();
        print_key_pair(&generate_key_pair(tool, file, alg)?);
        return Ok(());
    }

    let model = discover(transport, registry, DISCOVERY_TIMEOUT, select)?;
    let keys = DeviceKeys::new(SegmentTransfer::new(registry, transport), model)?;
    log::info!("Using {} ({})", keys.model().product_name, model);

    match command {
        KeyCommands::New { file, protocol, .. } => {
            let protocol = keys.resolve_protocol(protocol)?;
            let pair = generate_key_pair(tool, &file, keys.private_key_algorithm(protocol)?)?;
            print_key_pair(&pair);

            let pb = super::spinner(format!("Writing {} private key...", protocol))?;
            let result = keys.write_private_key(&pair.private_der, protocol, false);
            pb.finish_and_clear();
            let backup = result?;
            println!("Previous key saved to {}", backup.display());
            println!("New private key written");
        }
        KeyCommands::Load {
            file,
            protocol,
            leave,
        } => {
            let protocol = keys.resolve_protocol(protocol)?;
            let alg = keys.private_key_algorithm(protocol)?;
            let file = der_key_file(tool, &file, KeyKind::Private, alg)?;
            let pb = super::spinner(format!("Writing {} private key...", protocol))?;
            let result = keys.write_private_key(&file, protocol, leave);
            pb.finish_and_clear();
            let backup = result?;
            println!("Previous key saved to {}", backup.display());
            println!("Private key written");
        }
        KeyCommands::Save {
            file,
            protocol,
            force,
        } => {
            let protocol = keys.resolve_protocol(protocol)?;
            keys.save_private_key(&file, protocol, force)?;
            println!(
                "Saved {} private key ({}) to {}",
                protocol,
                keys.private_key_algorithm(protocol)?,
                file.display()
            );
        }
        KeyCommands::Server {
            file,
            host,
            port,
            protocol,
        } => {
            let protocol = keys.resolve_protocol(protocol)?;
            let alg = keys.server_key_algorithm(protocol)?;
            let file = der_key_file(tool, &file, KeyKind::Public, alg)?;
            let pb = super::spinner(format!("Writing {} server key...", protocol))?;
            let result =
                keys.write_server_key(&file, host.as_deref(), port, protocol, &SystemAddresses);
            pb.finish_and_clear();
            let image = result?;
            println!("Server key written from {}", image.display());
        }
        KeyCommands::Address { protocol } => {
            let protocol = keys.resolve_protocol(protocol)?;
            let endpoint = keys.read_server_address(protocol)?;
            println!("{}", endpoint);
        }
        KeyCommands::Protocol { set } => match set {
            Some(protocol) => {
                keys.set_protocol(protocol)?;
                println!("Protocol set to {}", protocol);
            }
            None => {
                let current = keys.detect_protocol()?;
                let model = keys.model();
                match model.alternative_protocol {
                    Some(alt) => println!(
                        "{} (supports {} and {})",
                        current, model.default_protocol, alt
                    ),
                    None => println!("{}", current),
                }
            }
        },
    }
    Ok(())
}

fn print_key_pair(pair: &KeyPair) {
    println!("Private key: {}", pair.private_pem.display());
    println!("Public key:  {}", pair.public_pem.display());
    println!("Device key:  {}", pair.private_der.display());
}
