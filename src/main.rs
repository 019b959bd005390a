//! iotprov - Provision IoT devices over DFU and serial
//!
//! # Architecture
//!
//! Two device modes are handled:
//! - **DFU mode** - Flash segments (firmware, keys, the protocol flag) are
//!   read and written through `dfu-util`, addressed by the per-model segment
//!   table in the device registry
//! - **Listening mode** - The device exposes a serial console that answers
//!   one-letter queries and walks through Wi-Fi setup prompts
//!
//! Key files are generated and converted from PEM with `openssl`.
//!
//! The registry starts from the built-in models and can be overridden with a
//! JSON file (`--device-specs` or `IOTPROV_DEVICE_SPECS`).

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, DfuCommands, SegmentCommands};
use iotprov_core::crypto::OpenSsl;
use iotprov_core::spec::{builtin, DeviceRegistry};
use iotprov_core::transfer::{DfuUtil, DfuUtilConfig, Direction};
use iotprov_core::ErrorKind;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let registry = DeviceRegistry::load(builtin::models(), cli.device_specs.as_deref());
    log::info!("Loaded {} device models", registry.len());

    let dfu = DfuUtil::new(DfuUtilConfig {
        use_sudo: cli.sudo,
        ..Default::default()
    });

    let result = match cli.command {
        Commands::Models => {
            commands::list_models(&registry);
            Ok(())
        }
        Commands::Dfu(DfuCommands::List) => commands::dfu::cmd_list(&dfu, &registry),
        Commands::Segment(subcmd) => {
            let (direction, args) = match subcmd {
                SegmentCommands::Read(args) => (Direction::Read, args),
                SegmentCommands::Write(args) => (Direction::Write, args),
            };
            commands::segment::cmd_transfer(&dfu, &registry, cli.device, direction, &args)
        }
        Commands::Keys(subcmd) => {
            commands::keys::run(&dfu, &OpenSsl::default(), &registry, cli.device, subcmd)
        }
        Commands::Serial(subcmd) => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(commands::serial::run(&registry, subcmd)),
    };

    if let Err(e) = &result {
        if is_missing_device(e.as_ref()) {
            eprintln!("Make sure the device is connected over USB and in DFU mode.");
            eprintln!("Hold MODE, tap RESET, and release MODE once the LED blinks yellow.");
        }
    }

    result
}

fn is_missing_device(e: &(dyn std::error::Error + 'static)) -> bool {
    e.downcast_ref::<iotprov_core::Error>()
        .is_some_and(|e| e.kind() == ErrorKind::DeviceNotFound)
}
