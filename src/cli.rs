//! CLI argument parsing

use clap::{Parser, Subcommand};
use iotprov_core::spec::{ModelId, Protocol};
use iotprov_serial::{DeviceFamily, WifiSecurity};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "iotprov")]
#[command(author, version, about = "Provision IoT devices over DFU and serial", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// JSON file overriding or extending the built-in device specs
    #[arg(long, env = "IOTPROV_DEVICE_SPECS", global = true)]
    pub device_specs: Option<PathBuf>,

    /// Run dfu-util through sudo
    #[arg(long, global = true)]
    pub sudo: bool,

    /// DFU device to use when several are attached (vvvv:pppp)
    #[arg(short, long, global = true)]
    pub device: Option<ModelId>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List known device models and their segments
    Models,

    /// Devices in DFU mode
    #[command(subcommand)]
    Dfu(DfuCommands),

    /// Raw segment transfers
    #[command(subcommand)]
    Segment(SegmentCommands),

    /// Device and server keys
    #[command(subcommand)]
    Keys(KeyCommands),

    /// Devices in listening mode
    #[command(subcommand)]
    Serial(SerialCommands),
}

#[derive(Subcommand)]
pub enum DfuCommands {
    /// List attached devices in DFU mode
    List,
}

/// Segment and file shared by reads and writes
#[derive(clap::Args, Debug, Clone)]
pub struct SegmentArgs {
    /// Segment name (e.g. userFirmware, serverKey)
    #[arg(short, long)]
    pub segment: String,

    /// Image file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Leave DFU mode once the transfer is done
    #[arg(long)]
    pub leave: bool,
}

#[derive(Subcommand)]
pub enum SegmentCommands {
    /// Read a segment into a file
    Read(SegmentArgs),

    /// Write a file into a segment
    Write(SegmentArgs),
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Generate a device key pair, optionally writing it to the device
    New {
        /// Base name of the key files (<name>.pem, <name>.pub.pem, <name>.der)
        #[arg(short, long, default_value = "device")]
        file: PathBuf,

        /// Protocol the key is for (tcp uses RSA, udp uses EC)
        #[arg(short, long)]
        protocol: Option<Protocol>,

        /// Write the new private key to the attached device
        #[arg(long)]
        load: bool,
    },

    /// Write a device private key
    Load {
        /// Private key file (DER, or PEM converted with openssl)
        #[arg(short, long)]
        file: PathBuf,

        /// Protocol the key is for (defaults to the device's current one)
        #[arg(short, long)]
        protocol: Option<Protocol>,

        /// Leave DFU mode once the key is written
        #[arg(long)]
        leave: bool,
    },

    /// Save the device private key to a file
    Save {
        /// Destination file
        #[arg(short, long)]
        file: PathBuf,

        /// Protocol whose key to read (defaults to the device's current one)
        #[arg(short, long)]
        protocol: Option<Protocol>,

        /// Overwrite the destination if it exists
        #[arg(long)]
        force: bool,
    },

    /// Write a server public key, optionally with a custom server address
    Server {
        /// Server public key file (DER, or PEM converted with openssl)
        #[arg(short, long)]
        file: PathBuf,

        /// Server host name or IPv4 address ("mine" for this machine)
        #[arg(long)]
        host: Option<String>,

        /// Server port
        #[arg(long, requires = "host")]
        port: Option<u16>,

        /// Protocol the key is for (defaults to the device's current one)
        #[arg(short, long)]
        protocol: Option<Protocol>,
    },

    /// Show the server the device will connect to
    Address {
        /// Protocol to show (defaults to the device's current one)
        #[arg(short, long)]
        protocol: Option<Protocol>,
    },

    /// Show or change the cloud protocol
    Protocol {
        /// Switch the device to this protocol
        #[arg(long)]
        set: Option<Protocol>,
    },
}

#[derive(Subcommand)]
pub enum SerialCommands {
    /// List attached devices in listening mode
    List,

    /// Print the device id
    Identify {
        /// Serial port (defaults to the only attached device)
        #[arg(long)]
        port: Option<String>,
    },

    /// Print the Wi-Fi MAC address
    Mac {
        /// Serial port (defaults to the only attached device)
        #[arg(long)]
        port: Option<String>,

        /// Device family when the port is not a recognised device (core or photon)
        #[arg(long)]
        family: Option<DeviceFamily>,
    },

    /// Print the system firmware version
    Version {
        /// Serial port (defaults to the only attached device)
        #[arg(long)]
        port: Option<String>,
    },

    /// Configure Wi-Fi credentials
    Wifi {
        /// Serial port (defaults to the only attached device)
        #[arg(long)]
        port: Option<String>,

        /// Network name
        #[arg(long)]
        ssid: String,

        /// Security type (open, wep, wpa, wpa2 or 0-3)
        #[arg(long, default_value = "wpa2")]
        security: WifiSecurity,

        /// Network password
        #[arg(long)]
        password: Option<String>,

        /// Device family when the port is not a recognised device (core or photon)
        #[arg(long)]
        family: Option<DeviceFamily>,
    },
}
