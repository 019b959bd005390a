//! Built-in device table
//!
//! Flash layouts of the supported device models. Addresses for key slots on
//! the STM32F2xx-based models are offsets into the DCT (alt setting 1), which
//! is why they are small decimal numbers rather than mapped flash addresses.

use super::types::{DeviceModel, KeyAlgorithm, ModelId, Protocol, Segment};

pub const SERVER_KEY: &str = "serverKey";
pub const PRIVATE_KEY: &str = "privateKey";
pub const ALT_SERVER_KEY: &str = "altServerKey";
pub const ALT_PRIVATE_KEY: &str = "altPrivateKey";
pub const TRANSPORT: &str = "transport";
pub const FACTORY_RESET: &str = "factoryReset";
pub const USER_FIRMWARE: &str = "userFirmware";
pub const SYSTEM_FIRMWARE_ONE: &str = "systemFirmwareOne";
pub const SYSTEM_FIRMWARE_TWO: &str = "systemFirmwareTwo";
pub const SYSTEM_FIRMWARE_THREE: &str = "systemFirmwareThree";

pub const CORE: ModelId = ModelId::new(0x1d50, 0x607f);
pub const PHOTON: ModelId = ModelId::new(0x2b04, 0xd006);
pub const P1: ModelId = ModelId::new(0x2b04, 0xd008);
pub const ELECTRON: ModelId = ModelId::new(0x2b04, 0xd00a);
pub const DUO: ModelId = ModelId::new(0x2b04, 0xd058);

/// All built-in models
pub fn models() -> Vec<DeviceModel> {
    vec![core(), photon(), p1(), electron(), duo()]
}

fn core() -> DeviceModel {
    let mut model = DeviceModel::new(CORE, "Core");
    model.product_id = Some(0);
    model.serial = Some(ModelId::new(0x1d50, 0x607d));
    model.segments = vec![
        Segment::new(USER_FIRMWARE, 0x0800_5000, 0),
        Segment::new(SERVER_KEY, 0x0000_1000, 1)
            .with_size(2048)
            .der_key(KeyAlgorithm::Rsa, 384, 450),
        Segment::new(PRIVATE_KEY, 0x0000_2000, 1)
            .with_size(1024)
            .der(KeyAlgorithm::Rsa),
        Segment::new(FACTORY_RESET, 0x0002_0000, 1),
    ];
    model
}

/// Key slots and transport flag shared by the Gen 2 DCT layout
fn dct_segments(with_alt_keys: bool) -> Vec<Segment> {
    let mut segments = vec![
        Segment::new(PRIVATE_KEY, 34, 1)
            .with_size(612)
            .der(KeyAlgorithm::Rsa),
        Segment::new(SERVER_KEY, 2082, 1)
            .with_size(512)
            .der_key(KeyAlgorithm::Rsa, 384, 450),
    ];
    if with_alt_keys {
        segments.extend([
            Segment::new(TRANSPORT, 2977, 1).with_size(1),
            Segment::new(ALT_PRIVATE_KEY, 3106, 1)
                .with_size(192)
                .der(KeyAlgorithm::Ec),
            Segment::new(ALT_SERVER_KEY, 3298, 1)
                .with_size(320)
                .der_key(KeyAlgorithm::Ec, 192, 258),
        ]);
    }
    segments
}

fn photon_family(id: ModelId, name: &str, serial_pid: u16, product_id: u16) -> DeviceModel {
    let mut model = DeviceModel::new(id, name);
    model.product_id = Some(product_id);
    model.serial = Some(ModelId::new(0x2b04, serial_pid));
    model.segments = dct_segments(true);
    model.segments.extend([
        Segment::new(SYSTEM_FIRMWARE_ONE, 0x0802_0000, 0),
        Segment::new(SYSTEM_FIRMWARE_TWO, 0x0806_0000, 0),
        Segment::new(USER_FIRMWARE, 0x080A_0000, 0),
        Segment::new(FACTORY_RESET, 0x080E_0000, 0),
    ]);
    model.sort_segments();
    model
}

fn photon() -> DeviceModel {
    photon_family(PHOTON, "Photon", 0xc006, 6)
}

fn p1() -> DeviceModel {
    photon_family(P1, "P1", 0xc008, 8)
}

fn electron() -> DeviceModel {
    let mut model = DeviceModel::new(ELECTRON, "Electron");
    model.product_id = Some(10);
    model.serial = Some(ModelId::new(0x2b04, 0xc00a));
    model.default_protocol = Protocol::Udp;
    model.alternative_protocol = Some(Protocol::Tcp);
    model.segments = dct_segments(true);
    model.segments.extend([
        Segment::new(SYSTEM_FIRMWARE_ONE, 0x0802_0000, 0),
        Segment::new(SYSTEM_FIRMWARE_TWO, 0x0804_0000, 0),
        Segment::new(SYSTEM_FIRMWARE_THREE, 0x0806_0000, 0),
        Segment::new(USER_FIRMWARE, 0x0808_0000, 0),
        Segment::new(FACTORY_RESET, 0x080A_0000, 0),
    ]);
    model.sort_segments();
    model
}

fn duo() -> DeviceModel {
    let mut model = DeviceModel::new(DUO, "Duo");
    model.product_id = Some(88);
    model.serial = Some(ModelId::new(0x2b04, 0xc058));
    model.segments = dct_segments(false);
    model.segments.extend([
        Segment::new(SYSTEM_FIRMWARE_ONE, 0x0802_0000, 0),
        Segment::new(SYSTEM_FIRMWARE_TWO, 0x0804_0000, 0),
        Segment::new(USER_FIRMWARE, 0x080C_0000, 0),
        // External SPI flash
        Segment::new(FACTORY_RESET, 0x0014_0000, 2),
    ]);
    model.sort_segments();
    model
}
