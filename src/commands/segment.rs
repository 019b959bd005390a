//! Segment read and write commands

use crate::cli::SegmentArgs;
use iotprov_core::spec::{DeviceRegistry, ModelId};
use iotprov_core::transfer::{
    discover, Direction, DfuTransport, SegmentTransfer, TransferRequest, DISCOVERY_TIMEOUT,
};

/// Run one segment transfer against the attached device
pub fn cmd_transfer<T: DfuTransport + ?Sized>(
    transport: &T,
    registry: &DeviceRegistry,
    select: Option<ModelId>,
    direction: Direction,
    args: &SegmentArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let model = discover(transport, registry, DISCOVERY_TIMEOUT, select)?;
    let request = TransferRequest {
        model,
        segment: args.segment.clone(),
        direction,
        path: args.file.clone(),
        leave: args.leave,
    };

    let verb = match direction {
        Direction::Read => "Reading",
        Direction::Write => "Writing",
    };
    let pb = super::spinner(format!("{} {} on {}...", verb, args.segment, model))?;
    let result = SegmentTransfer::new(registry, transport).execute(&request);
    pb.finish_and_clear();
    result?;

    match direction {
        Direction::Read => println!("Saved {} to {}", args.segment, args.file.display()),
        Direction::Write => println!("Wrote {} to {}", args.file.display(), args.segment),
    }
    Ok(())
}
