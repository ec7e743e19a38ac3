use slotlink_cu::ControlUnit;

use crate::cmd::SetCommand;
use crate::exit::{cu_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(command: SetCommand, _format: OutputFormat) -> CliResult<i32> {
    match command {
        SetCommand::Speed(args) => apply(&args.device, |cu| cu.set_speed(args.address, args.value)),
        SetCommand::Brake(args) => apply(&args.device, |cu| cu.set_brake(args.address, args.value)),
        SetCommand::Fuel(args) => apply(&args.device, |cu| cu.set_fuel(args.address, args.value)),
        SetCommand::Pos(args) => {
            apply(&args.device, |cu| cu.set_position(args.address, args.position))
        }
        SetCommand::Lap(args) => apply(&args.device, |cu| cu.set_lap(args.value)),
        SetCommand::Clrpos(args) => apply(&args.device, |cu| cu.clear_positions()),
        SetCommand::Ignore(args) => apply(&args.device, |cu| cu.ignore(args.mask)),
    }
}

fn apply(
    device: &str,
    op: impl FnOnce(&mut ControlUnit) -> slotlink_cu::Result<()>,
) -> CliResult<i32> {
    let mut cu = ControlUnit::open(device).map_err(|err| cu_error("open failed", err))?;
    op(&mut cu).map_err(|err| cu_error("command failed", err))?;
    cu.close().map_err(|err| cu_error("close failed", err))?;
    Ok(SUCCESS)
}
