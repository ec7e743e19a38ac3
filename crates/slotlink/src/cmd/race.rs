use slotlink_cu::ControlUnit;

use crate::cmd::RaceCommand;
use crate::exit::{cu_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(command: RaceCommand, _format: OutputFormat) -> CliResult<i32> {
    match command {
        RaceCommand::Start(args) => apply(&args.device, |cu| cu.start()),
        RaceCommand::Reset(args) => apply(&args.device, |cu| cu.reset()),
        RaceCommand::Press(args) => {
            apply(&args.device, |cu| cu.press(args.button.into_button()))
        }
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
