use serde::Serialize;
use slotlink_cu::{ControlUnit, CuConfig, PollEvent, Status};

use crate::cmd::{parse_timeout, InfoArgs};
use crate::exit::{cu_error, CliResult, SUCCESS};
use crate::output::{join_fuel, light_name, mode_flags, pit_marks, OutputFormat};

/// Timer events drained while waiting for a status snapshot.
const STATUS_POLL_LIMIT: usize = 32;

#[derive(Serialize)]
struct InfoOutput {
    device: String,
    firmware: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<Status>,
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;

    let mut cu = ControlUnit::open(&args.device)
        .map_err(|err| cu_error("open failed", err))?
        .with_config(CuConfig::default().with_request_timeout(timeout));

    let firmware = cu.version().map_err(|err| cu_error("version failed", err))?;

    let mut status = None;
    for _ in 0..STATUS_POLL_LIMIT {
        match cu.poll().map_err(|err| cu_error("poll failed", err))? {
            PollEvent::Status(snapshot) => {
                status = Some(snapshot);
                break;
            }
            PollEvent::Timer(_) => continue,
        }
    }

    cu.close().map_err(|err| cu_error("close failed", err))?;

    let output = InfoOutput {
        device: args.device,
        firmware,
        status,
    };
    print_info(&output, format);
    Ok(SUCCESS)
}

fn print_info(output: &InfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let line = serde_json::to_string(output).unwrap_or_else(|_| String::from("{}"));
            println!("{line}");
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Control Unit:");
            println!("  Device:    {}", output.device);
            println!("  Firmware:  {}", output.firmware);
            if let Some(status) = &output.status {
                println!("  Start:     {}", light_name(status.start));
                println!("  Mode:      {}", mode_flags(status.mode));
                println!("  Display:   {}", status.display);
                println!("  Fuel:      {}", join_fuel(&status.fuel));
                println!("  Pit:       {}", pit_marks(&status.pit));
            }
        }
    }
}
