use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use slotlink_cu::Button;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod info;
pub mod poll;
pub mod race;
pub mod serve;
pub mod set;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream poll results from a control unit.
    Poll(PollArgs),
    /// Read the firmware version and current status.
    Info(InfoArgs),
    /// Apply a slot or track setting.
    #[command(subcommand)]
    Set(SetCommand),
    /// Start, reset or press buttons on the unit.
    #[command(subcommand)]
    Race(RaceCommand),
    /// Serve an emulated control unit over TCP.
    Serve(ServeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Poll(args) => poll::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Set(command) => set::run(command, format),
        Command::Race(command) => race::run(command, format),
        Command::Serve(args) => serve::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct PollArgs {
    /// Serial port, BLE MAC address or socket:// URL.
    pub device: String,
    /// Exit after printing N results.
    #[arg(long)]
    pub count: Option<usize>,
    /// Print only timer events.
    #[arg(long, conflicts_with = "status_only")]
    pub timer_only: bool,
    /// Print only status snapshots.
    #[arg(long, conflicts_with = "timer_only")]
    pub status_only: bool,
    /// Delay between polls (e.g. 50ms, 1s; 0 for none).
    #[arg(long, default_value = "50ms")]
    pub interval: String,
    /// Per-request timeout (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Serial port, BLE MAC address or socket:// URL.
    pub device: String,
    /// Per-request timeout (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub timeout: String,
}

#[derive(Subcommand, Debug)]
pub enum SetCommand {
    /// Set a slot's maximum speed (0-15).
    Speed(SlotValueArgs),
    /// Set a slot's brake strength (0-15).
    Brake(SlotValueArgs),
    /// Set a slot's tank size (0-15).
    Fuel(SlotValueArgs),
    /// Show a grid position on the position tower (1-8).
    Pos(PositionArgs),
    /// Drive the lap counter display.
    Lap(LapArgs),
    /// Clear the position tower.
    Clrpos(DeviceArgs),
    /// Mask controller inputs the unit should ignore.
    Ignore(MaskArgs),
}

#[derive(Subcommand, Debug)]
pub enum RaceCommand {
    /// Press start/enter: begin the countdown, pause or resume the race.
    Start(DeviceArgs),
    /// Reset the race clock.
    Reset(DeviceArgs),
    /// Press a panel button by name.
    Press(PressArgs),
}

#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Serial port, BLE MAC address or socket:// URL.
    pub device: String,
}

#[derive(Args, Debug)]
pub struct SlotValueArgs {
    /// Serial port, BLE MAC address or socket:// URL.
    pub device: String,
    /// Controller address (0-7).
    pub address: u8,
    /// Value to apply (0-15).
    pub value: u8,
}

#[derive(Args, Debug)]
pub struct PositionArgs {
    /// Serial port, BLE MAC address or socket:// URL.
    pub device: String,
    /// Controller address (0-7).
    pub address: u8,
    /// Grid position (1-8).
    pub position: u8,
}

#[derive(Args, Debug)]
pub struct LapArgs {
    /// Serial port, BLE MAC address or socket:// URL.
    pub device: String,
    /// Lap count to display.
    pub value: u8,
}

#[derive(Args, Debug)]
pub struct MaskArgs {
    /// Serial port, BLE MAC address or socket:// URL.
    pub device: String,
    /// Controller bit mask (bit n ignores controller n).
    pub mask: u8,
}

#[derive(Args, Debug)]
pub struct PressArgs {
    /// Serial port, BLE MAC address or socket:// URL.
    pub device: String,
    /// Button to press.
    #[arg(value_enum)]
    pub button: ButtonArg,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum ButtonArg {
    /// Pace car / ESC.
    PaceCar,
    /// Start / enter.
    Start,
    Speed,
    Brake,
    Fuel,
    Code,
}

impl ButtonArg {
    pub fn into_button(self) -> Button {
        match self {
            ButtonArg::PaceCar => Button::PaceCarEsc,
            ButtonArg::Start => Button::StartEnter,
            ButtonArg::Speed => Button::Speed,
            ButtonArg::Brake => Button::Brake,
            ButtonArg::Fuel => Button::Fuel,
            ButtonArg::Code => Button::Code,
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub bind: String,
    /// Firmware version the emulator reports (four digits).
    #[arg(long, default_value = "5337", value_name = "DIGITS")]
    pub cu_version: String,
    /// Generate lap traffic for the listed cars.
    #[arg(long)]
    pub simulate: bool,
    /// Cars taking part in the simulated race (comma-separated addresses).
    #[arg(long, value_delimiter = ',', default_value = "0,1")]
    pub cars: Vec<u8>,
    /// Base lap time in seconds at full speed.
    #[arg(long, default_value = "5.0", value_name = "SECS")]
    pub lap_time: f64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn parse_timeout(input: &str) -> CliResult<Duration> {
    let timeout = parse_duration(input)?;
    if timeout.is_zero() {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }
    Ok(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("5m").is_err());
    }

    #[test]
    fn parse_timeout_rejects_zero() {
        assert!(parse_timeout("0s").is_err());
        assert_eq!(parse_timeout("1s").unwrap(), Duration::from_secs(1));
    }
}
