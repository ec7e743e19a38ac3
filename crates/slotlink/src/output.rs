use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use slotlink_cu::{Mode, PollEvent, Status, Timer};
use slotlink_sim::StartLight;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_event(event: &PollEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => match event {
            PollEvent::Status(status) => print_status_table(status),
            PollEvent::Timer(timer) => print_timer_table(timer),
        },
        OutputFormat::Pretty => match event {
            PollEvent::Status(status) => {
                println!(
                    "status start={} mode={} display={} fuel={} pit={}",
                    light_name(status.start),
                    mode_flags(status.mode),
                    status.display,
                    join_fuel(&status.fuel),
                    pit_marks(&status.pit)
                );
            }
            PollEvent::Timer(timer) => {
                println!(
                    "timer car={} time={} ({}ms) sector={}",
                    timer.address,
                    format_race_time(timer.timestamp),
                    timer.timestamp,
                    timer.sector
                );
            }
        },
    }
}

fn print_status_table(status: &Status) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["START", "MODE", "DISPLAY", "FUEL", "PIT"])
        .add_row(vec![
            light_name(status.start),
            mode_flags(status.mode),
            status.display.to_string(),
            join_fuel(&status.fuel),
            pit_marks(&status.pit),
        ]);
    println!("{table}");
}

fn print_timer_table(timer: &Timer) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["CAR", "TIME", "SECTOR"])
        .add_row(vec![
            timer.address.to_string(),
            format_race_time(timer.timestamp),
            timer.sector.to_string(),
        ]);
    println!("{table}");
}

pub fn light_name(value: u8) -> String {
    match StartLight::from_value(value) {
        Some(light) => light.to_string(),
        None => format!("unknown ({value})"),
    }
}

pub fn mode_flags(mode: Mode) -> String {
    let mut flags = Vec::new();
    if mode.fuel_mode() {
        flags.push("fuel");
    }
    if mode.real_fuel_mode() {
        flags.push("real-fuel");
    }
    if mode.pit_lane_adapter() {
        flags.push("pit-lane");
    }
    if mode.lap_counter() {
        flags.push("lap-counter");
    }
    if flags.is_empty() {
        "-".to_string()
    } else {
        flags.join("+")
    }
}

pub fn join_fuel(fuel: &[u8; 8]) -> String {
    fuel.iter()
        .map(|level| level.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn pit_marks(pit: &[bool; 8]) -> String {
    pit.iter()
        .map(|&in_pit| if in_pit { '+' } else { '-' })
        .collect()
}

pub fn format_race_time(millis: u32) -> String {
    let minutes = millis / 60_000;
    let seconds = (millis % 60_000) / 1000;
    let rest = millis % 1000;
    format!("{minutes}:{seconds:02}.{rest:03}")
}
