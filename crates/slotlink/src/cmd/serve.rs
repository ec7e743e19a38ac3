use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use slotlink_sim::{CuServer, MockControlUnit, RaceSimulator, SimulatorConfig};

use crate::cmd::ServeArgs;
use crate::exit::{sim_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::OutputFormat;

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    if args.cu_version.len() != 4 || !args.cu_version.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CliError::new(
            USAGE,
            format!("--cu-version must be four digits, got {:?}", args.cu_version),
        ));
    }
    if let Some(&car) = args.cars.iter().find(|&&car| car > 7) {
        return Err(CliError::new(
            USAGE,
            format!("--cars addresses must be 0-7, got {car}"),
        ));
    }
    if !args.lap_time.is_finite() || args.lap_time <= 0.0 {
        return Err(CliError::new(
            USAGE,
            format!("--lap-time must be positive seconds, got {}", args.lap_time),
        ));
    }
    let base_lap = Duration::try_from_secs_f64(args.lap_time)
        .map_err(|err| CliError::new(USAGE, format!("invalid --lap-time: {err}")))?;

    let unit = MockControlUnit::new();
    unit.state().version = args.cu_version.clone();

    let server = CuServer::bind(args.bind.as_str(), unit.clone())
        .map_err(|err| sim_error("bind failed", err))?;
    let addr = server
        .local_addr()
        .map_err(|err| sim_error("bind failed", err))?;
    println!("serving control unit on socket://{addr}");

    let simulator = if args.simulate {
        let config = SimulatorConfig::default()
            .with_base_lap(base_lap)
            .with_cars(args.cars.clone());
        let handle = RaceSimulator::new(unit, config)
            .start()
            .map_err(|err| sim_error("simulator start failed", err))?;
        Some(handle)
    } else {
        None
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    server
        .run(running)
        .map_err(|err| sim_error("serve failed", err))?;

    if let Some(simulator) = simulator {
        simulator.stop();
    }
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
