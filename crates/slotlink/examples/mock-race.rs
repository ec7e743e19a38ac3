//! Race two simulated cars against the in-process emulator.
//!
//! Run with:
//!   cargo run --example mock-race

use std::thread;
use std::time::Duration;

use slotlink::cu::{ControlUnit, PollEvent};
use slotlink::sim::{MockConnection, MockControlUnit, RaceSimulator, SimulatorConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let unit = MockControlUnit::new();

    // Car 0 flat out, car 1 cruising.
    {
        let mut state = unit.state();
        state.speed[0] = 15;
        state.speed[1] = 9;
    }

    let config = SimulatorConfig::default()
        .with_base_lap(Duration::from_millis(500))
        .with_cars(vec![0, 1]);
    let simulator = RaceSimulator::new(unit.clone(), config).start()?;

    let mut cu = ControlUnit::with_connection(MockConnection::new(unit));
    println!("firmware: {}", cu.version()?);

    for _ in 0..20 {
        match cu.poll()? {
            PollEvent::Timer(timer) => {
                println!(
                    "car {} crossed sector {} at {}ms",
                    timer.address, timer.sector, timer.timestamp
                );
            }
            PollEvent::Status(status) => {
                println!("fuel: {:?}", status.fuel);
            }
        }
        thread::sleep(Duration::from_millis(100));
    }

    simulator.stop();
    cu.close()?;
    Ok(())
}
