//! Poll a control unit served over TCP.
//!
//! Start a server:
//!   cargo run --features cli -- serve --simulate
//!
//! Then point this example at it:
//!   cargo run --example tcp-poll -- socket://127.0.0.1:5000

use std::env;
use std::thread;
use std::time::Duration;

use slotlink::cu::{ControlUnit, PollEvent};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let device = env::args()
        .nth(1)
        .unwrap_or_else(|| String::from("socket://127.0.0.1:5000"));

    let mut cu = ControlUnit::open(&device)?;
    println!("connected to {device}, firmware {}", cu.version()?);

    for _ in 0..50 {
        match cu.poll()? {
            PollEvent::Timer(timer) => {
                println!(
                    "car {} sector {} at {}ms",
                    timer.address, timer.sector, timer.timestamp
                );
            }
            PollEvent::Status(status) => {
                println!("start light {}, fuel {:?}", status.start, status.fuel);
            }
        }
        thread::sleep(Duration::from_millis(50));
    }

    cu.close()?;
    Ok(())
}
