//! Control unit emulation for tests, demos and development without hardware.
//!
//! [`MockControlUnit`] reproduces the request/response behavior of a real
//! unit over the same payloads, including the [`StartLightSequence`]
//! countdown machine and a resettable race clock. It can be reached three
//! ways:
//!
//! - in process through [`MockConnection`], an in-memory transport
//! - over TCP through [`CuServer`], for `socket://host:port` clients
//! - driven by [`RaceSimulator`], which generates lap traffic
//!
//! Time is injectable: production runs on [`MonotonicClock`], tests advance
//! a [`ManualClock`] by hand and never sleep.

mod clock;
mod connection;
mod error;
mod server;
mod simulate;
mod startlight;
mod state;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use connection::MockConnection;
pub use error::{Result, SimError};
pub use server::{CuServer, ServerHandle};
pub use simulate::{RaceSimulator, SimulatorConfig, SimulatorHandle};
pub use startlight::{SequenceConfig, StartLight, StartLightSequence};
pub use state::{CuState, MockControlUnit, TimerEvent};
