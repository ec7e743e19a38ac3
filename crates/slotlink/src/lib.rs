//! Race management for Carrera(R) DIGITAL slotcar tracks.
//!
//! slotlink talks the control unit's delimited wire protocol over serial,
//! Bluetooth LE or TCP, and ships an emulator so everything can run without
//! hardware.
//!
//! # Crate Structure
//!
//! - [`protocol`]: frame codec, payload schemas and protocol constants
//! - [`transport`]: serial, BLE (behind the `ble` feature) and TCP
//!   connections
//! - [`cu`]: typed [`ControlUnit`](cu::ControlUnit) client for polling,
//!   slot settings and race control
//! - [`sim`]: control unit emulator, start light machine and race
//!   simulator (behind the `sim` feature)

/// Re-export protocol types.
pub mod protocol {
    pub use slotlink_protocol::*;
}

/// Re-export transport types.
pub mod transport {
    pub use slotlink_transport::*;
}

/// Re-export control unit client types.
pub mod cu {
    pub use slotlink_cu::*;
}

/// Re-export emulator types (requires `sim` feature).
#[cfg(feature = "sim")]
pub mod sim {
    pub use slotlink_sim::*;
}
