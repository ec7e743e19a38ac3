//! Typed client for a Carrera(R) DIGITAL control unit.
//!
//! [`ControlUnit`] drives a [`Connection`](slotlink_transport::Connection)
//! in strict request/response lockstep: every command sends one frame and
//! consumes one response frame. [`ControlUnit::poll`] classifies the reply
//! into a [`Status`] snapshot or a [`Timer`] event, everything else returns
//! the control unit's echo.
//!
//! Command arguments are validated locally before any bytes are written, so
//! an out-of-range speed fails fast with [`CuError::InvalidArgument`]
//! instead of confusing the hardware.

mod error;
mod event;
mod unit;

pub use error::{CuError, Result};
pub use event::{Mode, PollEvent, Status, Timer};
pub use unit::{Button, ControlUnit, CuConfig};
