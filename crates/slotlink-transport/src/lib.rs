//! Physical connections to Carrera(R) DIGITAL control units.
//!
//! Three media share one blocking [`Connection`] contract:
//!
//! - [`SerialConnection`]: the wired link (19200 baud, 8N1)
//! - [`BleConnection`]: the wireless AppConnect adapter (feature `ble`),
//!   bridged from its asynchronous event loop to the blocking contract by a
//!   background worker thread and a pair of bounded queues
//! - [`TcpConnection`]: a `socket://host:port` link, typically to a
//!   simulated control unit
//!
//! [`open`] inspects a device identifier (serial path, `COMn`, BLE MAC
//! address, or `socket://` URL) and constructs the matching variant.

#[cfg(feature = "ble")]
mod ble;
mod device;
mod error;
mod serial;
mod tcp;
mod traits;

#[cfg(feature = "ble")]
pub use ble::{BleConfig, BleConnection, BleShutdown};
pub use device::{classify, open, DeviceKind};
pub use error::{Result, TransportError};
pub use serial::SerialConnection;
pub use tcp::{TcpConnection, TcpShutdown};
pub use traits::Connection;
