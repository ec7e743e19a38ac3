use std::time::Duration;

use slotlink_protocol::ProtocolError;

/// Errors raised while opening or using a control unit connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The device identifier matches none of the supported grammars.
    #[error("unsupported device identifier {device:?}")]
    UnsupportedDevice { device: String },

    /// The identifier names a BLE device but BLE support is not compiled in.
    #[error("device {device:?} needs Bluetooth LE support (rebuild with the `ble` feature)")]
    BleDisabled { device: String },

    /// No complete frame arrived within the receive timeout.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The connection is gone; no further traffic is possible.
    #[error("connection closed")]
    Closed,

    /// The peer's byte stream failed frame validation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The serial port could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// An I/O error on the underlying stream.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A Bluetooth stack operation failed.
    #[cfg(feature = "ble")]
    #[error("bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),

    /// Scanning finished without finding the requested peripheral.
    #[cfg(feature = "ble")]
    #[error("no control unit found at {address}")]
    DeviceNotFound { address: String },

    /// The peripheral lacks a required GATT characteristic.
    #[cfg(feature = "ble")]
    #[error("characteristic {uuid} not present on device")]
    CharacteristicMissing { uuid: uuid::Uuid },
}

pub type Result<T> = std::result::Result<T, TransportError>;
