//! Device identifier classification and the top-level [`open`] factory.
//!
//! A device identifier is a plain string whose shape selects the transport:
//! a Bluetooth MAC address (`AA:BB:CC:DD:EE:FF`) selects BLE, a
//! `socket://host:port` URL selects TCP, and anything else is treated as a
//! serial port path (`/dev/ttyUSB0`, `COM3`).

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::serial::SerialConnection;
use crate::tcp::TcpConnection;
use crate::traits::Connection;

/// Transport family selected for a device identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    /// Bluetooth LE peripheral, addressed by its MAC address.
    BleAddress(String),
    /// TCP endpoint in `host:port` form.
    TcpAddress(String),
    /// Local serial port path.
    SerialPath(String),
}

/// Classifies a device identifier without opening anything.
///
/// Returns [`TransportError::UnsupportedDevice`] for identifiers that match
/// a recognized scheme but are malformed, such as `socket://` with no
/// address or an unknown `scheme://` prefix. Strings that match no scheme
/// at all fall through to [`DeviceKind::SerialPath`] untouched.
pub fn classify(device: &str) -> Result<DeviceKind> {
    let device = device.trim();
    if device.is_empty() {
        return Err(TransportError::UnsupportedDevice {
            device: String::new(),
        });
    }
    if let Some(mac) = parse_mac(device) {
        return Ok(DeviceKind::BleAddress(mac));
    }
    if let Some((scheme, rest)) = device.split_once("://") {
        if !scheme.eq_ignore_ascii_case("socket") {
            return Err(TransportError::UnsupportedDevice {
                device: device.to_owned(),
            });
        }
        let (host, port) = rest.rsplit_once(':').unwrap_or((rest, ""));
        if host.is_empty() || port.is_empty() || port.parse::<u16>().is_err() {
            return Err(TransportError::UnsupportedDevice {
                device: device.to_owned(),
            });
        }
        return Ok(DeviceKind::TcpAddress(rest.to_owned()));
    }
    Ok(DeviceKind::SerialPath(device.to_owned()))
}

/// Opens a connection to a Control Unit identified by `device`.
///
/// The identifier grammar is described on [`classify`]. BLE identifiers
/// require the `ble` cargo feature; without it they fail with
/// [`TransportError::BleDisabled`] instead of being misread as serial
/// paths.
pub fn open(device: &str) -> Result<Box<dyn Connection>> {
    match classify(device)? {
        DeviceKind::BleAddress(address) => open_ble(&address),
        DeviceKind::TcpAddress(address) => {
            debug!(%address, "opening tcp connection");
            Ok(Box::new(TcpConnection::connect(&address)?))
        }
        DeviceKind::SerialPath(path) => {
            debug!(%path, "opening serial connection");
            Ok(Box::new(SerialConnection::open(&path)?))
        }
    }
}

#[cfg(feature = "ble")]
fn open_ble(address: &str) -> Result<Box<dyn Connection>> {
    debug!(%address, "opening ble connection");
    Ok(Box::new(crate::ble::BleConnection::open(
        address,
        crate::ble::BleConfig::default(),
    )?))
}

#[cfg(not(feature = "ble"))]
fn open_ble(address: &str) -> Result<Box<dyn Connection>> {
    Err(TransportError::BleDisabled {
        device: address.to_owned(),
    })
}

/// Parses a MAC address of the form `AA:BB:CC:DD:EE:FF`, returning it
/// uppercased. Anything that is not exactly six colon-separated pairs of
/// hex digits is rejected.
fn parse_mac(device: &str) -> Option<String> {
    let groups: Vec<&str> = device.split(':').collect();
    if groups.len() != 6 {
        return None;
    }
    for group in &groups {
        if group.len() != 2 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
    }
    Some(device.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_addresses_select_ble() {
        assert_eq!(
            classify("AA:BB:CC:DD:EE:FF").unwrap(),
            DeviceKind::BleAddress("AA:BB:CC:DD:EE:FF".into())
        );
        assert_eq!(
            classify("aa:bb:cc:dd:ee:ff").unwrap(),
            DeviceKind::BleAddress("AA:BB:CC:DD:EE:FF".into())
        );
        assert_eq!(
            classify("  12:34:56:78:9a:BC  ").unwrap(),
            DeviceKind::BleAddress("12:34:56:78:9A:BC".into())
        );
    }

    #[test]
    fn port_paths_select_serial() {
        assert_eq!(
            classify("/dev/ttyUSB0").unwrap(),
            DeviceKind::SerialPath("/dev/ttyUSB0".into())
        );
        assert_eq!(
            classify("COM3").unwrap(),
            DeviceKind::SerialPath("COM3".into())
        );
    }

    #[test]
    fn near_miss_macs_fall_through_to_serial() {
        // Wrong digit count, non-hex groups, wrong group count: none of
        // these are MAC addresses, so they stay serial path candidates.
        for device in ["AA:BB:CC:DD:EE:GG", "AA:BB:CC:DD:EE", "A:B:C:D:E:F"] {
            assert_eq!(
                classify(device).unwrap(),
                DeviceKind::SerialPath(device.into()),
                "{device}"
            );
        }
    }

    #[test]
    fn socket_urls_select_tcp() {
        assert_eq!(
            classify("socket://localhost:5332").unwrap(),
            DeviceKind::TcpAddress("localhost:5332".into())
        );
        assert_eq!(
            classify("socket://192.168.1.10:9999").unwrap(),
            DeviceKind::TcpAddress("192.168.1.10:9999".into())
        );
    }

    #[test]
    fn malformed_identifiers_are_unsupported() {
        for device in [
            "",
            "   ",
            "socket://",
            "socket://nohost",
            "socket://host:notaport",
            "socket://:5332",
            "tcp://host:1",
            "ble://AA:BB:CC:DD:EE:FF",
        ] {
            match classify(device) {
                Err(TransportError::UnsupportedDevice { .. }) => {}
                other => panic!("{device:?} classified as {other:?}"),
            }
        }
    }

    #[cfg(not(feature = "ble"))]
    #[test]
    fn ble_addresses_fail_cleanly_without_the_feature() {
        match open("AA:BB:CC:DD:EE:FF") {
            Err(TransportError::BleDisabled { device }) => {
                assert_eq!(device, "AA:BB:CC:DD:EE:FF");
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("open succeeded without ble support"),
        }
    }
}
