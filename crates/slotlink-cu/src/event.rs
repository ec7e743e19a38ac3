//! Typed poll results.
//!
//! Every poll answer starts with the poll command byte. The second body
//! byte is the discriminant: a status marker means a [`Status`] snapshot,
//! anything else is a [`Timer`] carrying one sensor crossing.

use serde::Serialize;

use slotlink_protocol::{wire, Frame};

use crate::error::{CuError, Result};

/// One decoded poll response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PollEvent {
    Status(Status),
    Timer(Timer),
}

impl PollEvent {
    /// Classifies and decodes a poll response frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let body = frame.body();
        if body.get(1) == Some(&wire::STATUS_MARKER) {
            Ok(PollEvent::Status(Status::from_frame(frame)?))
        } else {
            Ok(PollEvent::Timer(Timer::from_frame(frame)?))
        }
    }
}

/// Snapshot of the control unit when no sensor crossing is pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Fuel level per controller slot, 0 (empty) to 15 (full).
    pub fuel: [u8; 8],
    /// Start light indicator, 0 (off) through 9 (racing, lights off).
    pub start: u8,
    /// Track mode bitmask.
    pub mode: Mode,
    /// Whether each controller's car is in the pit lane.
    pub pit: [bool; 8],
    /// Number of drivers shown on the position tower, 6 or 8.
    pub display: u8,
}

impl Status {
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let mut reader = frame.reader();
        reader.expect(wire::POLL)?;
        reader.expect(wire::STATUS_MARKER)?;
        let mut fuel = [0u8; 8];
        for level in fuel.iter_mut() {
            *level = reader.nibble("fuel")?;
        }
        let start = reader.nibble("start light")?;
        let mode = Mode(reader.nibble("mode")?);
        let pitmask = reader.byte("pit mask")?;
        let display = reader.nibble("display")?;
        if reader.remaining() == 2 {
            // Newer control unit firmware appends two reserved nibbles.
            reader.raw(2, "reserved")?;
        }
        reader.finish()?;

        let mut pit = [false; 8];
        for (slot, flag) in pit.iter_mut().enumerate() {
            *flag = pitmask & (1 << slot) != 0;
        }
        Ok(Self {
            fuel,
            start,
            mode,
            pit,
            display,
        })
    }
}

/// A single sensor crossing reported by the control unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timer {
    /// Controller address, 0-7.
    pub address: u8,
    /// Milliseconds since the race timer started, wrapping at 2^32.
    pub timestamp: u32,
    /// 1 is the finish line, 2 and 3 are check lanes.
    pub sector: u8,
}

impl Timer {
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let mut reader = frame.reader();
        reader.expect(wire::POLL)?;
        // Addresses are 1-based on the wire.
        let address = reader.nibble("timer address")?;
        if !(1..=8).contains(&address) {
            return Err(malformed("timer address", address));
        }
        let timestamp = reader.dword("timestamp")?;
        let sector = reader.nibble("sector")?;
        if !(1..=3).contains(&sector) {
            return Err(malformed("sector", sector));
        }
        reader.finish()?;
        Ok(Self {
            address: address - 1,
            timestamp,
            sector,
        })
    }
}

fn malformed(field: &'static str, value: u8) -> CuError {
    CuError::Protocol(slotlink_protocol::ProtocolError::Malformed {
        field,
        byte: wire::encode_nibble(value),
    })
}

/// 4-bit track mode bitmask reported with each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Mode(pub u8);

impl Mode {
    pub const FUEL: u8 = wire::mode::FUEL;
    pub const REAL_FUEL: u8 = wire::mode::REAL_FUEL;
    pub const PIT_LANE: u8 = wire::mode::PIT_LANE;
    pub const LAP_COUNTER: u8 = wire::mode::LAP_COUNTER;

    /// Fuel consumption is simulated.
    pub fn fuel_mode(self) -> bool {
        self.0 & Self::FUEL != 0
    }

    /// Real fuel mode: cars slow down as the tank empties.
    pub fn real_fuel_mode(self) -> bool {
        self.0 & Self::REAL_FUEL != 0
    }

    /// A pit lane adapter is connected.
    pub fn pit_lane_adapter(self) -> bool {
        self.0 & Self::PIT_LANE != 0
    }

    /// A lap counter is connected.
    pub fn lap_counter(self) -> bool {
        self.0 & Self::LAP_COUNTER != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use slotlink_protocol::{PayloadWriter, ProtocolError};

    fn status_frame(fuel: [u8; 8], start: u8, mode: u8, pitmask: u8, display: u8) -> Frame {
        let mut writer = PayloadWriter::new(wire::POLL);
        writer.push_raw(&[wire::STATUS_MARKER]);
        for level in fuel {
            writer.push_nibble(level);
        }
        writer.push_nibble(start);
        writer.push_nibble(mode);
        writer.push_byte(pitmask);
        writer.push_nibble(display);
        Frame::parse(writer.finish()).unwrap()
    }

    fn timer_frame(wire_address: u8, timestamp: u32, sector: u8) -> Frame {
        let mut writer = PayloadWriter::new(wire::POLL);
        writer.push_nibble(wire_address);
        writer.push_dword(timestamp);
        writer.push_nibble(sector);
        Frame::parse(writer.finish()).unwrap()
    }

    #[test]
    fn status_marker_always_yields_a_status() {
        let frame = status_frame([15; 8], 0, 0, 0, 8);
        match PollEvent::from_frame(&frame).unwrap() {
            PollEvent::Status(status) => {
                assert_eq!(status.fuel, [15; 8]);
                assert_eq!(status.start, 0);
                assert_eq!(status.pit, [false; 8]);
                assert_eq!(status.display, 8);
            }
            PollEvent::Timer(timer) => panic!("classified as timer: {timer:?}"),
        }
    }

    #[test]
    fn missing_marker_always_yields_a_timer() {
        let frame = timer_frame(3, 5000, 1);
        match PollEvent::from_frame(&frame).unwrap() {
            PollEvent::Timer(timer) => {
                assert_eq!(timer.address, 2);
                assert_eq!(timer.timestamp, 5000);
                assert_eq!(timer.sector, 1);
            }
            PollEvent::Status(status) => panic!("classified as status: {status:?}"),
        }
    }

    #[test]
    fn pit_flags_follow_the_mask_bits() {
        let frame = status_frame([3; 8], 7, Mode::FUEL, 0b1000_0101, 6);
        let status = Status::from_frame(&frame).unwrap();
        assert_eq!(
            status.pit,
            [true, false, true, false, false, false, false, true]
        );
        assert!(status.mode.fuel_mode());
        assert!(!status.mode.pit_lane_adapter());
        assert_eq!(status.display, 6);
    }

    #[test]
    fn status_tolerates_reserved_firmware_nibbles() {
        let mut writer = PayloadWriter::new(wire::POLL);
        writer.push_raw(&[wire::STATUS_MARKER]);
        for _ in 0..8 {
            writer.push_nibble(10);
        }
        writer.push_nibble(1);
        writer.push_nibble(0);
        writer.push_byte(0);
        writer.push_nibble(8);
        writer.push_nibble(0);
        writer.push_nibble(0);
        let frame = Frame::parse(writer.finish()).unwrap();

        let status = Status::from_frame(&frame).unwrap();
        assert_eq!(status.fuel, [10; 8]);
        assert_eq!(status.start, 1);
    }

    #[test]
    fn truncated_status_is_rejected() {
        let mut writer = PayloadWriter::new(wire::POLL);
        writer.push_raw(&[wire::STATUS_MARKER]);
        writer.push_nibble(15);
        let frame = Frame::parse(writer.finish()).unwrap();

        match Status::from_frame(&frame) {
            Err(CuError::Protocol(ProtocolError::Truncated { .. })) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn timer_timestamp_covers_the_full_dword_range() {
        let frame = timer_frame(1, u32::MAX, 2);
        let timer = Timer::from_frame(&frame).unwrap();
        assert_eq!(timer.address, 0);
        assert_eq!(timer.timestamp, u32::MAX);
        assert_eq!(timer.sector, 2);
    }

    #[test]
    fn out_of_range_timer_fields_are_rejected() {
        let zero_address = timer_frame(0, 1000, 1);
        assert!(matches!(
            Timer::from_frame(&zero_address),
            Err(CuError::Protocol(ProtocolError::Malformed {
                field: "timer address",
                ..
            }))
        ));

        let bad_sector = timer_frame(1, 1000, 4);
        assert!(matches!(
            Timer::from_frame(&bad_sector),
            Err(CuError::Protocol(ProtocolError::Malformed {
                field: "sector",
                ..
            }))
        ));
    }
}
