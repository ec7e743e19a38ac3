//! Protocol constants and byte-level primitives.
//!
//! These values come from the control unit's documented wire protocol and are
//! fixed facts of the device, not tunables.

use crate::error::{ProtocolError, Result};

/// Marks the beginning of a frame on the wire.
pub const START_DELIMITER: u8 = b'"';

/// Marks the end of a frame on the wire.
pub const END_DELIMITER: u8 = b'$';

/// Every encoded data byte is `value | NIBBLE_OFFSET`, so payload bytes stay
/// in 0x30..=0x3F and can never collide with either delimiter.
pub const NIBBLE_OFFSET: u8 = 0x30;

/// Longest payload the control unit produces (a status response) with margin.
pub const MAX_PAYLOAD_LEN: usize = 32;

/// Poll for the next status snapshot or timer event.
pub const POLL: u8 = b'?';

/// Query the firmware version.
pub const VERSION: u8 = b'0';

/// Write a configuration word (speed, brake, fuel, position, lap).
pub const SET_WORD: u8 = b'J';

/// Press a control unit button.
pub const PRESS: u8 = b'T';

/// Reset the race timer.
pub const RESET: u8 = b'=';

/// Set the controller ignore mask.
pub const IGNORE: u8 = b':';

/// Second payload byte of a poll response carrying a status snapshot.
pub const STATUS_MARKER: u8 = b':';

/// Configuration words addressable through the set-word command.
pub mod word {
    pub const SPEED: u8 = 0;
    pub const BRAKE: u8 = 1;
    pub const FUEL: u8 = 2;
    pub const POSITION: u8 = 6;
    /// High nibble of the lap count shown on connected displays.
    pub const LAP_HIGH: u8 = 17;
    /// Low nibble of the lap count shown on connected displays.
    pub const LAP_LOW: u8 = 18;

    /// Position value that clears the whole position tower.
    pub const CLEAR_ALL_POSITIONS: u8 = 9;
}

/// Button identifiers for the press command.
pub mod button {
    pub const PACE_CAR_ESC: u8 = 1;
    pub const START_ENTER: u8 = 2;
    pub const SPEED: u8 = 5;
    pub const BRAKE: u8 = 6;
    pub const FUEL: u8 = 7;
    pub const CODE: u8 = 8;
}

/// Bits of the 4-bit track mode mask in a status response.
pub mod mode {
    pub const FUEL: u8 = 0x01;
    pub const REAL_FUEL: u8 = 0x02;
    pub const PIT_LANE: u8 = 0x04;
    pub const LAP_COUNTER: u8 = 0x08;
}

/// Whether a byte is one of the protocol's command bytes.
pub fn is_known_command(byte: u8) -> bool {
    matches!(byte, POLL | VERSION | SET_WORD | PRESS | RESET | IGNORE)
}

/// Whether a byte may appear in a payload after the command byte. Data
/// nibbles, ASCII digit fields, the status marker and checksums all live in
/// the encoded range.
pub fn is_data_byte(byte: u8) -> bool {
    byte & 0xF0 == NIBBLE_OFFSET
}

/// Checksum over a payload: low nibble of the byte sum, shifted into the
/// encoded data range.
pub fn checksum(payload: &[u8]) -> u8 {
    let sum = payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    (sum & 0x0F) | NIBBLE_OFFSET
}

/// Encode a 4-bit value as one wire byte.
pub fn encode_nibble(value: u8) -> u8 {
    (value & 0x0F) | NIBBLE_OFFSET
}

/// Decode one wire byte back into its 4-bit value.
pub fn decode_nibble(byte: u8) -> Result<u8> {
    if byte & 0xF0 == NIBBLE_OFFSET {
        Ok(byte & 0x0F)
    } else {
        Err(ProtocolError::Malformed {
            field: "nibble",
            byte,
        })
    }
}
