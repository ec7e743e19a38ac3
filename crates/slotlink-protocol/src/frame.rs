use bytes::Bytes;

use crate::error::{ProtocolError, Result};
use crate::payload::PayloadReader;
use crate::wire;

/// One validated, delimiter-stripped protocol message.
///
/// The payload is the full byte run between the delimiters: command byte,
/// data bytes, and the trailing checksum. Construction goes through
/// [`Frame::parse`], so a `Frame` always carries a checksum that matches its
/// body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Validate a raw payload (checksum included) into a frame.
    ///
    /// Beyond the checksum, the command byte must be one of the protocol's
    /// known commands and every following byte must sit in the encoded data
    /// range. The checksum only covers low nibbles, so the range check is
    /// what catches corruption in the high bits.
    pub fn parse(payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() < 2 {
            return Err(ProtocolError::Runt { len: payload.len() });
        }
        if !wire::is_known_command(payload[0]) {
            return Err(ProtocolError::UnknownCommand { byte: payload[0] });
        }
        if let Some(&byte) = payload[1..].iter().find(|&&b| !wire::is_data_byte(b)) {
            return Err(ProtocolError::Malformed {
                field: "payload",
                byte,
            });
        }
        let (body, tail) = payload.split_at(payload.len() - 1);
        let expected = wire::checksum(body);
        let found = tail[0];
        if expected != found {
            return Err(ProtocolError::ChecksumMismatch { expected, found });
        }
        Ok(Self { payload })
    }

    /// The leading command byte.
    pub fn command(&self) -> u8 {
        self.payload[0]
    }

    /// Payload without the trailing checksum.
    pub fn body(&self) -> &[u8] {
        &self.payload[..self.payload.len() - 1]
    }

    /// Full payload including the trailing checksum.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Field reader positioned at the start of the body.
    pub fn reader(&self) -> PayloadReader<'_> {
        PayloadReader::new(self.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_valid_payload() {
        let frame = Frame::parse(&b"J00?2;"[..]).unwrap();
        assert_eq!(frame.command(), b'J');
        assert_eq!(frame.body(), b"J00?2");
        assert_eq!(frame.payload(), b"J00?2;");
    }

    #[test]
    fn parse_rejects_bad_checksum() {
        let err = Frame::parse(&b"J00?2<"[..]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ChecksumMismatch {
                expected: b';',
                found: b'<'
            }
        ));
    }

    #[test]
    fn parse_rejects_runt_payloads() {
        assert!(matches!(
            Frame::parse(&b""[..]),
            Err(ProtocolError::Runt { len: 0 })
        ));
        assert!(matches!(
            Frame::parse(&b"?"[..]),
            Err(ProtocolError::Runt { len: 1 })
        ));
    }

    #[test]
    fn parse_rejects_unknown_command_byte() {
        // 'X' is not a protocol command even with a correct checksum.
        let err = Frame::parse(&b"X008"[..]).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand { byte: b'X' }));
    }

    #[test]
    fn parse_rejects_data_bytes_outside_encoded_range() {
        // High-nibble corruption leaves the checksum intact but is caught by
        // the range check.
        let mut payload = b"J00?2;".to_vec();
        payload[2] ^= 0x40;
        let err = Frame::parse(payload).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Malformed {
                field: "payload",
                byte: 0x70
            }
        ));
    }
}
