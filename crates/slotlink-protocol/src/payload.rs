use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::wire;

/// Builds a payload field by field and seals it with the checksum.
///
/// Field values are masked to their wire width; range validation belongs to
/// the caller issuing the command.
#[derive(Debug)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    pub fn new(command: u8) -> Self {
        let mut buf = BytesMut::with_capacity(wire::MAX_PAYLOAD_LEN);
        buf.put_u8(command);
        Self { buf }
    }

    /// Append one 4-bit field.
    pub fn push_nibble(&mut self, value: u8) {
        self.buf.put_u8(wire::encode_nibble(value));
    }

    /// Append one byte as two nibbles, low nibble first.
    pub fn push_byte(&mut self, value: u8) {
        self.push_nibble(value & 0x0F);
        self.push_nibble(value >> 4);
    }

    /// Append a 32-bit value as eight nibbles, least significant first.
    pub fn push_dword(&mut self, value: u32) {
        for shift in (0..32).step_by(4) {
            self.push_nibble((value >> shift) as u8);
        }
    }

    /// Append raw bytes unencoded (ASCII fields, the status marker).
    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Append the checksum and return the finished payload.
    pub fn finish(mut self) -> Bytes {
        let ck = wire::checksum(&self.buf);
        self.buf.put_u8(ck);
        self.buf.freeze()
    }
}

/// Reads a payload body field by field.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Self { body, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.body.len() - self.pos
    }

    fn take(&mut self, field: &'static str) -> Result<u8> {
        let byte = *self
            .body
            .get(self.pos)
            .ok_or(ProtocolError::Truncated { field })?;
        self.pos += 1;
        Ok(byte)
    }

    /// Consume one byte and require it to equal `expected`.
    pub fn expect(&mut self, expected: u8) -> Result<()> {
        let found = self.take("command")?;
        if found != expected {
            return Err(ProtocolError::UnexpectedCommand { expected, found });
        }
        Ok(())
    }

    /// Read one 4-bit field.
    pub fn nibble(&mut self, field: &'static str) -> Result<u8> {
        let byte = self.take(field)?;
        wire::decode_nibble(byte).map_err(|_| ProtocolError::Malformed { field, byte })
    }

    /// Read one byte sent as two nibbles, low nibble first.
    pub fn byte(&mut self, field: &'static str) -> Result<u8> {
        let low = self.nibble(field)?;
        let high = self.nibble(field)?;
        Ok(low | high << 4)
    }

    /// Read a 32-bit value sent as eight nibbles, least significant first.
    pub fn dword(&mut self, field: &'static str) -> Result<u32> {
        let mut value = 0u32;
        for shift in (0..32).step_by(4) {
            value |= u32::from(self.nibble(field)?) << shift;
        }
        Ok(value)
    }

    /// Read `len` raw bytes.
    pub fn raw(&mut self, len: usize, field: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ProtocolError::Truncated { field });
        }
        let slice = &self.body[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Require that every byte has been consumed.
    pub fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(ProtocolError::TrailingBytes { remaining }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_produces_known_set_word_payload() {
        let mut w = PayloadWriter::new(wire::SET_WORD);
        w.push_byte(0x00);
        w.push_nibble(15);
        w.push_nibble(2);
        assert_eq!(w.finish().as_ref(), b"J00?2;");
    }

    #[test]
    fn byte_fields_are_low_nibble_first() {
        let mut w = PayloadWriter::new(b'X');
        w.push_byte(0x5A);
        let payload = w.finish();
        assert_eq!(&payload[1..3], &[0x3A, 0x35]);
    }

    #[test]
    fn dword_fields_are_least_significant_nibble_first() {
        let mut w = PayloadWriter::new(b'X');
        w.push_dword(0x1357_0135);
        let payload = w.finish();
        assert_eq!(&payload[1..9], b"53107531");
    }

    #[test]
    fn reader_recovers_written_fields() {
        let mut w = PayloadWriter::new(wire::SET_WORD);
        w.push_byte(0x26);
        w.push_nibble(7);
        w.push_nibble(1);
        let payload = w.finish();

        let frame = crate::Frame::parse(payload).unwrap();
        let mut r = frame.reader();
        r.expect(wire::SET_WORD).unwrap();
        assert_eq!(r.byte("word").unwrap(), 0x26);
        assert_eq!(r.nibble("value").unwrap(), 7);
        assert_eq!(r.nibble("repeat").unwrap(), 1);
        r.finish().unwrap();
    }

    #[test]
    fn reader_reports_truncation() {
        let mut r = PayloadReader::new(b"J0");
        r.expect(b'J').unwrap();
        let err = r.byte("word").unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { field: "word" }));
    }

    #[test]
    fn reader_rejects_trailing_bytes() {
        let mut r = PayloadReader::new(b"=00");
        r.expect(b'=').unwrap();
        assert!(matches!(
            r.finish(),
            Err(ProtocolError::TrailingBytes { remaining: 2 })
        ));
    }

    #[test]
    fn reader_flags_non_nibble_data() {
        let mut r = PayloadReader::new(&[b'J', 0x41]);
        r.expect(b'J').unwrap();
        assert!(matches!(
            r.nibble("word"),
            Err(ProtocolError::Malformed { field: "word", .. })
        ));
    }
}
