use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::frame::Frame;
use crate::wire::{END_DELIMITER, MAX_PAYLOAD_LEN, START_DELIMITER};

/// Wrap a finished payload (checksum included) in the wire delimiters.
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 2);
    buf.put_u8(START_DELIMITER);
    buf.put_slice(payload);
    buf.put_u8(END_DELIMITER);
    buf.freeze()
}

/// Extract the next frame from a receive buffer.
///
/// Returns `Ok(None)` while the buffer holds only a valid prefix of a frame.
/// Invalid input (garbage before the start delimiter, a start delimiter
/// inside a frame, an oversize or corrupt frame) consumes the offending bytes
/// and returns the error, so the next call resumes at a plausible frame
/// boundary.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<Frame>> {
    match buf.iter().position(|&b| b == START_DELIMITER) {
        Some(0) => {}
        Some(junk) => {
            buf.advance(junk);
            debug!(discarded = junk, "resynchronizing to start delimiter");
            return Err(ProtocolError::Desync { discarded: junk });
        }
        None => {
            let discarded = buf.len();
            if discarded == 0 {
                return Ok(None);
            }
            buf.clear();
            debug!(discarded, "discarding bytes with no start delimiter");
            return Err(ProtocolError::Desync { discarded });
        }
    }

    for (index, &byte) in buf.iter().enumerate().skip(1) {
        if byte == START_DELIMITER {
            // Previous frame never terminated; drop it and realign.
            buf.advance(index);
            debug!(discarded = index, "unterminated frame before new start");
            return Err(ProtocolError::Desync { discarded: index });
        }
        if byte == END_DELIMITER {
            let mut payload = buf.split_to(index + 1);
            payload.advance(1);
            payload.truncate(payload.len() - 1);
            return match Frame::parse(payload.freeze()) {
                Ok(frame) => Ok(Some(frame)),
                Err(err) => {
                    debug!(error = %err, "dropping invalid frame");
                    Err(err)
                }
            };
        }
        if index > MAX_PAYLOAD_LEN {
            let discarded = buf.len();
            buf.clear();
            debug!(discarded, "dropping oversize frame");
            return Err(ProtocolError::FrameTooLong {
                max: MAX_PAYLOAD_LEN,
            });
        }
    }

    Ok(None)
}

/// Streaming frame extractor: feed received chunks in, pull frames out.
#[derive(Debug, Default)]
pub struct Decoder {
    buf: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Try to extract the next complete frame.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        decode_frame(&mut self.buf)
    }

    /// Bytes buffered but not yet consumed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
