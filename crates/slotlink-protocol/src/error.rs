/// Errors that can occur while encoding or decoding protocol frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The trailing checksum byte does not match the payload.
    #[error("checksum mismatch (expected {expected:#04x}, found {found:#04x})")]
    ChecksumMismatch { expected: u8, found: u8 },

    /// Bytes had to be discarded before a start delimiter was found.
    #[error("stream desynchronized ({discarded} byte(s) discarded)")]
    Desync { discarded: usize },

    /// No end delimiter appeared within the maximum frame length.
    #[error("frame exceeds {max} bytes without an end delimiter")]
    FrameTooLong { max: usize },

    /// The frame is too short to carry a command byte and a checksum.
    #[error("frame too short ({len} byte(s))")]
    Runt { len: usize },

    /// A field did not decode as its expected wire representation.
    #[error("malformed {field} field (byte {byte:#04x})")]
    Malformed { field: &'static str, byte: u8 },

    /// The payload ended before all expected fields were read.
    #[error("truncated payload while reading {field}")]
    Truncated { field: &'static str },

    /// The leading payload byte is not a known command.
    #[error("unknown command byte {byte:#04x}")]
    UnknownCommand { byte: u8 },

    /// A response carried a different command byte than expected.
    #[error("unexpected command byte {found:#04x} (expected {expected:#04x})")]
    UnexpectedCommand { expected: u8, found: u8 },

    /// Fields remained after a complete payload was parsed.
    #[error("{remaining} trailing byte(s) after payload")]
    TrailingBytes { remaining: usize },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
