use slotlink_protocol::ProtocolError;
use slotlink_transport::TransportError;

/// Errors raised by [`ControlUnit`](crate::ControlUnit) operations.
#[derive(Debug, thiserror::Error)]
pub enum CuError {
    /// A command argument is outside its allowed range. Nothing was sent.
    #[error("{field} {value} out of range {min}..={max}")]
    InvalidArgument {
        field: &'static str,
        value: u16,
        min: u16,
        max: u16,
    },

    /// The connection failed while exchanging frames.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A response frame was valid but did not decode as its expected shape.
    #[error("response error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The control unit answered with a different command than requested.
    #[error("expected command {expected:?}, received {found:?}")]
    UnexpectedResponse { expected: char, found: char },
}

pub type Result<T> = std::result::Result<T, CuError>;
