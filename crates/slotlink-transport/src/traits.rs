use std::time::Duration;

use slotlink_protocol::Frame;

use crate::error::Result;

/// Blocking, frame-oriented connection to a control unit.
///
/// `send` takes a finished payload (command, data, checksum) and applies the
/// medium's own framing; `recv` hands back the next validated frame. One
/// request/response exchange at a time: callers serialize access.
pub trait Connection: Send {
    /// Deliver one request payload.
    fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for the next complete, validated frame.
    ///
    /// Fails with [`TransportError::Timeout`] when nothing arrives in time
    /// and [`TransportError::Closed`] once the connection is gone.
    ///
    /// [`TransportError::Timeout`]: crate::TransportError::Timeout
    /// [`TransportError::Closed`]: crate::TransportError::Closed
    fn recv(&mut self, timeout: Duration) -> Result<Frame>;

    /// Tear the connection down, unblocking any pending receive.
    fn close(&mut self) -> Result<()>;
}
