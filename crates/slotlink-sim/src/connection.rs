use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

use slotlink_protocol::Frame;
use slotlink_transport::{Connection, TransportError};

use crate::state::MockControlUnit;

/// In-memory transport wired straight to a [`MockControlUnit`].
///
/// Lets client code run against the emulator with no socket or serial port
/// in between. Replies are produced synchronously by [`send`](Connection::send),
/// so a [`recv`](Connection::recv) on an empty queue fails with a timeout
/// immediately instead of waiting.
pub struct MockConnection {
    unit: MockControlUnit,
    queue: VecDeque<Bytes>,
    closed: bool,
}

impl MockConnection {
    pub fn new(unit: MockControlUnit) -> Self {
        Self {
            unit,
            queue: VecDeque::new(),
            closed: false,
        }
    }

    /// The emulator behind this connection.
    pub fn unit(&self) -> &MockControlUnit {
        &self.unit
    }
}

impl Connection for MockConnection {
    fn send(&mut self, payload: &[u8]) -> slotlink_transport::Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if let Some(reply) = self.unit.handle_request(payload) {
            self.queue.push_back(reply);
        }
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> slotlink_transport::Result<Frame> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.queue.pop_front() {
            Some(payload) => Frame::parse(payload).map_err(TransportError::from),
            None => Err(TransportError::Timeout(timeout)),
        }
    }

    fn close(&mut self) -> slotlink_transport::Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotlink_protocol::wire;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn send_queues_a_reply_for_recv() {
        let mut conn = MockConnection::new(MockControlUnit::new());
        conn.send(b"??").unwrap();
        let frame = conn.recv(TIMEOUT).unwrap();
        assert_eq!(frame.command(), wire::POLL);
        assert_eq!(frame.body()[1], wire::STATUS_MARKER);
    }

    #[test]
    fn recv_without_pending_reply_times_out() {
        let mut conn = MockConnection::new(MockControlUnit::new());
        match conn.recv(TIMEOUT) {
            Err(TransportError::Timeout(timeout)) => assert_eq!(timeout, TIMEOUT),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn closed_connection_rejects_both_directions() {
        let mut conn = MockConnection::new(MockControlUnit::new());
        conn.send(b"??").unwrap();
        conn.close().unwrap();
        assert!(matches!(conn.send(b"??"), Err(TransportError::Closed)));
        assert!(matches!(conn.recv(TIMEOUT), Err(TransportError::Closed)));
    }
}
