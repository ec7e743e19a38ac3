use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};

use slotlink_protocol::{encode_frame, Decoder, Frame};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::Connection;

/// Granularity of the inner read loop; `recv` honors its own deadline.
const READ_SLICE: Duration = Duration::from_millis(50);

/// TCP connection to a control unit server (`socket://host:port`).
///
/// The stream carries the same `"`-to-`$` framing as the serial link.
pub struct TcpConnection {
    stream: TcpStream,
    decoder: Decoder,
    closed: bool,
}

impl TcpConnection {
    /// Connect to `addr` (`host:port`).
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        debug!(addr, "tcp connection established");
        Ok(Self {
            stream,
            decoder: Decoder::new(),
            closed: false,
        })
    }

    /// A handle that can close this connection from another thread,
    /// unblocking a pending `recv`.
    pub fn shutdown_handle(&self) -> Result<TcpShutdown> {
        Ok(TcpShutdown {
            stream: self.stream.try_clone()?,
        })
    }
}

impl Connection for TcpConnection {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let wire = encode_frame(payload);
        self.stream.write_all(&wire)?;
        trace!(len = wire.len(), "frame written to tcp stream");
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Frame> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 64];
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                trace!(command = frame.command(), "frame received");
                return Ok(frame);
            }
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => return Err(TransportError::Timeout(timeout)),
            };
            self.stream.set_read_timeout(Some(remaining.min(READ_SLICE)))?;
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.closed = true;
                    return Err(TransportError::Closed);
                }
                Ok(n) => self.decoder.feed(&chunk[..n]),
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.decoder.clear();
            // Both directions, so a blocked reader on a cloned handle wakes.
            let _ = self.stream.shutdown(Shutdown::Both);
            debug!("tcp connection closed");
        }
        Ok(())
    }
}

/// Cloneable closer for a [`TcpConnection`].
pub struct TcpShutdown {
    stream: TcpStream,
}

impl TcpShutdown {
    /// Shut the connection down; a blocked `recv` fails with `Closed`.
    pub fn close(&self) -> Result<()> {
        self.stream.shutdown(Shutdown::Both)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[test]
    fn recv_returns_a_served_frame() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];
            let n = peer.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"\"??$");
            peer.write_all(b"\"053372$").unwrap();
        });

        let mut conn = TcpConnection::connect(&addr).unwrap();
        conn.send(b"??").unwrap();
        let frame = conn.recv(Duration::from_secs(2)).unwrap();
        assert_eq!(frame.command(), b'0');
        assert_eq!(frame.body(), b"05337");
        server.join().unwrap();
    }

    #[test]
    fn recv_times_out_when_peer_is_silent() {
        let (listener, addr) = listener();
        let _guard = thread::spawn(move || {
            let peer = listener.accept();
            thread::sleep(Duration::from_millis(500));
            drop(peer);
        });

        let mut conn = TcpConnection::connect(&addr).unwrap();
        let start = Instant::now();
        let err = conn.recv(Duration::from_millis(120)).unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn recv_reports_closed_when_peer_disconnects() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (peer, _) = listener.accept().unwrap();
            drop(peer);
        });

        let mut conn = TcpConnection::connect(&addr).unwrap();
        server.join().unwrap();
        let err = conn.recv(Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn concurrent_close_unblocks_a_pending_recv() {
        let (listener, addr) = listener();
        let _hold = thread::spawn(move || {
            let peer = listener.accept();
            thread::sleep(Duration::from_secs(2));
            drop(peer);
        });

        let mut conn = TcpConnection::connect(&addr).unwrap();
        let shutdown = conn.shutdown_handle().unwrap();

        let reader = thread::spawn(move || {
            let start = Instant::now();
            let result = conn.recv(Duration::from_secs(5));
            (result, start.elapsed())
        });

        thread::sleep(Duration::from_millis(50));
        shutdown.close().unwrap();

        let (result, elapsed) = reader.join().unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
        assert!(elapsed < Duration::from_secs(2), "recv did not unblock");
    }

    #[test]
    fn garbage_from_peer_surfaces_as_protocol_error() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            peer.write_all(b"noise\"053372$").unwrap();
        });

        let mut conn = TcpConnection::connect(&addr).unwrap();
        server.join().unwrap();
        let err = conn.recv(Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
        // After resynchronization the stream is usable again.
        let frame = conn.recv(Duration::from_secs(2)).unwrap();
        assert_eq!(frame.command(), b'0');
    }
}
