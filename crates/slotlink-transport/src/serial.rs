use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::{DataBits, Parity, SerialPort, StopBits};
use slotlink_protocol::{encode_frame, Decoder, Frame};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::Connection;

/// Control units talk at a fixed 19200 baud, 8 data bits, no parity, 1 stop
/// bit.
pub const BAUD_RATE: u32 = 19_200;

/// Granularity of the inner read loop; `recv` honors its own deadline.
const READ_SLICE: Duration = Duration::from_millis(50);

/// Wired connection through a serial port or USB adapter.
#[derive(Debug)]
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    decoder: Decoder,
    closed: bool,
}

impl SerialConnection {
    /// Open and configure the port at `path` (e.g. `/dev/ttyUSB0`, `COM3`).
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(READ_SLICE)
            .open()?;
        debug!(path, baud = BAUD_RATE, "serial port open");
        Ok(Self {
            port,
            decoder: Decoder::new(),
            closed: false,
        })
    }
}

impl Connection for SerialConnection {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let wire = encode_frame(payload);
        self.port.write_all(&wire)?;
        self.port.flush()?;
        trace!(len = wire.len(), "frame written to serial port");
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
            self.port.set_timeout(remaining.min(READ_SLICE))?;
            match self.port.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed),
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
            debug!("serial connection closed");
        }
        Ok(())
    }
}
