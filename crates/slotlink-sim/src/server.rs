//! TCP front end for the emulator.
//!
//! Speaks the delimited wire format over plain TCP so any number of clients
//! can exercise a shared [`MockControlUnit`] without hardware. The transport
//! factory reaches it through `socket://host:port` identifiers.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use slotlink_protocol::wire;

use crate::state::MockControlUnit;
use crate::Result;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const READ_POLL: Duration = Duration::from_millis(50);

/// Firmware update tools terminate their requests with `#` instead of the
/// regular end delimiter; the unit accepts either.
const ALT_END_DELIMITER: u8 = b'#';

/// Blocking TCP server around a [`MockControlUnit`].
pub struct CuServer {
    listener: TcpListener,
    unit: MockControlUnit,
}

impl CuServer {
    pub fn bind(addr: impl ToSocketAddrs, unit: MockControlUnit) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self { listener, unit })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts clients until `running` goes false, then joins the per-client
    /// threads.
    pub fn run(self, running: Arc<AtomicBool>) -> Result<()> {
        self.listener.set_nonblocking(true)?;
        info!(addr = %self.listener.local_addr()?, "control unit server listening");
        let mut clients: Vec<JoinHandle<()>> = Vec::new();
        while running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, "client connected");
                    let unit = self.unit.clone();
                    let flag = Arc::clone(&running);
                    let handle = thread::Builder::new()
                        .name("cu-client".into())
                        .spawn(move || {
                            if let Err(err) = serve_client(stream, unit, flag) {
                                debug!(%peer, %err, "client connection ended");
                            }
                        })?;
                    clients.push(handle);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    clients.retain(|client| !client.is_finished());
                    thread::sleep(ACCEPT_POLL);
                }
                Err(err) => return Err(err.into()),
            }
        }
        for client in clients {
            let _ = client.join();
        }
        Ok(())
    }

    /// Runs the accept loop on a background thread and hands back a handle
    /// that stops it.
    pub fn spawn(self) -> Result<ServerHandle> {
        let addr = self.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let worker = thread::Builder::new()
            .name("cu-server".into())
            .spawn(move || {
                if let Err(err) = self.run(flag) {
                    warn!(%err, "control unit server exited with error");
                }
            })?;
        Ok(ServerHandle {
            addr,
            running,
            worker: Some(worker),
        })
    }
}

/// Owner of a background [`CuServer`].
pub struct ServerHandle {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("control unit server thread panicked");
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve_client(
    mut stream: TcpStream,
    unit: MockControlUnit,
    running: Arc<AtomicBool>,
) -> Result<()> {
    stream.set_read_timeout(Some(READ_POLL))?;
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 256];
    while running.load(Ordering::SeqCst) {
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(read) => {
                buffer.extend_from_slice(&chunk[..read]);
                while let Some(request) = next_message(&mut buffer) {
                    if let Some(reply) = unit.handle_request(&request) {
                        let mut framed = Vec::with_capacity(reply.len() + 2);
                        framed.push(wire::START_DELIMITER);
                        framed.extend_from_slice(&reply);
                        framed.push(wire::END_DELIMITER);
                        stream.write_all(&framed)?;
                    }
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Pops the next delimited request out of `buffer`.
///
/// Bytes before the start delimiter are noise and are discarded; with no
/// start delimiter at all the whole buffer is dropped. Returns `None` while
/// the current request is still incomplete.
fn next_message(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let start = match buffer.iter().position(|&b| b == wire::START_DELIMITER) {
        Some(start) => start,
        None => {
            buffer.clear();
            return None;
        }
    };
    buffer.drain(..start);
    let end = buffer
        .iter()
        .position(|&b| b == wire::END_DELIMITER || b == ALT_END_DELIMITER)?;
    let message = buffer[1..end].to_vec();
    buffer.drain(..=end);
    Some(message)
}
