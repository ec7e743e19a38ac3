//! Bluetooth LE transport for the AppConnect adapter.
//!
//! btleplug's API is asynchronous while [`Connection`] is blocking, so the
//! connection runs a dedicated worker thread with a single-threaded tokio
//! runtime. The worker owns the peripheral and bridges it to the caller
//! through two bounded queues: commands flow in, decoded frames (or errors)
//! flow out. Dropping the command channel shuts the worker down, which in
//! turn disconnects the peripheral and wakes any blocked `recv`.
//!
//! Framing differs from the serial wire: writes carry the payload plus the
//! end delimiter only, and each notification holds one complete frame,
//! sometimes with a leading start delimiter.

use std::pin::Pin;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::{Duration, Instant};

use btleplug::api::{
    BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Manager, Peripheral};
use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use slotlink_protocol::{wire, Frame, ProtocolError};

use crate::error::{Result, TransportError};
use crate::traits::Connection;

/// GATT service advertised by the AppConnect adapter.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x39df7777_b1b4_b90b_57f1_7144ae4e4a6a);
/// Characteristic requests are written to.
pub const WRITE_UUID: Uuid = Uuid::from_u128(0x39df8888_b1b4_b90b_57f1_7144ae4e4a6a);
/// Characteristic the control unit notifies responses on.
pub const NOTIFY_UUID: Uuid = Uuid::from_u128(0x39df9999_b1b4_b90b_57f1_7144ae4e4a6a);

const COMMAND_QUEUE: usize = 32;
const EVENT_QUEUE: usize = 64;
const SCAN_POLL: Duration = Duration::from_millis(200);
/// Extra slack past the scan deadline for connect and service discovery.
const READY_GRACE: Duration = Duration::from_secs(5);

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// Settings for [`BleConnection::open`].
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// How long to scan for the peripheral before giving up.
    pub connect_timeout: Duration,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl BleConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[derive(Debug)]
enum WorkerCommand {
    Write(Vec<u8>),
    Shutdown,
}

#[derive(Debug)]
enum WorkerEvent {
    Frame(Frame),
    Error(TransportError),
}

/// Blocking connection to a control unit over Bluetooth LE.
pub struct BleConnection {
    commands: Option<tokio_mpsc::Sender<WorkerCommand>>,
    events: std_mpsc::Receiver<WorkerEvent>,
    worker: Option<thread::JoinHandle<()>>,
    closed: bool,
}

impl BleConnection {
    /// Connects to the peripheral with MAC address `address`.
    ///
    /// Scans for a peripheral advertising [`SERVICE_UUID`] until the
    /// configured timeout, then connects, discovers the two AppConnect
    /// characteristics and subscribes to notifications. Does not return
    /// until the link is usable or setup has failed.
    pub fn open(address: &str, config: BleConfig) -> Result<Self> {
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (command_tx, command_rx) = tokio_mpsc::channel(COMMAND_QUEUE);
        let (event_tx, event_rx) = std_mpsc::sync_channel(EVENT_QUEUE);

        let target = address.to_owned();
        let worker_config = config.clone();
        let worker = thread::Builder::new()
            .name("slotlink-ble".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = ready_tx.send(Err(TransportError::Io(err)));
                        return;
                    }
                };
                runtime.block_on(worker_loop(
                    target,
                    worker_config,
                    command_rx,
                    event_tx,
                    ready_tx,
                ));
            })?;

        match ready_rx.recv_timeout(config.connect_timeout + READY_GRACE) {
            Ok(Ok(())) => Ok(Self {
                commands: Some(command_tx),
                events: event_rx,
                worker: Some(worker),
                closed: false,
            }),
            Ok(Err(err)) => {
                drop(command_tx);
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                // Worker is stuck in the bluetooth stack or panicked. Drop
                // the command channel so it winds down whenever it recovers.
                warn!(%address, "ble setup did not complete in time");
                drop(command_tx);
                Err(TransportError::Timeout(config.connect_timeout))
            }
        }
    }

    /// Handle that can shut this connection down from another thread,
    /// unblocking a `recv` in progress.
    pub fn shutdown_handle(&self) -> Result<BleShutdown> {
        match &self.commands {
            Some(commands) => Ok(BleShutdown {
                commands: commands.clone(),
            }),
            None => Err(TransportError::Closed),
        }
    }

    #[cfg(test)]
    fn from_parts(
        commands: tokio_mpsc::Sender<WorkerCommand>,
        events: std_mpsc::Receiver<WorkerEvent>,
        worker: Option<thread::JoinHandle<()>>,
    ) -> Self {
        Self {
            commands: Some(commands),
            events,
            worker,
            closed: false,
        }
    }
}

impl Connection for BleConnection {
    fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let delivered = match &self.commands {
            Some(commands) => commands
                .blocking_send(WorkerCommand::Write(payload.to_vec()))
                .is_ok(),
            None => false,
        };
        if !delivered {
            self.closed = true;
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Frame> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.events.recv_timeout(timeout) {
            Ok(WorkerEvent::Frame(frame)) => Ok(frame),
            Ok(WorkerEvent::Error(err)) => Err(err),
            Err(std_mpsc::RecvTimeoutError::Timeout) => Err(TransportError::Timeout(timeout)),
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                self.closed = true;
                Err(TransportError::Closed)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(commands) = self.commands.take() {
            let _ = commands.try_send(WorkerCommand::Shutdown);
            drop(commands);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("ble worker panicked during shutdown");
            }
        }
        Ok(())
    }
}

impl Drop for BleConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Clonable shutdown handle for a [`BleConnection`].
#[derive(Clone)]
pub struct BleShutdown {
    commands: tokio_mpsc::Sender<WorkerCommand>,
}

impl BleShutdown {
    /// Asks the worker to disconnect. A blocked `recv` on the connection
    /// fails with [`TransportError::Closed`] once it exits. Infallible: if
    /// the worker is already gone the connection is closed anyway.
    pub fn close(&self) {
        let _ = self.commands.try_send(WorkerCommand::Shutdown);
    }
}

async fn worker_loop(
    address: String,
    config: BleConfig,
    mut commands: tokio_mpsc::Receiver<WorkerCommand>,
    events: std_mpsc::SyncSender<WorkerEvent>,
    ready: std_mpsc::SyncSender<Result<()>>,
) {
    let (peripheral, write_char, mut notifications) = match connect(&address, &config).await {
        Ok(parts) => parts,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        // open() gave up waiting; tear the link back down.
        let _ = peripheral.disconnect().await;
        return;
    }
    debug!(%address, "ble link established");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(WorkerCommand::Write(payload)) => {
                    let mut data = payload;
                    data.push(wire::END_DELIMITER);
                    trace!(len = data.len(), "ble write");
                    if let Err(err) = peripheral
                        .write(&write_char, &data, WriteType::WithoutResponse)
                        .await
                    {
                        if !forward(&events, WorkerEvent::Error(err.into())) {
                            break;
                        }
                    }
                }
                Some(WorkerCommand::Shutdown) | None => break,
            },
            notification = notifications.next() => match notification {
                Some(notification) => {
                    if notification.uuid != NOTIFY_UUID {
                        continue;
                    }
                    let event = match parse_notification(&notification.value) {
                        Ok(frame) => WorkerEvent::Frame(frame),
                        Err(err) => WorkerEvent::Error(err.into()),
                    };
                    if !forward(&events, event) {
                        break;
                    }
                }
                None => {
                    debug!("ble notification stream ended");
                    break;
                }
            },
        }
    }

    let _ = peripheral.disconnect().await;
    debug!(%address, "ble link closed");
}

/// Queues an event for the caller without blocking the runtime. Returns
/// false once the caller side is gone.
fn forward(events: &std_mpsc::SyncSender<WorkerEvent>, event: WorkerEvent) -> bool {
    match events.try_send(event) {
        Ok(()) => true,
        Err(std_mpsc::TrySendError::Full(event)) => {
            warn!(?event, "event queue full, dropping");
            true
        }
        Err(std_mpsc::TrySendError::Disconnected(_)) => false,
    }
}

async fn connect(
    address: &str,
    config: &BleConfig,
) -> Result<(Peripheral, Characteristic, NotificationStream)> {
    let target = BDAddr::from_str_delim(address).map_err(|_| TransportError::UnsupportedDevice {
        device: address.to_owned(),
    })?;

    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::DeviceNotFound {
            address: address.to_owned(),
        })?;

    debug!(%target, "scanning for control unit");
    adapter
        .start_scan(ScanFilter {
            services: vec![SERVICE_UUID],
        })
        .await?;
    let deadline = Instant::now() + config.connect_timeout;
    let peripheral = loop {
        let found = adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|peripheral| peripheral.address() == target);
        if let Some(peripheral) = found {
            break peripheral;
        }
        if Instant::now() >= deadline {
            let _ = adapter.stop_scan().await;
            return Err(TransportError::DeviceNotFound {
                address: address.to_owned(),
            });
        }
        tokio::time::sleep(SCAN_POLL).await;
    };
    let _ = adapter.stop_scan().await;

    peripheral.connect().await?;
    peripheral.discover_services().await?;
    let characteristics = peripheral.characteristics();
    let write_char = find_characteristic(&characteristics, WRITE_UUID)?;
    let notify_char = find_characteristic(&characteristics, NOTIFY_UUID)?;
    peripheral.subscribe(&notify_char).await?;
    let notifications = peripheral.notifications().await?;
    Ok((peripheral, write_char, notifications))
}

fn find_characteristic(
    characteristics: &std::collections::BTreeSet<Characteristic>,
    uuid: Uuid,
) -> Result<Characteristic> {
    characteristics
        .iter()
        .find(|characteristic| characteristic.uuid == uuid)
        .cloned()
        .ok_or(TransportError::CharacteristicMissing { uuid })
}

/// Decodes one notification into a frame. The adapter sends complete
/// payloads terminated by the end delimiter, with the start delimiter
/// present on some firmware revisions only.
fn parse_notification(raw: &[u8]) -> slotlink_protocol::Result<Frame> {
    let mut data = raw;
    if let Some((&first, rest)) = data.split_first() {
        if first == wire::START_DELIMITER {
            data = rest;
        }
    }
    match data.split_last() {
        Some((&wire::END_DELIMITER, payload)) => Frame::parse(payload.to_vec()),
        Some((&last, _)) => Err(ProtocolError::Malformed {
            field: "terminator",
            byte: last,
        }),
        None => Err(ProtocolError::Runt { len: 0 }),
    }
}
