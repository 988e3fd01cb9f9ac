use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    path::Path,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};

use crate::{Gt7Error, config::Gt7Config};

use super::{Snapshot, packet::decode_packet};

/// Heartbeat payload asking the console for the 296 byte packet.
const HEARTBEAT: &[u8] = b"A";
/// A connection is considered alive this long after the last packet.
const CONNECTED_WINDOW: Duration = Duration::from_secs(1);
const RECV_BUFFER_SIZE: usize = 4096;

/// TelemetryProducer is the source of snapshots for the collector.
///
/// Implementations exist for the live UDP stream of the console and for
/// replaying snapshots from memory or from a file.
pub trait TelemetryProducer {
    /// Prepare the producer. For the live producer this resolves the console
    /// address and binds the receive socket.
    ///
    /// # Errors
    ///
    /// Returns an error when the producer can never deliver data, e.g. the
    /// console address cannot be resolved or the port cannot be bound.
    fn start(&mut self) -> Result<(), Gt7Error>;

    /// Get the next accepted snapshot.
    ///
    /// `Ok(None)` means nothing usable arrived this time (timeout, noise,
    /// stale packet) and the caller should simply ask again.
    ///
    /// # Errors
    ///
    /// Returns [`Gt7Error::ProducerStopped`] once the producer was stopped and
    /// [`Gt7Error::ProducerExhausted`] when a replay has no data left.
    fn telemetry(&mut self) -> Result<Option<Snapshot>, Gt7Error>;
}

/// Control handle for a running producer, cheap to clone and usable from any
/// thread.
#[derive(Clone, Default)]
pub struct ConnectionHandle {
    stop: Arc<AtomicBool>,
    restart: Arc<AtomicBool>,
    last_received: Arc<Mutex<Option<Instant>>>,
}

impl ConnectionHandle {
    /// Ends the receive loop and closes the socket.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Rebuilds the socket, the receive loop keeps running.
    pub fn restart(&self) {
        self.restart.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// True when a snapshot was accepted within the last second.
    pub fn is_connected(&self) -> bool {
        self.last_received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|at| at.elapsed() <= CONNECTED_WINDOW)
    }

    fn take_restart(&self) -> bool {
        self.restart.swap(false, Ordering::SeqCst)
    }

    fn mark_received(&self) {
        *self
            .last_received
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }
}

/// Drops packets that are not newer than the last accepted one.
#[derive(Debug, Default, Clone)]
pub struct PackageFilter {
    last_accepted: i32,
}

impl PackageFilter {
    pub fn accept(&mut self, package_id: i32) -> bool {
        if package_id > self.last_accepted {
            self.last_accepted = package_id;
            true
        } else {
            false
        }
    }

    /// Forget the watermark, the console restarts its numbering after a
    /// silence.
    pub fn reset(&mut self) {
        self.last_accepted = 0;
    }
}

/// Receives the live telemetry stream of the console over UDP.
pub struct UdpTelemetryProducer {
    config: Gt7Config,
    target: Option<SocketAddr>,
    socket: Option<UdpSocket>,
    handle: ConnectionHandle,
    filter: PackageFilter,
    packets_since_heartbeat: usize,
}

impl UdpTelemetryProducer {
    pub fn new(config: Gt7Config) -> Self {
        Self {
            config,
            target: None,
            socket: None,
            handle: ConnectionHandle::default(),
            filter: PackageFilter::default(),
            packets_since_heartbeat: 0,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Address the receive socket is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn connect(&mut self) -> Result<(), Gt7Error> {
        let target = match self.target {
            Some(target) => target,
            None => {
                let target = self.config.heartbeat_target()?;
                self.target = Some(target);
                target
            }
        };

        let port = self.config.receive_port;
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .map_err(|e| Gt7Error::SocketBindError { port, source: e })?;
        if is_broadcast(&target) {
            socket
                .set_broadcast(true)
                .map_err(|e| Gt7Error::SocketConfigError { source: e })?;
        }
        socket
            .set_read_timeout(Some(Duration::from_millis(
                self.config.receive_timeout_ms.max(1),
            )))
            .map_err(|e| Gt7Error::SocketConfigError { source: e })?;

        info!(
            "Listening for telemetry on {:?}, console at {}",
            socket.local_addr().ok(),
            target
        );
        self.socket = Some(socket);
        self.filter.reset();
        self.packets_since_heartbeat = 0;
        self.send_heartbeat();
        Ok(())
    }

    fn send_heartbeat(&self) {
        if let (Some(socket), Some(target)) = (&self.socket, self.target) {
            match socket.send_to(HEARTBEAT, target) {
                Ok(_) => debug!("Heartbeat sent to {}", target),
                Err(e) => warn!("Could not send heartbeat to {}: {}", target, e),
            }
        }
    }

    /// Heartbeat after a timeout or receive error. The watermark is dropped so
    /// a console that restarted its packet numbering is accepted again.
    fn recover(&mut self) {
        self.send_heartbeat();
        self.packets_since_heartbeat = 0;
        self.filter.reset();
    }
}

impl TelemetryProducer for UdpTelemetryProducer {
    fn start(&mut self) -> Result<(), Gt7Error> {
        self.connect()
    }

    fn telemetry(&mut self) -> Result<Option<Snapshot>, Gt7Error> {
        if self.handle.is_stopped() {
            if self.socket.take().is_some() {
                info!("Telemetry connection stopped");
            }
            return Err(Gt7Error::ProducerStopped);
        }

        if self.handle.take_restart() {
            info!("Restarting telemetry connection");
            self.socket = None;
        }

        if self.socket.is_none() {
            if let Err(e) = self.connect() {
                error!(
                    "Error while connecting to {}:{}: {}",
                    self.config.playstation_ip, self.config.send_port, e
                );
                thread::sleep(Duration::from_millis(self.config.reconnect_wait_ms));
                return Ok(None);
            }
        }

        let Some(socket) = self.socket.as_ref() else {
            return Ok(None);
        };
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        match socket.recv_from(&mut buf) {
            Ok((len, _)) => {
                let Some(snapshot) = decode_packet(&buf[..len]) else {
                    return Ok(None);
                };
                if !self.filter.accept(snapshot.package_id) {
                    return Ok(None);
                }
                self.handle.mark_received();
                self.packets_since_heartbeat += 1;
                if self.packets_since_heartbeat >= self.config.heartbeat_interval_packets {
                    self.send_heartbeat();
                    self.packets_since_heartbeat = 0;
                }
                Ok(Some(snapshot))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                debug!("No telemetry received, sending heartbeat");
                self.recover();
                Ok(None)
            }
            Err(e) => {
                warn!("Error receiving telemetry: {}", e);
                self.recover();
                Ok(None)
            }
        }
    }
}

fn is_broadcast(target: &SocketAddr) -> bool {
    match target {
        SocketAddr::V4(addr) => addr.ip().is_broadcast() || addr.ip().octets()[3] == 255,
        SocketAddr::V6(_) => false,
    }
}

/// MockTelemetryProducer replays snapshots recorded earlier or generated by
/// tests, without a console on the network.
#[derive(Default)]
pub struct MockTelemetryProducer {
    cur_tick: usize,
    snapshots: Vec<Snapshot>,
}

impl MockTelemetryProducer {
    pub fn from_snapshots(snapshots: Vec<Snapshot>) -> Self {
        Self {
            cur_tick: 0,
            snapshots,
        }
    }

    /// Load snapshots from a JSON Lines file, one snapshot per line.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a line is not a
    /// valid snapshot.
    pub fn from_file(file: impl AsRef<Path>) -> Result<Self, Gt7Error> {
        let snapshots = serde_jsonlines::json_lines(file)
            .map_err(|e| Gt7Error::TelemetryProducerError {
                description: format!("Could not open telemetry file: {}", e),
            })?
            .collect::<Result<Vec<Snapshot>, std::io::Error>>()
            .map_err(|e| {
                error!("Could not parse JSON line: {}", e);
                Gt7Error::TelemetryProducerError {
                    description: format!("Could not parse JSON line: {}", e),
                }
            })?;
        Ok(Self::from_snapshots(snapshots))
    }
}

impl TelemetryProducer for MockTelemetryProducer {
    fn start(&mut self) -> Result<(), Gt7Error> {
        Ok(())
    }

    fn telemetry(&mut self) -> Result<Option<Snapshot>, Gt7Error> {
        let snapshot = self
            .snapshots
            .get(self.cur_tick)
            .cloned()
            .ok_or(Gt7Error::ProducerExhausted)?;
        self.cur_tick += 1;
        Ok(Some(snapshot))
    }
}
