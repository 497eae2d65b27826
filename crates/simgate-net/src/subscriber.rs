//! # simgate-net::subscriber
//!
//! The subscriber runtime: one worker thread per input channel, owning a
//! TCP client socket, a reassembly buffer, a per-packet deadline, and the
//! reconnection loop. Decoded values fill a `PartialEvent` along the
//! channel's port template; fully populated or timed-out events are
//! committed to the `EventSink`.
//!
//! Initialization errors (bad address, unreachable host) surface
//! synchronously from `init_and_start`. Transient receive failures are
//! recovered by reconnecting; only an exhausted retry run is reported,
//! once, through the error callback, after which the worker drains until
//! `terminate` is called.

use crate::codec::{decode_value, ParseOutcome};
use crate::partial::PartialEvent;
use bytes::{Buf, BytesMut};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use simgate_engine::sink::EventSink;
use simgate_types::channel::TransmissionChannel;
use simgate_types::config::ScopedTree;
use simgate_types::errors::{ConfigError, NetError};
use simgate_types::port::PortId;
use std::io::{ErrorKind, Read};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// The key of the channel/connection address property.
pub const PROP_ADDR: &str = "addr";
/// The key of the per-packet reassembly timeout (milliseconds).
pub const PROP_PACKET_TIMEOUT: &str = "packetTimeout";
/// The key of the reconnect back-off interval (milliseconds).
pub const PROP_RECONNECTION_INTERVAL: &str = "reconnectionInterval";
/// The key of the reconnect attempt count.
pub const PROP_RECONNECTION_RETRY_COUNT: &str = "reconnectionRetryCount";

const DEFAULT_RECONNECTION_INTERVAL_MS: u64 = 500;
const DEFAULT_RECONNECTION_RETRIES: u32 = 4;
/// How often a blocked read wakes up to observe control state.
const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Upper bound for the synchronous connect during initialization.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Single-shot callback reporting a permanent subscriber failure.
pub type ErrorCallback = Box<dyn FnOnce(NetError) + Send>;

/// A source of external events bound to one input channel.
pub trait Subscriber: Send {
    /// Validates the configuration, connects synchronously, and starts the
    /// worker thread.
    fn init_and_start(
        &mut self,
        channel: &TransmissionChannel,
        transport: &ScopedTree<'_>,
        sink: Arc<dyn EventSink>,
        on_error: ErrorCallback,
    ) -> Result<(), ConfigError>;

    /// Cancels pending I/O and joins the worker. Nothing reaches the sink
    /// after this returns. Safe to call repeatedly.
    fn terminate(&mut self);
}

/// TCP client subscriber speaking the compact IEC 61499 encoding.
#[derive(Default)]
pub struct Asn1TcpSubscriber {
    worker: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    shutdown_tx: Option<Sender<()>>,
    socket: Arc<Mutex<Option<TcpStream>>>,
}

impl Asn1TcpSubscriber {
    /// The protocol identifier in the channel configuration.
    pub const SUBSCRIBER_ID: &'static str = "CompactASN.1-TCP";

    pub fn new() -> Self {
        Self::default()
    }
}

impl Subscriber for Asn1TcpSubscriber {
    fn init_and_start(
        &mut self,
        channel: &TransmissionChannel,
        transport: &ScopedTree<'_>,
        sink: Arc<dyn EventSink>,
        on_error: ErrorCallback,
    ) -> Result<(), ConfigError> {
        if channel.ports().is_empty() {
            return Err(ConfigError::Message(format!(
                "input channel `{}` has no associated ports",
                channel.channel_id()
            )));
        }

        let addr_key = transport.key(PROP_ADDR);
        let addr = transport.require_str(PROP_ADDR)?.to_string();
        let (host, port) = host_and_port(&addr, &addr_key)?;
        let packet_timeout = transport
            .parse::<u64>(PROP_PACKET_TIMEOUT)?
            .map(Duration::from_millis);
        let reconnect_interval = Duration::from_millis(
            transport.parse_or(PROP_RECONNECTION_INTERVAL, DEFAULT_RECONNECTION_INTERVAL_MS)?,
        );
        let reconnect_retries =
            transport.parse_or(PROP_RECONNECTION_RETRY_COUNT, DEFAULT_RECONNECTION_RETRIES)?;

        let stream = connect_once(&host, port, CONNECT_TIMEOUT)
            .map_err(|err| ConfigError::entry(&addr_key, &addr, format!("cannot connect: {err}")))?;
        debug!(channel = channel.channel_id(), %addr, "subscriber connected");

        self.stop = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        self.shutdown_tx = Some(shutdown_tx);
        *self.socket.lock().expect("socket slot poisoned") = stream.try_clone().ok();

        let worker = Worker {
            channel_id: channel.channel_id().to_string(),
            addr,
            host,
            port,
            template: channel.ports().to_vec(),
            sink,
            stop: Arc::clone(&self.stop),
            shutdown_rx,
            socket_slot: Arc::clone(&self.socket),
            packet_timeout,
            reconnect_interval,
            reconnect_retries,
            buf: BytesMut::with_capacity(4096),
            partial: None,
            deadline: None,
        };
        let thread_name = format!("subscriber-{}", channel.channel_id());
        self.worker = Some(
            std::thread::Builder::new()
                .name(thread_name)
                .spawn(move || worker.run(stream, on_error))?,
        );
        Ok(())
    }

    fn terminate(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Dropping the sender interrupts back-off sleeps and draining.
        self.shutdown_tx.take();
        if let Some(socket) = self.socket.lock().expect("socket slot poisoned").take() {
            let _ = socket.shutdown(Shutdown::Both);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("subscriber worker panicked");
            }
        }
    }
}

impl Drop for Asn1TcpSubscriber {
    fn drop(&mut self) {
        if self.worker.is_some() {
            warn!("subscriber was not terminated regularly; terminating now");
            self.terminate();
        }
    }
}

/// The state owned by the worker thread.
struct Worker {
    channel_id: String,
    addr: String,
    host: String,
    port: u16,
    template: Vec<PortId>,
    sink: Arc<dyn EventSink>,
    stop: Arc<AtomicBool>,
    shutdown_rx: Receiver<()>,
    socket_slot: Arc<Mutex<Option<TcpStream>>>,
    packet_timeout: Option<Duration>,
    reconnect_interval: Duration,
    reconnect_retries: u32,
    buf: BytesMut,
    partial: Option<PartialEvent>,
    deadline: Option<Instant>,
}

impl Worker {
    fn run(mut self, mut stream: TcpStream, on_error: ErrorCallback) {
        let result = self.receive_loop(&mut stream);
        self.socket_slot.lock().expect("socket slot poisoned").take();
        match result {
            Ok(()) => debug!(channel = %self.channel_id, "subscriber worker exited"),
            Err(err) if self.stop.load(Ordering::Relaxed) => {
                debug!(%err, "suppressing network error raised during termination");
            }
            Err(err) => {
                error!(%err, channel = %self.channel_id, "subscriber failed permanently");
                on_error(err);
                // Drain until terminate() is called.
                let _ = self.shutdown_rx.recv();
            }
        }
    }

    fn receive_loop(&mut self, stream: &mut TcpStream) -> Result<(), NetError> {
        let mut chunk = [0u8; 4096];
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(());
            }
            stream
                .set_read_timeout(Some(self.poll_timeout()))
                .map_err(|err| self.io_error(err))?;
            match stream.read(&mut chunk) {
                Ok(0) => {
                    debug!(addr = %self.addr, "connection closed by the peer");
                    *stream = self.reconnect()?;
                }
                Ok(n) => {
                    if self.partial.is_none() {
                        self.start_packet();
                    }
                    self.buf.extend_from_slice(&chunk[..n]);
                    self.drain_buffer();
                }
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock
                        || err.kind() == ErrorKind::TimedOut => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(%err, addr = %self.addr, "receive failure");
                    *stream = self.reconnect()?;
                }
            }
            self.check_deadline();
        }
    }

    /// Parses as many values as the buffer allows, publishing every fully
    /// populated event. Best effort: unconvertible values and unknown tag
    /// bytes are skipped.
    fn drain_buffer(&mut self) {
        loop {
            let Some(partial) = self.partial.as_mut() else {
                return;
            };
            if !partial.has_remaining() {
                self.finish_packet();
                continue;
            }
            if self.buf.is_empty() {
                return;
            }
            match decode_value(&self.buf, partial.next_port_type()) {
                ParseOutcome::Ok { value, consumed } => {
                    partial.push_next(value);
                    self.buf.advance(consumed);
                }
                ParseOutcome::TypeMismatch { consumed } => {
                    debug!(
                        expected = %partial.next_port_type(),
                        "dropping an unconvertible value"
                    );
                    partial.ignore_next();
                    self.buf.advance(consumed);
                }
                ParseOutcome::InvalidTag => {
                    warn!(tag = self.buf[0], "skipping an unknown tag byte");
                    self.buf.advance(1);
                }
                ParseOutcome::Incomplete { needed } => {
                    trace!(needed, "awaiting more input");
                    return;
                }
            }
        }
    }

    /// Allocates a fresh partial event; its time-stamp is taken now and
    /// the packet deadline is armed.
    fn start_packet(&mut self) {
        self.partial = Some(PartialEvent::new(
            self.sink.timestamp_now(),
            self.template.clone(),
        ));
        self.deadline = self.packet_timeout.map(|t| Instant::now() + t);
    }

    /// Publishes the completed event and, if raw bytes remain, starts the
    /// next packet right away.
    fn finish_packet(&mut self) {
        if let Some(event) = self.partial.take() {
            trace!(%event, "publishing received event");
            self.sink.push_external(Box::new(event));
        }
        self.deadline = None;
        if !self.buf.is_empty() {
            self.start_packet();
        }
    }

    /// Commits the packet with whatever arrived when its deadline passed;
    /// the reassembly buffer is flushed and reception starts fresh.
    fn check_deadline(&mut self) {
        let expired = matches!(self.deadline, Some(d) if Instant::now() >= d);
        if !expired {
            return;
        }
        if let Some(event) = self.partial.take() {
            debug!(%event, "packet timeout; committing the partial event");
            self.sink.push_external(Box::new(event));
        }
        self.buf.clear();
        self.deadline = None;
    }

    fn poll_timeout(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(POLL_INTERVAL)
                .max(Duration::from_millis(1)),
            None => POLL_INTERVAL,
        }
    }

    /// Re-resolves the host and reconnects with back-off. Termination
    /// cancels the wait between attempts immediately.
    fn reconnect(&mut self) -> Result<TcpStream, NetError> {
        info!(addr = %self.addr, "trying to re-connect");
        for attempt in 1..=self.reconnect_retries {
            if self.stop.load(Ordering::Relaxed) {
                return Err(NetError::ConnectionClosed {
                    addr: self.addr.clone(),
                });
            }
            match connect_once(&self.host, self.port, self.reconnect_interval.max(CONNECT_TIMEOUT))
            {
                Ok(stream) => {
                    info!(addr = %self.addr, attempt, "re-connected");
                    *self.socket_slot.lock().expect("socket slot poisoned") =
                        stream.try_clone().ok();
                    return Ok(stream);
                }
                Err(err) => warn!(%err, attempt, "re-connection attempt failed"),
            }
            if attempt < self.reconnect_retries {
                info!(
                    interval_ms = self.reconnect_interval.as_millis() as u64,
                    "sleeping before the next re-connection attempt"
                );
                match self.shutdown_rx.recv_timeout(self.reconnect_interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        return Err(NetError::ConnectionClosed {
                            addr: self.addr.clone(),
                        });
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }
        }
        Err(NetError::ReconnectExhausted {
            addr: self.addr.clone(),
            attempts: self.reconnect_retries,
        })
    }

    fn io_error(&self, source: std::io::Error) -> NetError {
        NetError::Io {
            addr: self.addr.clone(),
            source,
        }
    }
}

/// Splits a `host:port` address. Empty, one-sided, and missing-colon forms
/// are configuration errors.
pub(crate) fn host_and_port(addr: &str, key: &str) -> Result<(String, u16), ConfigError> {
    let Some(colon) = addr.rfind(':') else {
        return Err(ConfigError::entry(
            key,
            addr,
            "invalid address, no port separator ':' found",
        ));
    };
    let (host, port_raw) = (&addr[..colon], &addr[colon + 1..]);
    if host.is_empty() || port_raw.is_empty() {
        return Err(ConfigError::entry(
            key,
            addr,
            "expected an address of the form host:port",
        ));
    }
    let port: u16 = port_raw
        .parse()
        .map_err(|_| ConfigError::entry(key, addr, "invalid port number"))?;
    Ok((host.to_string(), port))
}

/// Resolves the host and connects to the first reachable address.
pub(crate) fn connect_once(
    host: &str,
    port: u16,
    timeout: Duration,
) -> std::io::Result<TcpStream> {
    let addrs = (host, port).to_socket_addrs()?;
    let mut last = std::io::Error::new(ErrorKind::AddrNotAvailable, "no addresses resolved");
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last = err,
        }
    }
    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use simgate_engine::event::Event;
    use simgate_types::config::ConfigTree;
    use simgate_types::port::VarType;
    use simgate_types::time::SimTime;

    struct NullSink;

    impl EventSink for NullSink {
        fn push_external(&self, _ev: Box<dyn Event>) {}

        fn timestamp_now(&self) -> SimTime {
            0.0
        }
    }

    fn channel_with_port(entries: &[(&str, &str)]) -> TransmissionChannel {
        let mut tree = ConfigTree::new();
        for (key, value) in entries {
            tree.set(key, *value).unwrap();
        }
        let mut channel = TransmissionChannel::new("in.0", tree);
        channel.push_port(
            simgate_types::port::PortId::new(VarType::Real, 0),
            ConfigTree::new(),
        );
        channel
    }

    #[test]
    fn address_splitting_rejects_malformed_forms() {
        for bad in ["", ":", ":4242", "localhost:", "localhost", "host:notaport"] {
            assert!(
                host_and_port(bad, "in.0.addr").is_err(),
                "address {bad:?} must be rejected"
            );
        }
        assert_eq!(
            host_and_port("localhost:4242", "in.0.addr").unwrap(),
            ("localhost".to_string(), 4242)
        );
    }

    #[test]
    fn missing_address_fails_synchronously() {
        let channel = channel_with_port(&[]);
        let mut subscriber = Asn1TcpSubscriber::new();
        let err = subscriber
            .init_and_start(
                &channel,
                &ScopedTree::new(channel.config(), "in.0"),
                Arc::new(NullSink),
                Box::new(|_| {}),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key } if key == "in.0.addr"));
    }

    #[test]
    fn unreachable_endpoint_fails_synchronously() {
        // Acquire a port that nothing is listening on.
        let free_port = {
            let probe = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
            probe.local_addr().unwrap().port()
        };
        let addr = format!("127.0.0.1:{free_port}");
        let channel = channel_with_port(&[("addr", addr.as_str())]);
        let mut subscriber = Asn1TcpSubscriber::new();
        let err = subscriber
            .init_and_start(
                &channel,
                &ScopedTree::new(channel.config(), "in.0"),
                Arc::new(NullSink),
                Box::new(|_| {}),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::Entry { key, .. } if key == "in.0.addr"));
    }

    #[test]
    fn channels_without_ports_are_rejected() {
        let channel = TransmissionChannel::new("in.0", ConfigTree::new());
        let mut subscriber = Asn1TcpSubscriber::new();
        let err = subscriber
            .init_and_start(
                &channel,
                &ScopedTree::new(channel.config(), "in.0"),
                Arc::new(NullSink),
                Box::new(|_| {}),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::Message(_)));
    }
}
