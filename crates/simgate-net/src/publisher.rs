//! # simgate-net::publisher
//!
//! Publishers ship selected event variables over the network. Every
//! publisher buffers the last value of each of its channel's ports
//! (starting at the type's zero); whenever a delivered event touches any
//! of them, the entire frame is re-encoded with the compact IEC 61499
//! rules and sent atomically over the channel's transport.

use crate::codec::{encode_value, WireType};
use bytes::BytesMut;
use fxhash::FxHashMap;
use simgate_engine::event::{Event, EventListener};
use simgate_types::channel::TransmissionChannel;
use simgate_types::config::ScopedTree;
use simgate_types::errors::{ConfigError, DispatchError, NetError};
use simgate_types::port::PortId;
use simgate_types::variable::Variable;
use std::net::{TcpStream, UdpSocket};
use std::io::Write;
use tracing::{debug, trace, warn};

use crate::subscriber::{connect_once, host_and_port, PROP_ADDR};

/// The key of the per-port wire type override.
pub const PROP_ENCODING: &str = "encoding";

/// The buffered output state of one channel plus its wire types.
///
/// Wire types are fixed at configuration time: each port uses its
/// configured `encoding` or the loss-minimizing default, and inadmissible
/// casts fail construction.
#[derive(Debug)]
pub(crate) struct OutputFrame {
    variables: Vec<Variable>,
    wire_types: Vec<WireType>,
    index: FxHashMap<PortId, usize>,
}

impl OutputFrame {
    pub(crate) fn from_channel(channel: &TransmissionChannel) -> Result<Self, ConfigError> {
        let mut variables = Vec::new();
        let mut wire_types = Vec::new();
        let mut index = FxHashMap::default();
        for (slot, (port, port_config)) in channel
            .ports()
            .iter()
            .zip(channel.port_configs())
            .enumerate()
        {
            let encoding_key = format!("{}.{}.{}", channel.channel_id(), slot, PROP_ENCODING);
            let wire = match port_config.get_str(PROP_ENCODING) {
                Some(name) => WireType::parse(name).ok_or_else(|| {
                    ConfigError::entry(&encoding_key, name, "the encoding type is not supported")
                })?,
                None => WireType::default_for(port.ty).ok_or_else(|| {
                    ConfigError::Message(format!(
                        "cannot publish the untyped variable at port {slot} of channel `{}`",
                        channel.channel_id()
                    ))
                })?,
            };
            if !wire.accepts(port.ty) {
                return Err(ConfigError::entry(
                    &encoding_key,
                    wire.name(),
                    format!("cannot convert a {} variable to {}", port.ty, wire.name()),
                ));
            }
            index.insert(*port, variables.len());
            variables.push(Variable::zeroed(*port));
            wire_types.push(wire);
        }
        Ok(Self {
            variables,
            wire_types,
            index,
        })
    }

    /// Folds the event's variables into the buffered state. Returns `true`
    /// when the frame touched at least one of the channel's ports.
    pub(crate) fn update(&mut self, vars: &[Variable]) -> bool {
        let mut updated = false;
        for var in vars {
            if let Some(&slot) = self.index.get(&var.id) {
                self.variables[slot] = var.clone();
                updated = true;
            }
        }
        updated
    }

    /// Encodes the whole frame in port order.
    pub(crate) fn encode(&self, buf: &mut BytesMut) -> Result<(), DispatchError> {
        for (var, wire) in self.variables.iter().zip(&self.wire_types) {
            encode_value(buf, *wire, &var.value)?;
        }
        Ok(())
    }
}

/// Publisher sending one UDP datagram per frame.
pub struct Asn1UdpPublisher {
    frame: OutputFrame,
    socket: UdpSocket,
    addr: String,
    buf: BytesMut,
}

impl Asn1UdpPublisher {
    /// The protocol identifier in the channel configuration.
    pub const PUBLISHER_ID: &'static str = "CompactASN.1-UDP";

    /// Builds the frame, validates the casts, and opens the socket.
    pub fn connect(
        channel: &TransmissionChannel,
        transport: &ScopedTree<'_>,
    ) -> Result<Self, ConfigError> {
        let frame = OutputFrame::from_channel(channel)?;
        let addr_key = transport.key(PROP_ADDR);
        let addr = transport.require_str(PROP_ADDR)?.to_string();
        let (host, port) = host_and_port(&addr, &addr_key)?;
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect((host.as_str(), port)).map_err(|err| {
            ConfigError::entry(&addr_key, &addr, format!("cannot resolve the endpoint: {err}"))
        })?;
        debug!(channel = channel.channel_id(), %addr, "UDP publisher ready");
        Ok(Self {
            frame,
            socket,
            addr,
            buf: BytesMut::new(),
        })
    }
}

impl EventListener for Asn1UdpPublisher {
    fn event_triggered(&mut self, ev: &mut dyn Event) -> Result<(), DispatchError> {
        let vars = ev.variables()?;
        if !self.frame.update(&vars) {
            return Ok(());
        }
        self.buf.clear();
        self.frame.encode(&mut self.buf)?;
        match self.socket.send(&self.buf) {
            Ok(sent) if sent < self.buf.len() => {
                warn!(
                    sent,
                    len = self.buf.len(),
                    addr = %self.addr,
                    "short datagram write"
                );
            }
            Ok(_) => trace!(len = self.buf.len(), addr = %self.addr, "datagram sent"),
            Err(err) => {
                return Err(NetError::Io {
                    addr: self.addr.clone(),
                    source: err,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Publisher writing concatenated frames onto a TCP connection.
pub struct Asn1TcpPublisher {
    frame: OutputFrame,
    stream: TcpStream,
    addr: String,
    buf: BytesMut,
}

impl Asn1TcpPublisher {
    /// The protocol identifier in the channel configuration.
    pub const PUBLISHER_ID: &'static str = "CompactASN.1-TCP";

    /// Builds the frame, validates the casts, and connects synchronously.
    pub fn connect(
        channel: &TransmissionChannel,
        transport: &ScopedTree<'_>,
    ) -> Result<Self, ConfigError> {
        let frame = OutputFrame::from_channel(channel)?;
        let addr_key = transport.key(PROP_ADDR);
        let addr = transport.require_str(PROP_ADDR)?.to_string();
        let (host, port) = host_and_port(&addr, &addr_key)?;
        let stream = connect_once(&host, port, std::time::Duration::from_secs(5))
            .map_err(|err| ConfigError::entry(&addr_key, &addr, format!("cannot connect: {err}")))?;
        debug!(channel = channel.channel_id(), %addr, "TCP publisher connected");
        Ok(Self {
            frame,
            stream,
            addr,
            buf: BytesMut::new(),
        })
    }
}

impl EventListener for Asn1TcpPublisher {
    fn event_triggered(&mut self, ev: &mut dyn Event) -> Result<(), DispatchError> {
        let vars = ev.variables()?;
        if !self.frame.update(&vars) {
            return Ok(());
        }
        self.buf.clear();
        self.frame.encode(&mut self.buf)?;
        // TCP frames must leave in full; a failed stream aborts the run.
        self.stream.write_all(&self.buf).map_err(|err| NetError::Io {
            addr: self.addr.clone(),
            source: err,
        })?;
        trace!(len = self.buf.len(), addr = %self.addr, "frame written");
        Ok(())
    }
}
