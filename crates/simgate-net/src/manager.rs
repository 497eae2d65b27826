//! # simgate-net::manager
//!
//! Instantiates and wires the network side: one publisher per output
//! channel registered as a dispatcher listener, one subscriber per input
//! channel feeding the dispatcher's event sink. Channels name their
//! protocol and either carry the transport parameters themselves
//! (implicit connection) or reference a `connection.<id>` subtree.
//!
//! Subscriber failures cross threads through the dispatcher's pending
//! error slot; the manager's shutdown terminates every subscriber and
//! joins its worker.

use crate::publisher::{Asn1TcpPublisher, Asn1UdpPublisher};
use crate::subscriber::{Asn1TcpSubscriber, ErrorCallback, Subscriber};
use simgate_engine::dispatcher::EventDispatcher;
use simgate_engine::event::EventListener;
use simgate_types::channel::{ChannelMapping, TransmissionChannel, PROP_CONNECTION};
use simgate_types::config::{ConfigTree, ScopedTree};
use simgate_types::errors::ConfigError;
use tracing::{debug, info};

/// The key of a channel's protocol identifier.
pub const PROP_PROTOCOL: &str = "protocol";
/// The subtree holding explicit connection definitions.
pub const PROP_CONNECTION_SUBTREE: &str = "connection";

/// Owns the subscribers and builds the publishers of a process.
pub struct NetworkManager {
    subscribers: Vec<Box<dyn Subscriber>>,
}

impl std::fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkManager")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl NetworkManager {
    /// Creates and starts all publishers and subscribers.
    ///
    /// Publishers are registered as dispatcher listeners in channel
    /// order. Every subscriber reports a permanent failure through the
    /// dispatcher's pending-error slot exactly once.
    pub fn new(
        config: &ConfigTree,
        in_map: &ChannelMapping,
        out_map: &ChannelMapping,
        dispatcher: &mut EventDispatcher,
    ) -> Result<Self, ConfigError> {
        validate_connection_ids(config)?;

        for channel in out_map.channels() {
            let transport = resolve_transport(config, channel)?;
            let protocol = transport.require_str(PROP_PROTOCOL)?;
            let listener: Box<dyn EventListener> = match protocol {
                Asn1UdpPublisher::PUBLISHER_ID => {
                    Box::new(Asn1UdpPublisher::connect(channel, &transport)?)
                }
                Asn1TcpPublisher::PUBLISHER_ID => {
                    Box::new(Asn1TcpPublisher::connect(channel, &transport)?)
                }
                other => {
                    return Err(ConfigError::entry(
                        transport.key(PROP_PROTOCOL),
                        other,
                        "unknown protocol",
                    ));
                }
            };
            debug!(channel = channel.channel_id(), protocol, "publisher registered");
            dispatcher.add_listener(listener);
        }

        let mut subscribers: Vec<Box<dyn Subscriber>> = Vec::new();
        for channel in in_map.channels() {
            let transport = resolve_transport(config, channel)?;
            let protocol = transport.require_str(PROP_PROTOCOL)?;
            if protocol != Asn1TcpSubscriber::SUBSCRIBER_ID {
                return Err(ConfigError::entry(
                    transport.key(PROP_PROTOCOL),
                    protocol,
                    "unknown protocol",
                ));
            }
            let pending = dispatcher.pending_error();
            let on_error: ErrorCallback = Box::new(move |err| pending.raise(err.into()));
            let mut subscriber = Asn1TcpSubscriber::new();
            subscriber.init_and_start(channel, &transport, dispatcher.sink(), on_error)?;
            debug!(channel = channel.channel_id(), protocol, "subscriber started");
            subscribers.push(Box::new(subscriber));
        }

        Ok(Self { subscribers })
    }

    /// Terminates every subscriber and joins its worker thread.
    pub fn shutdown(&mut self) {
        if !self.subscribers.is_empty() {
            info!(count = self.subscribers.len(), "terminating subscribers");
        }
        for subscriber in &mut self.subscribers {
            subscriber.terminate();
        }
        self.subscribers.clear();
    }
}

impl Drop for NetworkManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The configuration subtree a channel's transport parameters live in:
/// the referenced `connection.<id>` subtree, or the channel itself for
/// implicit connections.
fn resolve_transport<'a>(
    config: &'a ConfigTree,
    channel: &'a TransmissionChannel,
) -> Result<ScopedTree<'a>, ConfigError> {
    if channel.is_implicit_connection() {
        return Ok(channel.scoped_config());
    }
    let id = channel.connection_id()?;
    let path = format!("{PROP_CONNECTION_SUBTREE}.{id}");
    let node = config.node(&path).ok_or_else(|| {
        ConfigError::entry(
            format!("{}.{}", channel.channel_id(), PROP_CONNECTION),
            &id,
            "unknown connection reference",
        )
    })?;
    Ok(ScopedTree::new(node, path))
}

/// Explicit connection ids must not collide with the reserved implicit
/// namespace, which is prefixed with a dot.
fn validate_connection_ids(config: &ConfigTree) -> Result<(), ConfigError> {
    let Some(connections) = config.node(PROP_CONNECTION_SUBTREE) else {
        return Ok(());
    };
    for (id, _) in connections.children() {
        if id.starts_with('.') {
            return Err(ConfigError::entry(
                format!("{PROP_CONNECTION_SUBTREE}.{id}"),
                id,
                "connection ids starting with '.' are reserved for implicit connections",
            ));
        }
    }
    Ok(())
}
