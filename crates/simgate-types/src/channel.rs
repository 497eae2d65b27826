//! # simgate-types::channel
//!
//! Encapsulates the correlation of model variables and in-/output
//! channels. Every model variable has a configured name and a type-unique
//! `PortId` assigned by the channel mapping. Ports are grouped into
//! channels: a channel holds every port transmitted or received by one
//! protocol entity, for instance all variables of a single network packet.
//! The mapping does not specify the direction of the data flow, so it is
//! used for input and output channels alike.

use crate::config::{ConfigTree, ScopedTree};
use crate::errors::ConfigError;
use crate::port::{PortId, PortIdDrawer, VarType};
use std::fmt;

/// The key of the variable type property.
pub const PROP_TYPE: &str = "type";
/// The key of the connection reference property.
pub const PROP_CONNECTION: &str = "connection";

/// The metadata of a single channel: an ordered list of ports with their
/// configuration subtrees, plus the channel's own configuration root.
#[derive(Debug, Clone)]
pub struct TransmissionChannel {
    channel_id: String,
    config: ConfigTree,
    ports: Vec<PortId>,
    port_configs: Vec<ConfigTree>,
}

impl TransmissionChannel {
    pub fn new(channel_id: impl Into<String>, config: ConfigTree) -> Self {
        Self {
            channel_id: channel_id.into(),
            config,
            ports: Vec::new(),
            port_configs: Vec::new(),
        }
    }

    /// The unique lexical identifier of the channel, e.g. `in.0`.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// The configuration root of the channel.
    pub fn config(&self) -> &ConfigTree {
        &self.config
    }

    /// The channel configuration with error keys under the channel id.
    pub fn scoped_config(&self) -> ScopedTree<'_> {
        ScopedTree::new(&self.config, self.channel_id.clone())
    }

    /// The ordered list of associated ports.
    pub fn ports(&self) -> &[PortId] {
        &self.ports
    }

    /// Per-port configuration, parallel to `ports()`.
    pub fn port_configs(&self) -> &[ConfigTree] {
        &self.port_configs
    }

    /// Appends a port entry at the end of the channel.
    pub fn push_port(&mut self, id: PortId, port_config: ConfigTree) {
        self.ports.push(id);
        self.port_configs.push(port_config);
    }

    /// Whether the channel defines its connection implicitly, i.e. has no
    /// reference to an external connection configuration.
    pub fn is_implicit_connection(&self) -> bool {
        !self.config.has(PROP_CONNECTION)
    }

    /// The identifier of the channel's connection. Implicit connections
    /// are identified by the channel id prefixed with a dot; that prefix
    /// is reserved and never valid for explicit connection ids.
    pub fn connection_id(&self) -> Result<String, ConfigError> {
        match self.config.node(PROP_CONNECTION) {
            None => Ok(format!(".{}", self.channel_id)),
            Some(node) => match node.value() {
                Some(id) if !id.is_empty() => Ok(id.to_string()),
                _ => Err(ConfigError::entry(
                    format!("{}.{}", self.channel_id, PROP_CONNECTION),
                    "",
                    "the connection reference carries no identifier",
                )),
            },
        }
    }
}

/// The map from configured variable names to ports and channels.
///
/// For each variable type the mapping stores parallel name and id vectors;
/// a `(name, type)` pair occurring in several channels shares one port.
#[derive(Debug)]
pub struct ChannelMapping {
    names: Vec<Vec<String>>,
    ids: Vec<Vec<PortId>>,
    channels: Vec<TransmissionChannel>,
}

impl ChannelMapping {
    /// An empty mapping, used when the configuration subtree is absent.
    pub fn empty() -> Self {
        Self {
            names: vec![Vec::new(); VarType::COUNT],
            ids: vec![Vec::new(); VarType::COUNT],
            channels: Vec::new(),
        }
    }

    /// Builds the mapping from the `prefix` subtree of the configuration.
    ///
    /// Channels are the children `prefix.0`, `prefix.1`, … up to the first
    /// gap; variables inside a channel are numbered the same way. Each
    /// variable entry carries its name as the node data and an optional
    /// `type` code child; everything else below the entry is per-port
    /// configuration.
    pub fn from_config(
        drawer: &mut PortIdDrawer,
        config: &ConfigTree,
        prefix: &str,
    ) -> Result<Self, ConfigError> {
        let mut mapping = ChannelMapping::empty();
        let Some(subtree) = config.node(prefix) else {
            return Ok(mapping);
        };

        let mut channel_nr = 0usize;
        while let Some(channel_node) = subtree.node(&channel_nr.to_string()) {
            let channel_id = format!("{prefix}.{channel_nr}");
            let mut channel = TransmissionChannel::new(&channel_id, channel_node.clone());
            mapping.add_variables(drawer, channel_node, &mut channel, &channel_id)?;
            mapping.channels.push(channel);
            channel_nr += 1;
        }
        Ok(mapping)
    }

    fn add_variables(
        &mut self,
        drawer: &mut PortIdDrawer,
        channel_node: &ConfigTree,
        channel: &mut TransmissionChannel,
        channel_id: &str,
    ) -> Result<(), ConfigError> {
        let mut variable_nr = 0usize;
        while let Some(var_node) = channel_node.node(&variable_nr.to_string()) {
            let key = format!("{channel_id}.{variable_nr}");
            let name = match var_node.value() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => {
                    return Err(ConfigError::Message(format!(
                        "channel variable `{key}` does not specify a variable name"
                    )));
                }
            };

            let ty = match var_node.get_str(PROP_TYPE) {
                None => VarType::Unknown,
                Some(raw) => {
                    let code: usize = raw.parse().map_err(|_| {
                        ConfigError::entry(
                            format!("{key}.{PROP_TYPE}"),
                            raw,
                            "variable type code does not exist",
                        )
                    })?;
                    VarType::from_code(code).ok_or_else(|| {
                        ConfigError::entry(
                            format!("{key}.{PROP_TYPE}"),
                            raw,
                            "variable type code does not exist",
                        )
                    })?
                }
            };

            let id = match self.lookup(&name, ty) {
                Some(id) => id,
                None => {
                    let id = drawer.next_id(ty);
                    self.names[ty.code()].push(name);
                    self.ids[ty.code()].push(id);
                    id
                }
            };
            channel.push_port(id, var_node.clone());
            variable_nr += 1;
        }
        Ok(())
    }

    fn lookup(&self, name: &str, ty: VarType) -> Option<PortId> {
        let slot = ty.code();
        self.names[slot]
            .iter()
            .position(|n| n == name)
            .map(|i| self.ids[slot][i])
    }

    /// Every variable name of the given type, parallel to `variable_ids`.
    pub fn variable_names(&self, ty: VarType) -> &[String] {
        &self.names[ty.code()]
    }

    /// Every assigned port of the given type, parallel to `variable_names`.
    pub fn variable_ids(&self, ty: VarType) -> &[PortId] {
        &self.ids[ty.code()]
    }

    /// All variable names over all types, in type order.
    pub fn all_variable_names(&self) -> Vec<String> {
        self.names.iter().flatten().cloned().collect()
    }

    /// All assigned ports over all types, in type order.
    pub fn all_variable_ids(&self) -> Vec<PortId> {
        self.ids.iter().flatten().copied().collect()
    }

    pub fn total_variables(&self) -> usize {
        self.ids.iter().map(Vec::len).sum()
    }

    /// Resolves a variable name to its port, searching all types.
    pub fn port_id(&self, name: &str) -> Option<PortId> {
        VarType::ALL.iter().find_map(|ty| self.lookup(name, *ty))
    }

    pub fn channels(&self) -> &[TransmissionChannel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> &TransmissionChannel {
        &self.channels[index]
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl fmt::Display for ChannelMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChannelMapping:")?;
        for ty in VarType::ALL {
            let names = self.variable_names(ty);
            if names.is_empty() {
                continue;
            }
            write!(f, " {ty}={{")?;
            for (i, (name, id)) in names.iter().zip(self.variable_ids(ty)).enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "\"{name}\" {id}")?;
            }
            f.write_str("}")?;
        }
        f.write_str(" channels={")?;
        for (i, channel) in self.channels.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}:{} ports", channel.channel_id(), channel.ports().len())?;
        }
        f.write_str("}")
    }
}
