use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigErr, role::NodeRole};

/// How fan-out traffic reaches its peers.
///
/// `Multicast` is the native topology: one group address carries all
/// one-to-many streams. Many public cloud networks block multicast between
/// hosts; `Routed` is the supported variant there, replacing every group
/// endpoint with a static fan-out over explicitly configured peer addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    #[default]
    Multicast,
    Routed,
}

/// Immutable cluster wiring for one node. Shared by reference into the
/// transport at init time; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// The fixed port every channel of the cluster lives on.
    pub port: u16,
    /// Multicast group carrying the fan-out streams. Required in
    /// `Multicast` topology; an unset group fails init before any channel
    /// is opened, since a silently defaulted group loses messages in
    /// production networks.
    #[serde(default)]
    pub multicast_group: Option<Ipv4Addr>,
    /// NIC to bind group traffic to. Needed on multi-homed hosts, where the
    /// OS may otherwise pick an interface with no route to the group.
    #[serde(default)]
    pub multicast_interface: Option<Ipv4Addr>,
    /// Base stream identifier. The offsets on top of it are globally agreed
    /// constants, see [`crate::endpoint`].
    pub base_stream: u32,
    /// Known shard endpoints. Clients pick their upstream from this list;
    /// shards use it (minus themselves) as the inter-shard peer set in
    /// routed topology.
    #[serde(default)]
    pub shard_addresses: Vec<IpAddr>,
    /// Known client endpoints, the completion fan-out set for shards in
    /// routed topology. Unused under multicast.
    #[serde(default)]
    pub client_addresses: Vec<IpAddr>,
    #[serde(default)]
    pub topology: Topology,
    /// Seed for the upstream-shard pick. Set in tests for deterministic
    /// selection.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Configuration {
    /// Checks the invariants this node's role depends on.
    ///
    /// # Arguments
    /// * `role` - The role this node will start as.
    ///
    /// # Returns
    /// `Ok(())` when every channel the role needs can be resolved from this
    /// configuration, the specific [`ConfigErr`] otherwise.
    pub fn validate(&self, role: NodeRole) -> Result<(), ConfigErr> {
        match self.topology {
            Topology::Multicast => {
                let group = self.multicast_group.ok_or(ConfigErr::MissingMulticastGroup)?;
                if !group.is_multicast() {
                    return Err(ConfigErr::NotMulticast { group });
                }
            }
            Topology::Routed => {
                if role == NodeRole::Shard && self.client_addresses.is_empty() {
                    return Err(ConfigErr::NoClientAddresses);
                }
            }
        }

        if role == NodeRole::Client && self.shard_addresses.is_empty() {
            return Err(ConfigErr::NoShardAddresses);
        }

        Ok(())
    }
}
