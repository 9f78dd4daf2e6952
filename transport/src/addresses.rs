use std::net::IpAddr;

use rand::{Rng, seq::IndexedRandom};

use crate::{
    config::Configuration,
    endpoint::ChannelUri,
    error::{ConfigErr, Result},
};

/// Resolves the endpoints a node needs before opening channels. Pure
/// address arithmetic over the static configuration; no network lookups.
pub struct AddressBook<'a> {
    config: &'a Configuration,
}

impl<'a> AddressBook<'a> {
    /// Creates an address book over `config`.
    pub fn new(config: &'a Configuration) -> Self {
        Self { config }
    }

    /// The node's own unicast endpoint. Shard addresses are fixed
    /// infrastructure, so no discovery is involved.
    pub fn local_endpoint(&self, local_addr: IpAddr) -> ChannelUri {
        ChannelUri::unicast(local_addr, self.config.port)
    }

    /// Picks one shard uniformly at random as a client's upstream. The
    /// choice is never rebalanced once made; amortization across the shard
    /// set comes from each client rolling independently.
    ///
    /// # Arguments
    /// * `rng` - The random source, injected so tests can seed it.
    ///
    /// # Returns
    /// The chosen shard's unicast endpoint, or `NoShardAddresses` when the
    /// configured list is empty.
    pub fn upstream_endpoint<R: Rng>(&self, rng: &mut R) -> Result<ChannelUri> {
        let addr = self
            .config
            .shard_addresses
            .choose(rng)
            .ok_or(ConfigErr::NoShardAddresses)?;

        Ok(ChannelUri::unicast(*addr, self.config.port))
    }

    /// The shared multicast group endpoint.
    ///
    /// # Returns
    /// `MissingMulticastGroup` when the group is unset: a silently
    /// defaulted group loses messages in production networks, so this is an
    /// explicit precondition. `NotMulticast` when the configured address is
    /// outside the multicast range.
    pub fn multicast_endpoint(&self) -> Result<ChannelUri> {
        let group = self
            .config
            .multicast_group
            .ok_or(ConfigErr::MissingMulticastGroup)?;

        if !group.is_multicast() {
            return Err(ConfigErr::NotMulticast { group }.into());
        }

        Ok(ChannelUri::multicast(
            group,
            self.config.port,
            self.config.multicast_interface,
        ))
    }

    /// Routed-topology fan-out set toward the other shards: every
    /// configured shard endpoint except the local one.
    pub fn peer_shard_endpoints(&self, local_addr: IpAddr) -> Vec<ChannelUri> {
        self.config
            .shard_addresses
            .iter()
            .filter(|addr| **addr != local_addr)
            .map(|addr| ChannelUri::unicast(*addr, self.config.port))
            .collect()
    }

    /// Routed-topology completion fan-out set toward the known clients.
    ///
    /// # Returns
    /// `NoClientAddresses` when the configured list is empty.
    pub fn client_endpoints(&self) -> Result<Vec<ChannelUri>> {
        if self.config.client_addresses.is_empty() {
            return Err(ConfigErr::NoClientAddresses.into());
        }

        Ok(self
            .config
            .client_addresses
            .iter()
            .map(|addr| ChannelUri::unicast(*addr, self.config.port))
            .collect())
    }
}
