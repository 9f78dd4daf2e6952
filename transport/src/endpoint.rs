use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use serde::{Deserialize, Serialize};

/// A logical, numbered sub-partition of traffic within a shared endpoint.
pub type StreamId = u32;

/// Stream offsets on top of [`Configuration::base_stream`]. Globally agreed:
/// any two roles that must communicate derive the identical (endpoint,
/// stream) pair from them.
///
/// [`Configuration::base_stream`]: crate::config::Configuration::base_stream
pub const SUBMIT_OFFSET: StreamId = 0;
pub const COMPLETION_OFFSET: StreamId = 1;
pub const INTER_SHARD_OFFSET: StreamId = 2;

/// The address half of a channel: a datagram endpoint, optionally pinned to
/// a local interface for group traffic on multi-homed hosts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelUri {
    endpoint: SocketAddr,
    interface: Option<Ipv4Addr>,
}

impl ChannelUri {
    /// Creates a plain unicast uri for `addr:port`.
    pub fn unicast(addr: IpAddr, port: u16) -> Self {
        Self {
            endpoint: SocketAddr::new(addr, port),
            interface: None,
        }
    }

    /// Creates a multicast group uri, carrying the interface when one is
    /// configured so the substrate binds the right NIC.
    pub fn multicast(group: Ipv4Addr, port: u16, interface: Option<Ipv4Addr>) -> Self {
        Self {
            endpoint: SocketAddr::new(IpAddr::V4(group), port),
            interface,
        }
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn interface(&self) -> Option<Ipv4Addr> {
        self.interface
    }

    /// Whether this uri names a one-to-many group endpoint.
    pub fn is_multicast(&self) -> bool {
        self.endpoint.ip().is_multicast()
    }
}

impl fmt::Display for ChannelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "udp://{}", self.endpoint)?;
        if let Some(iface) = self.interface {
            write!(f, "|interface={iface}")?;
        }
        Ok(())
    }
}

/// Which way traffic flows through an endpoint, from this node's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Publish,
    Subscribe,
}

/// One logical publish or subscribe point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEndpoint {
    pub uri: ChannelUri,
    pub stream: StreamId,
    pub direction: Direction,
}

impl fmt::Display for ChannelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            Direction::Publish => "pub",
            Direction::Subscribe => "sub",
        };
        write!(f, "{dir} {}/{}", self.uri, self.stream)
    }
}

/// The logical purpose a channel is registered under in a `ChannelSet`.
/// Which purposes exist on a node depends on its role, not on the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Client → shard gradient submission (outbound on clients).
    ToShards,
    /// Shard → client completion reports (outbound on shards).
    ToClients,
    /// Shard ↔ shard broadcasts (outbound and inbound on shards).
    InterShard,
    /// Gradient submissions arriving at a shard (inbound on shards).
    FromClients,
    /// Completion reports arriving at a client (inbound on clients).
    FromShards,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::ToShards => "to_shards",
            Purpose::ToClients => "to_clients",
            Purpose::InterShard => "inter_shard",
            Purpose::FromClients => "from_clients",
            Purpose::FromShards => "from_shards",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unicast_uri_formats_without_interface() {
        let uri = ChannelUri::unicast(IpAddr::from([10, 0, 0, 5]), 7070);
        assert_eq!(uri.to_string(), "udp://10.0.0.5:7070");
        assert!(!uri.is_multicast());
    }

    #[test]
    fn multicast_uri_carries_interface() {
        let group = Ipv4Addr::new(224, 0, 1, 1);
        let iface = Ipv4Addr::new(192, 168, 1, 1);
        let uri = ChannelUri::multicast(group, 7070, Some(iface));
        assert_eq!(uri.to_string(), "udp://224.0.1.1:7070|interface=192.168.1.1");
        assert!(uri.is_multicast());
    }
}
