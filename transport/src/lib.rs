//! Transport layer for the distributed parameter server.
//!
//! Wires the communication channels between the two node roles (shards,
//! which hold parameter partitions, and clients, which submit gradient
//! updates) over unicast and, where the network allows it, multicast UDP.
//! Payloads are opaque byte sequences; everything above the channel
//! topology belongs to the parameter-server logic layered on top.
//!
//! Deployments on networks that block multicast between hosts (most public
//! clouds) must use [`Topology::Routed`], which replaces every group
//! endpoint with a static fan-out over configured peer addresses.

mod addresses;
mod channels;
mod config;
mod driver;
mod endpoint;
mod error;
mod role;
mod topology;
mod transport;

pub use addresses::AddressBook;
pub use channels::ChannelSet;
pub use config::{Configuration, Topology};
pub use driver::{Driver, LoopbackDriver, OfferErr, Publication, Subscription, UdpDriver};
pub use endpoint::{
    COMPLETION_OFFSET, ChannelEndpoint, ChannelUri, Direction, INTER_SHARD_OFFSET, Purpose,
    SUBMIT_OFFSET, StreamId,
};
pub use error::{ConfigErr, Result, TransportErr};
pub use role::NodeRole;
pub use transport::Transport;
