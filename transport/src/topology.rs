//! Role dispatcher: builds the role-specific channel bundle.
//!
//! Shards are addressable in advance (fixed infrastructure), so
//! client→shard traffic is direct unicast. Shard→client and shard↔shard
//! traffic are fan-out, carried by the multicast group on distinct stream
//! ids, or in routed topology by static fan-out over configured peers.

use std::net::IpAddr;

use log::debug;
use rand::Rng;

use crate::{
    addresses::AddressBook,
    channels::ChannelSet,
    config::{Configuration, Topology},
    driver::Driver,
    endpoint::{
        COMPLETION_OFFSET, ChannelEndpoint, ChannelUri, Direction, INTER_SHARD_OFFSET, Purpose,
        SUBMIT_OFFSET, StreamId,
    },
    error::{Result, TransportErr},
    role::NodeRole,
};

/// Builds the channel set for `(config, role, local_addr)`.
///
/// Channel-open order matters only for failure reporting; on any failure
/// the partially built set is dropped, which closes every channel opened
/// before it, so the caller retries from a clean slate.
pub(crate) fn build<D, R>(
    driver: &D,
    config: &Configuration,
    role: NodeRole,
    local_addr: IpAddr,
    rng: &mut R,
) -> Result<ChannelSet<D>>
where
    D: Driver,
    R: Rng,
{
    let book = AddressBook::new(config);
    let base = config.base_stream;
    let mut set = ChannelSet::new();

    match (role, config.topology) {
        (NodeRole::Shard, Topology::Multicast) => {
            let local = book.local_endpoint(local_addr);
            let group = book.multicast_endpoint()?;

            // Gradient batches from clients arrive at the node's own
            // address, known in advance; no discovery involved.
            subscribe(driver, &mut set, Purpose::FromClients, &local, base + SUBMIT_OFFSET)?;

            // Completion reports reach all clients at once; the set of
            // clients awaiting a given shard is not individually tracked.
            publish(
                driver,
                &mut set,
                Purpose::ToClients,
                std::slice::from_ref(&group),
                base + COMPLETION_OFFSET,
            )?;

            // Shard↔shard broadcasts share the group on their own stream
            // id to avoid cross-talk with client traffic.
            publish(
                driver,
                &mut set,
                Purpose::InterShard,
                std::slice::from_ref(&group),
                base + INTER_SHARD_OFFSET,
            )?;
            subscribe(driver, &mut set, Purpose::InterShard, &group, base + INTER_SHARD_OFFSET)?;
        }

        (NodeRole::Client, Topology::Multicast) => {
            // 1:1 channel to one shard, picked at random; the pick is never
            // rebalanced once made.
            let upstream = book.upstream_endpoint(rng)?;
            let group = book.multicast_endpoint()?;

            publish(
                driver,
                &mut set,
                Purpose::ToShards,
                std::slice::from_ref(&upstream),
                base + SUBMIT_OFFSET,
            )?;
            subscribe(driver, &mut set, Purpose::FromShards, &group, base + COMPLETION_OFFSET)?;
        }

        (NodeRole::Shard, Topology::Routed) => {
            let local = book.local_endpoint(local_addr);
            let clients = book.client_endpoints()?;
            let peers = book.peer_shard_endpoints(local_addr);

            subscribe(driver, &mut set, Purpose::FromClients, &local, base + SUBMIT_OFFSET)?;
            publish(driver, &mut set, Purpose::ToClients, &clients, base + COMPLETION_OFFSET)?;
            publish(driver, &mut set, Purpose::InterShard, &peers, base + INTER_SHARD_OFFSET)?;
            subscribe(driver, &mut set, Purpose::InterShard, &local, base + INTER_SHARD_OFFSET)?;
        }

        (NodeRole::Client, Topology::Routed) => {
            let upstream = book.upstream_endpoint(rng)?;
            let local = book.local_endpoint(local_addr);

            publish(
                driver,
                &mut set,
                Purpose::ToShards,
                std::slice::from_ref(&upstream),
                base + SUBMIT_OFFSET,
            )?;
            subscribe(driver, &mut set, Purpose::FromShards, &local, base + COMPLETION_OFFSET)?;
        }
    }

    Ok(set)
}

fn publish<D: Driver>(
    driver: &D,
    set: &mut ChannelSet<D>,
    purpose: Purpose,
    targets: &[ChannelUri],
    stream: StreamId,
) -> Result<()> {
    let publication = driver
        .add_publication(targets, stream)
        .map_err(|source| TransportErr::Init {
            uri: fanout_label(targets),
            stream,
            source,
        })?;

    debug!("opened {purpose}: pub {}/{stream}", fanout_label(targets));

    let endpoints = targets.iter().map(|uri| ChannelEndpoint {
        uri: uri.clone(),
        stream,
        direction: Direction::Publish,
    });
    set.insert_publication(purpose, publication, endpoints);

    Ok(())
}

fn subscribe<D: Driver>(
    driver: &D,
    set: &mut ChannelSet<D>,
    purpose: Purpose,
    uri: &ChannelUri,
    stream: StreamId,
) -> Result<()> {
    let subscription = driver
        .add_subscription(uri, stream)
        .map_err(|source| TransportErr::Init {
            uri: uri.to_string(),
            stream,
            source,
        })?;

    debug!("opened {purpose}: sub {uri}/{stream}");

    let endpoint = ChannelEndpoint {
        uri: uri.clone(),
        stream,
        direction: Direction::Subscribe,
    };
    set.insert_subscription(purpose, subscription, endpoint);

    Ok(())
}

fn fanout_label(targets: &[ChannelUri]) -> String {
    match targets {
        [] => "udp://(no peers)".to_string(),
        [single] => single.to_string(),
        [first, rest @ ..] => format!("{first} (+{} peers)", rest.len()),
    }
}
