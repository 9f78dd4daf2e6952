use std::net::{IpAddr, Ipv4Addr};

use transport::{
    ChannelEndpoint, ChannelUri, ConfigErr, Configuration, Direction, LoopbackDriver, NodeRole,
    Purpose, Topology, Transport, TransportErr,
};

fn config() -> Configuration {
    Configuration {
        port: 7070,
        multicast_group: Some(Ipv4Addr::new(224, 0, 1, 1)),
        multicast_interface: None,
        base_stream: 10,
        shard_addresses: vec![IpAddr::from([10, 0, 0, 5]), IpAddr::from([10, 0, 0, 6])],
        client_addresses: Vec::new(),
        topology: Topology::Multicast,
        seed: Some(0),
    }
}

fn unicast(addr: [u8; 4]) -> ChannelUri {
    ChannelUri::unicast(IpAddr::from(addr), 7070)
}

fn group() -> ChannelUri {
    ChannelUri::multicast(Ipv4Addr::new(224, 0, 1, 1), 7070, None)
}

fn endpoint(uri: ChannelUri, stream: u32, direction: Direction) -> ChannelEndpoint {
    ChannelEndpoint {
        uri,
        stream,
        direction,
    }
}

#[test]
fn shard_multicast_layout() {
    let mut transport = Transport::new(LoopbackDriver::new());
    transport
        .init(&config(), NodeRole::Shard, IpAddr::from([10, 0, 0, 5]))
        .unwrap();

    let layout = transport.channels().unwrap().layout().to_vec();
    assert_eq!(
        layout,
        vec![
            (
                Purpose::FromClients,
                endpoint(unicast([10, 0, 0, 5]), 10, Direction::Subscribe),
            ),
            (Purpose::ToClients, endpoint(group(), 11, Direction::Publish)),
            (Purpose::InterShard, endpoint(group(), 12, Direction::Publish)),
            (Purpose::InterShard, endpoint(group(), 12, Direction::Subscribe)),
        ]
    );
}

#[test]
fn client_multicast_layout() {
    let mut transport = Transport::new(LoopbackDriver::new());
    transport
        .init(&config(), NodeRole::Client, IpAddr::from([10, 0, 0, 9]))
        .unwrap();

    let layout = transport.channels().unwrap().layout();
    assert_eq!(layout.len(), 2);

    // Exactly one unicast publication to one of the two shards, stream 10.
    let (purpose, upstream) = &layout[0];
    assert_eq!(*purpose, Purpose::ToShards);
    assert_eq!(upstream.direction, Direction::Publish);
    assert_eq!(upstream.stream, 10);
    assert!([unicast([10, 0, 0, 5]), unicast([10, 0, 0, 6])].contains(&upstream.uri));

    // One multicast subscription for completion reports, stream 11.
    assert_eq!(
        layout[1],
        (Purpose::FromShards, endpoint(group(), 11, Direction::Subscribe)),
    );
}

#[test]
fn client_upstream_pick_is_seeded() {
    let pick = |seed: u64| {
        let mut config = config();
        config.seed = Some(seed);
        let mut transport = Transport::new(LoopbackDriver::new());
        transport
            .init(&config, NodeRole::Client, IpAddr::from([10, 0, 0, 9]))
            .unwrap();
        transport.channels().unwrap().layout()[0].1.uri.clone()
    };

    for seed in 0..16 {
        assert_eq!(pick(seed), pick(seed));
    }
}

#[test]
fn shard_without_group_opens_nothing() {
    let mut config = config();
    config.multicast_group = None;

    let driver = LoopbackDriver::new();
    let mut transport = Transport::new(driver.clone());
    let err = transport
        .init(&config, NodeRole::Shard, IpAddr::from([10, 0, 0, 5]))
        .unwrap_err();

    assert!(matches!(
        err,
        TransportErr::Config(ConfigErr::MissingMulticastGroup)
    ));
    assert!(transport.channels().is_none());
    assert_eq!(driver.active_channels(), 0);
}

#[test]
fn client_without_shards_fails() {
    let mut config = config();
    config.shard_addresses.clear();

    let mut transport = Transport::new(LoopbackDriver::new());
    let err = transport
        .init(&config, NodeRole::Client, IpAddr::from([10, 0, 0, 9]))
        .unwrap_err();

    assert!(matches!(
        err,
        TransportErr::Config(ConfigErr::NoShardAddresses)
    ));
}

#[test]
fn shard_routed_layout() {
    let mut config = config();
    config.topology = Topology::Routed;
    config.multicast_group = None;
    config.client_addresses = vec![IpAddr::from([10, 0, 0, 9]), IpAddr::from([10, 0, 0, 10])];

    let mut transport = Transport::new(LoopbackDriver::new());
    transport
        .init(&config, NodeRole::Shard, IpAddr::from([10, 0, 0, 5]))
        .unwrap();

    let layout = transport.channels().unwrap().layout().to_vec();
    assert_eq!(
        layout,
        vec![
            (
                Purpose::FromClients,
                endpoint(unicast([10, 0, 0, 5]), 10, Direction::Subscribe),
            ),
            // Completion fan-out: one destination per configured client.
            (Purpose::ToClients, endpoint(unicast([10, 0, 0, 9]), 11, Direction::Publish)),
            (Purpose::ToClients, endpoint(unicast([10, 0, 0, 10]), 11, Direction::Publish)),
            // Inter-shard fan-out excludes the local address.
            (Purpose::InterShard, endpoint(unicast([10, 0, 0, 6]), 12, Direction::Publish)),
            (
                Purpose::InterShard,
                endpoint(unicast([10, 0, 0, 5]), 12, Direction::Subscribe),
            ),
        ]
    );
}

#[test]
fn client_routed_layout() {
    let mut config = config();
    config.topology = Topology::Routed;
    config.multicast_group = None;

    let mut transport = Transport::new(LoopbackDriver::new());
    transport
        .init(&config, NodeRole::Client, IpAddr::from([10, 0, 0, 9]))
        .unwrap();

    let layout = transport.channels().unwrap().layout();
    assert_eq!(layout.len(), 2);
    assert_eq!(layout[0].0, Purpose::ToShards);
    assert_eq!(
        layout[1],
        (
            Purpose::FromShards,
            endpoint(unicast([10, 0, 0, 9]), 11, Direction::Subscribe),
        )
    );
}

#[test]
fn routed_shard_without_clients_fails() {
    let mut config = config();
    config.topology = Topology::Routed;
    config.multicast_group = None;

    let driver = LoopbackDriver::new();
    let mut transport = Transport::new(driver.clone());
    let err = transport
        .init(&config, NodeRole::Shard, IpAddr::from([10, 0, 0, 5]))
        .unwrap_err();

    assert!(matches!(
        err,
        TransportErr::Config(ConfigErr::NoClientAddresses)
    ));
    assert_eq!(driver.active_channels(), 0);
}
