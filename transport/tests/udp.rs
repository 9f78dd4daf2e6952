use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use transport::{
    ChannelUri, Configuration, Driver, NodeRole, Publication, Purpose, Subscription, Topology,
    Transport, UdpDriver,
};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn config(port: u16) -> Configuration {
    Configuration {
        port,
        multicast_group: None,
        multicast_interface: None,
        base_stream: 10,
        shard_addresses: vec![LOCALHOST],
        client_addresses: vec![LOCALHOST],
        topology: Topology::Routed,
        seed: Some(0),
    }
}

async fn poll_until(transport: &mut Transport<UdpDriver>, purpose: Purpose) -> Vec<Vec<u8>> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let got = transport.receive_poll(purpose).unwrap();
            if !got.is_empty() {
                return got;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no message within the deadline")
}

#[tokio::test]
async fn routed_round_trip_over_localhost() {
    let config = config(47710);
    let driver = UdpDriver::new();

    // Shard and client share the port on localhost: the driver demuxes the
    // shared endpoint socket by stream id.
    let mut shard = Transport::new(driver.clone());
    shard.init(&config, NodeRole::Shard, LOCALHOST).unwrap();
    let mut client = Transport::new(driver.clone());
    client.init(&config, NodeRole::Client, LOCALHOST).unwrap();

    let payload = b"gradient batch #3".to_vec();
    client.send(Purpose::ToShards, &payload).unwrap();
    assert_eq!(poll_until(&mut shard, Purpose::FromClients).await, vec![payload]);

    shard.send(Purpose::ToClients, b"batch #3 applied").unwrap();
    assert_eq!(
        poll_until(&mut client, Purpose::FromShards).await,
        vec![b"batch #3 applied".to_vec()]
    );

    // Nothing queued afterwards.
    assert!(shard.receive_poll(Purpose::FromClients).unwrap().is_empty());
}

#[tokio::test]
async fn streams_on_one_endpoint_stay_separate() {
    let driver = UdpDriver::new();
    let endpoint = ChannelUri::unicast(LOCALHOST, 47720);

    let mut sub_a = driver.add_subscription(&endpoint, 10).unwrap();
    let mut sub_b = driver.add_subscription(&endpoint, 11).unwrap();

    let pub_a = driver
        .add_publication(std::slice::from_ref(&endpoint), 10)
        .unwrap();
    let pub_b = driver
        .add_publication(std::slice::from_ref(&endpoint), 11)
        .unwrap();

    pub_a.offer(b"for stream ten").unwrap();
    pub_b.offer(b"for stream eleven").unwrap();

    let drain = |sub: &mut <UdpDriver as Driver>::Sub| {
        let mut out = Vec::new();
        sub.poll(&mut out, usize::MAX);
        out
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let a = drain(&mut sub_a);
            if !a.is_empty() {
                assert_eq!(a, vec![b"for stream ten".to_vec()]);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        loop {
            let b = drain(&mut sub_b);
            if !b.is_empty() {
                assert_eq!(b, vec![b"for stream eleven".to_vec()]);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no datagrams within the deadline");
}

#[tokio::test]
async fn duplicate_stream_bind_is_rejected() {
    let driver = UdpDriver::new();
    let endpoint = ChannelUri::unicast(LOCALHOST, 47730);

    let _sub = driver.add_subscription(&endpoint, 10).unwrap();
    let err = driver.add_subscription(&endpoint, 10).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::AddrInUse);
}

#[tokio::test]
async fn dropped_subscription_releases_the_endpoint() {
    let driver = UdpDriver::new();
    let endpoint = ChannelUri::unicast(LOCALHOST, 47740);

    let sub = driver.add_subscription(&endpoint, 10).unwrap();
    drop(sub);

    // The receive task is cancelled asynchronously, so the port frees up
    // shortly after the drop rather than within it.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if driver.add_subscription(&endpoint, 10).is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("endpoint not released within the deadline");
}
