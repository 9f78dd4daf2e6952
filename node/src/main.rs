use std::{env, io, net::IpAddr, time::Duration};

use log::{debug, info, warn};
use tokio::{signal, time};
use transport::{Configuration, NodeRole, Purpose, Transport, TransportErr, UdpDriver};

const DEFAULT_LOCAL_ADDR: &str = "127.0.0.1";
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const SUBMIT_INTERVAL: Duration = Duration::from_secs(1);
const BACKOFF: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let (Some(role), Some(config_path)) = (args.next(), args.next()) else {
        return Err(io::Error::other("usage: node <shard|client> <config.json>"));
    };

    let role: NodeRole = role.parse().map_err(io::Error::from)?;

    let content = std::fs::read_to_string(&config_path)?;
    let config: Configuration = serde_json::from_str(&content).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid config '{config_path}': {e}"),
        )
    })?;

    let local_addr: IpAddr = env::var("LOCAL_ADDR")
        .unwrap_or_else(|_| DEFAULT_LOCAL_ADDR.to_string())
        .parse()
        .map_err(io::Error::other)?;

    let driver = UdpDriver::new();
    let mut transport = Transport::new(driver);
    transport
        .init(&config, role, local_addr)
        .map_err(io::Error::from)?;
    info!("node up: role={role} local_addr={local_addr}");

    tokio::select! {
        res = run(&mut transport, role) => {
            res?;
        }
        _ = signal::ctrl_c() => {
            info!("received SIGTERM");
        }
    }

    transport.shutdown();
    Ok(())
}

async fn run(transport: &mut Transport<UdpDriver>, role: NodeRole) -> io::Result<()> {
    match role {
        NodeRole::Shard => shard_loop(transport).await,
        NodeRole::Client => client_loop(transport).await,
    }
}

/// Services the shard's inbound channels and reports back on every batch.
///
/// The echoed payload is the caller-level correlation handle: the transport
/// itself never interprets it.
async fn shard_loop(transport: &mut Transport<UdpDriver>) -> io::Result<()> {
    loop {
        for batch in transport.receive_poll(Purpose::FromClients).map_err(io::Error::from)? {
            debug!(bytes = batch.len(); "gradient batch received");
            send_with_retry(transport, Purpose::ToClients, &batch).await?;
        }

        for state in transport.receive_poll(Purpose::InterShard).map_err(io::Error::from)? {
            debug!(bytes = state.len(); "peer shard state received");
        }

        time::sleep(POLL_INTERVAL).await;
    }
}

/// Submits a numbered payload upstream once a second and drains the
/// completion stream in between.
async fn client_loop(transport: &mut Transport<UdpDriver>) -> io::Result<()> {
    let mut submit = time::interval(SUBMIT_INTERVAL);
    let mut seq: u64 = 0;

    loop {
        submit.tick().await;

        let payload = seq.to_be_bytes();
        send_with_retry(transport, Purpose::ToShards, &payload).await?;
        info!("submitted batch {seq}");
        seq += 1;

        for report in transport.receive_poll(Purpose::FromShards).map_err(io::Error::from)? {
            info!(bytes = report.len(); "completion report received");
        }
    }
}

/// Retries transient backpressure with a bounded sleep; everything else is
/// fatal for the loop.
async fn send_with_retry(
    transport: &Transport<UdpDriver>,
    purpose: Purpose,
    payload: &[u8],
) -> io::Result<()> {
    loop {
        match transport.send(purpose, payload) {
            Ok(()) => return Ok(()),
            Err(TransportErr::Backpressure) => {
                debug!("backpressure on {purpose}, backing off");
                time::sleep(BACKOFF).await;
            }
            Err(e) => {
                warn!("send on {purpose} failed: {e}");
                return Err(e.into());
            }
        }
    }
}
