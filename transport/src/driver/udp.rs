//! Real-network driver over UDP datagrams.
//!
//! One socket is bound per receive endpoint and shared by every stream on
//! it: a 4-byte big-endian stream-id header on each datagram routes it to
//! the right subscription queue. A background task per endpoint feeds the
//! queues; `poll` never touches the socket.
//!
//! Multicast receive sockets bind the group address itself, which keeps the
//! port free for unicast binds on the same host and filters delivery to the
//! group's traffic (Linux semantics). The outgoing interface is steered by
//! binding publication sockets to the configured interface address.

use std::{
    collections::{HashMap, VecDeque},
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::{Driver, OfferErr, Publication, Subscription};
use crate::endpoint::{ChannelUri, StreamId};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const STREAM_HEADER: usize = size_of::<StreamId>();
const MAX_DATAGRAM: usize = 64 * 1024;

struct SubQueue {
    queue: Mutex<VecDeque<Vec<u8>>>,
}

struct EndpointEntry {
    streams: Arc<Mutex<HashMap<StreamId, Arc<SubQueue>>>>,
    task: JoinHandle<()>,
}

struct Inner {
    queue_capacity: usize,
    endpoints: Mutex<HashMap<SocketAddr, EndpointEntry>>,
}

/// The UDP messaging driver. One per process, the handle clones cheaply.
///
/// Channels must be opened from within a tokio runtime; the receive tasks
/// live on it.
#[derive(Clone)]
pub struct UdpDriver {
    inner: Arc<Inner>,
}

impl UdpDriver {
    /// Creates a driver with the default per-subscription queue capacity.
    pub fn new() -> Self {
        Self::bounded(DEFAULT_QUEUE_CAPACITY)
    }

    /// Creates a driver whose subscription queues hold at most
    /// `queue_capacity` payloads. Datagrams arriving at a full queue are
    /// dropped, as the wire would drop them.
    pub fn bounded(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue_capacity,
                endpoints: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Binds the receive socket for `uri` and spawns its demux task.
    fn open_endpoint(&self, uri: &ChannelUri) -> io::Result<EndpointEntry> {
        let endpoint = uri.endpoint();
        let socket = std::net::UdpSocket::bind(endpoint)?;

        if uri.is_multicast() {
            let IpAddr::V4(group) = endpoint.ip() else {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{uri}: only IPv4 multicast groups are supported"),
                ));
            };
            let iface = uri.interface().unwrap_or(Ipv4Addr::UNSPECIFIED);
            socket.join_multicast_v4(&group, &iface)?;
        }

        socket.set_nonblocking(true)?;
        let socket = tokio::net::UdpSocket::from_std(socket)?;

        let streams: Arc<Mutex<HashMap<StreamId, Arc<SubQueue>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let task = tokio::spawn(recv_loop(
            socket,
            Arc::clone(&streams),
            self.inner.queue_capacity,
        ));

        Ok(EndpointEntry { streams, task })
    }
}

impl Default for UdpDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads datagrams off `socket` and routes each to its stream's queue.
async fn recv_loop(
    socket: tokio::net::UdpSocket,
    streams: Arc<Mutex<HashMap<StreamId, Arc<SubQueue>>>>,
    queue_capacity: usize,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("endpoint receive failed, closing: {e}");
                break;
            }
        };

        if len < STREAM_HEADER {
            warn!("dropping runt datagram from {from}: {len} bytes");
            continue;
        }

        // SAFETY: The slice is exactly STREAM_HEADER bytes long.
        let stream = StreamId::from_be_bytes(buf[..STREAM_HEADER].try_into().unwrap());

        let Some(queue) = streams.lock().get(&stream).map(Arc::clone) else {
            debug!("no subscriber for stream {stream}, dropping datagram from {from}");
            continue;
        };

        let mut queue = queue.queue.lock();
        if queue.len() >= queue_capacity {
            warn!(stream = stream; "subscription queue full, dropping datagram");
            continue;
        }
        queue.push_back(buf[STREAM_HEADER..len].to_vec());
    }
}

impl Driver for UdpDriver {
    type Pub = UdpPublication;
    type Sub = UdpSubscription;

    fn add_publication(&self, targets: &[ChannelUri], stream: StreamId) -> io::Result<Self::Pub> {
        // Bind the interface address when one is configured so group
        // traffic leaves through the right NIC on multi-homed hosts.
        let local: SocketAddr = match targets.iter().find_map(|uri| uri.interface()) {
            Some(iface) => (IpAddr::V4(iface), 0).into(),
            None => (Ipv4Addr::UNSPECIFIED, 0).into(),
        };

        let socket = std::net::UdpSocket::bind(local)?;
        if targets.iter().any(ChannelUri::is_multicast) {
            socket.set_multicast_loop_v4(true)?;
            socket.set_multicast_ttl_v4(1)?;
        }
        socket.set_nonblocking(true)?;
        let socket = tokio::net::UdpSocket::from_std(socket)?;

        Ok(UdpPublication {
            socket,
            targets: targets.iter().map(ChannelUri::endpoint).collect(),
            header: stream.to_be_bytes(),
        })
    }

    fn add_subscription(&self, uri: &ChannelUri, stream: StreamId) -> io::Result<Self::Sub> {
        let endpoint = uri.endpoint();
        let mut endpoints = self.inner.endpoints.lock();

        if !endpoints.contains_key(&endpoint) {
            let entry = self.open_endpoint(uri)?;
            endpoints.insert(endpoint, entry);
        }

        let entry = &endpoints[&endpoint];
        let mut streams = entry.streams.lock();
        if streams.contains_key(&stream) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{uri}/{stream} is already bound"),
            ));
        }

        let queue = Arc::new(SubQueue {
            queue: Mutex::new(VecDeque::new()),
        });
        streams.insert(stream, Arc::clone(&queue));

        Ok(UdpSubscription {
            inner: Arc::clone(&self.inner),
            endpoint,
            stream,
            queue,
        })
    }
}

/// Outbound UDP handle: one send socket, the channel's destination set and
/// its stream header.
pub struct UdpPublication {
    socket: tokio::net::UdpSocket,
    targets: Vec<SocketAddr>,
    header: [u8; STREAM_HEADER],
}

impl Publication for UdpPublication {
    fn offer(&self, payload: &[u8]) -> Result<(), OfferErr> {
        let mut frame = Vec::with_capacity(STREAM_HEADER + payload.len());
        frame.extend_from_slice(&self.header);
        frame.extend_from_slice(payload);

        for target in &self.targets {
            match self.socket.try_send_to(&frame, *target) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Err(OfferErr::Backpressure);
                }
                Err(e) => return Err(OfferErr::Io(e)),
            }
        }

        Ok(())
    }
}

/// Inbound UDP handle onto one (endpoint, stream) queue.
pub struct UdpSubscription {
    inner: Arc<Inner>,
    endpoint: SocketAddr,
    stream: StreamId,
    queue: Arc<SubQueue>,
}

impl std::fmt::Debug for UdpSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpSubscription")
            .field("endpoint", &self.endpoint)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl Subscription for UdpSubscription {
    fn poll(&mut self, out: &mut Vec<Vec<u8>>, limit: usize) -> usize {
        let mut queue = self.queue.queue.lock();
        let n = queue.len().min(limit);
        out.extend(queue.drain(..n));
        n
    }
}

impl Drop for UdpSubscription {
    fn drop(&mut self) {
        let mut endpoints = self.inner.endpoints.lock();
        let Some(entry) = endpoints.get_mut(&self.endpoint) else {
            return;
        };

        let mut streams = entry.streams.lock();
        streams.remove(&self.stream);
        let last = streams.is_empty();
        drop(streams);

        // The last stream on an endpoint releases its socket and task.
        if last {
            entry.task.abort();
            endpoints.remove(&self.endpoint);
        }
    }
}
