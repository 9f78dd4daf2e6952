//! In-process driver backed by a shared route table.
//!
//! Used by tests and single-host runs: publications and subscriptions that
//! share one driver handle see each other through (endpoint, stream) keyed
//! queues, with multicast endpoints fanning a copy out to every subscriber.

use std::{
    collections::{HashMap, VecDeque},
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;

use super::{Driver, OfferErr, Publication, Subscription};
use crate::endpoint::{ChannelUri, StreamId};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;

type RouteKey = (SocketAddr, StreamId);

struct SubQueue {
    queue: Mutex<VecDeque<Vec<u8>>>,
}

struct Inner {
    queue_capacity: usize,
    channel_limit: Option<usize>,
    next_sub_id: AtomicU64,
    publications: AtomicUsize,
    subscriptions: AtomicUsize,
    routes: Mutex<HashMap<RouteKey, Vec<(u64, Arc<SubQueue>)>>>,
}

impl Inner {
    /// Channel budget check. The budget models the substrate's finite
    /// channel resources and lets tests fail an init partway through.
    fn reserve_channel(&self) -> io::Result<()> {
        if let Some(limit) = self.channel_limit {
            let open = self.publications.load(Ordering::SeqCst)
                + self.subscriptions.load(Ordering::SeqCst);
            if open >= limit {
                return Err(io::Error::other(format!(
                    "driver channel limit reached ({limit})"
                )));
            }
        }

        Ok(())
    }
}

/// The in-process messaging driver. Cloning yields another handle to the
/// same route table.
#[derive(Clone)]
pub struct LoopbackDriver {
    inner: Arc<Inner>,
}

impl LoopbackDriver {
    /// Creates a driver with the default per-subscription queue capacity.
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_QUEUE_CAPACITY, None)
    }

    /// Creates a driver whose subscription queues hold at most
    /// `queue_capacity` payloads; offers against a full queue report
    /// backpressure.
    pub fn bounded(queue_capacity: usize) -> Self {
        Self::with_settings(queue_capacity, None)
    }

    /// Creates a driver that opens at most `limit` channels at once.
    pub fn with_channel_limit(limit: usize) -> Self {
        Self::with_settings(DEFAULT_QUEUE_CAPACITY, Some(limit))
    }

    fn with_settings(queue_capacity: usize, channel_limit: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue_capacity,
                channel_limit,
                next_sub_id: AtomicU64::new(0),
                publications: AtomicUsize::new(0),
                subscriptions: AtomicUsize::new(0),
                routes: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Live outbound channels across every handle of this driver.
    pub fn active_publications(&self) -> usize {
        self.inner.publications.load(Ordering::SeqCst)
    }

    /// Live inbound channels across every handle of this driver.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.subscriptions.load(Ordering::SeqCst)
    }

    /// Live channels of either direction.
    pub fn active_channels(&self) -> usize {
        self.active_publications() + self.active_subscriptions()
    }
}

impl Default for LoopbackDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for LoopbackDriver {
    type Pub = LoopbackPublication;
    type Sub = LoopbackSubscription;

    fn add_publication(&self, targets: &[ChannelUri], stream: StreamId) -> io::Result<Self::Pub> {
        self.inner.reserve_channel()?;

        let targets = targets.iter().map(|uri| uri.endpoint()).collect();
        self.inner.publications.fetch_add(1, Ordering::SeqCst);

        Ok(LoopbackPublication {
            inner: Arc::clone(&self.inner),
            targets,
            stream,
        })
    }

    fn add_subscription(&self, uri: &ChannelUri, stream: StreamId) -> io::Result<Self::Sub> {
        self.inner.reserve_channel()?;

        let key = (uri.endpoint(), stream);
        let mut routes = self.inner.routes.lock();
        let subscribers = routes.entry(key).or_default();

        // A unicast endpoint is a bound port: a second binder is an error,
        // while a group endpoint accepts any number of subscribers.
        if !uri.is_multicast() && !subscribers.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{uri}/{stream} is already bound"),
            ));
        }

        let id = self.inner.next_sub_id.fetch_add(1, Ordering::SeqCst);
        let queue = Arc::new(SubQueue {
            queue: Mutex::new(VecDeque::new()),
        });
        subscribers.push((id, Arc::clone(&queue)));
        drop(routes);

        self.inner.subscriptions.fetch_add(1, Ordering::SeqCst);

        Ok(LoopbackSubscription {
            inner: Arc::clone(&self.inner),
            key,
            id,
            queue,
        })
    }
}

/// Outbound handle into the route table.
pub struct LoopbackPublication {
    inner: Arc<Inner>,
    targets: Vec<SocketAddr>,
    stream: StreamId,
}

impl Publication for LoopbackPublication {
    fn offer(&self, payload: &[u8]) -> Result<(), OfferErr> {
        let routes = self.inner.routes.lock();

        let queues: Vec<&Arc<SubQueue>> = self
            .targets
            .iter()
            .filter_map(|target| routes.get(&(*target, self.stream)))
            .flatten()
            .map(|(_, queue)| queue)
            .collect();

        // All-or-nothing: no partial fan-out delivery before reporting
        // backpressure, so a retried offer cannot duplicate messages.
        if queues
            .iter()
            .any(|q| q.queue.lock().len() >= self.inner.queue_capacity)
        {
            return Err(OfferErr::Backpressure);
        }

        for queue in queues {
            queue.queue.lock().push_back(payload.to_vec());
        }

        Ok(())
    }
}

impl Drop for LoopbackPublication {
    fn drop(&mut self) {
        self.inner.publications.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Inbound handle into the route table.
pub struct LoopbackSubscription {
    inner: Arc<Inner>,
    key: RouteKey,
    id: u64,
    queue: Arc<SubQueue>,
}

impl std::fmt::Debug for LoopbackSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackSubscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Subscription for LoopbackSubscription {
    fn poll(&mut self, out: &mut Vec<Vec<u8>>, limit: usize) -> usize {
        let mut queue = self.queue.queue.lock();
        let n = queue.len().min(limit);
        out.extend(queue.drain(..n));
        n
    }
}

impl Drop for LoopbackSubscription {
    fn drop(&mut self) {
        let mut routes = self.inner.routes.lock();
        if let Some(subscribers) = routes.get_mut(&self.key) {
            subscribers.retain(|(id, _)| *id != self.id);
            if subscribers.is_empty() {
                routes.remove(&self.key);
            }
        }
        drop(routes);

        self.inner.subscriptions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod test {
    use std::net::IpAddr;

    use super::*;

    fn unicast(last: u8) -> ChannelUri {
        ChannelUri::unicast(IpAddr::from([10, 0, 0, last]), 7070)
    }

    fn group() -> ChannelUri {
        ChannelUri::multicast([224, 0, 1, 1].into(), 7070, None)
    }

    #[test]
    fn unicast_endpoint_binds_once() {
        let driver = LoopbackDriver::new();
        let _sub = driver.add_subscription(&unicast(5), 10).unwrap();

        let err = driver.add_subscription(&unicast(5), 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);

        // Same endpoint, different stream is a different channel.
        assert!(driver.add_subscription(&unicast(5), 11).is_ok());
    }

    #[test]
    fn multicast_fans_out_to_every_subscriber() {
        let driver = LoopbackDriver::new();
        let mut sub_a = driver.add_subscription(&group(), 11).unwrap();
        let mut sub_b = driver.add_subscription(&group(), 11).unwrap();
        let pub_ = driver.add_publication(&[group()], 11).unwrap();

        pub_.offer(b"report").unwrap();

        let mut got = Vec::new();
        assert_eq!(sub_a.poll(&mut got, 16), 1);
        assert_eq!(sub_b.poll(&mut got, 16), 1);
        assert_eq!(got, vec![b"report".to_vec(), b"report".to_vec()]);
    }

    #[test]
    fn full_queue_reports_backpressure() {
        let driver = LoopbackDriver::bounded(1);
        let mut sub = driver.add_subscription(&unicast(5), 10).unwrap();
        let pub_ = driver.add_publication(&[unicast(5)], 10).unwrap();

        pub_.offer(b"a").unwrap();
        assert!(matches!(pub_.offer(b"b"), Err(OfferErr::Backpressure)));

        let mut got = Vec::new();
        sub.poll(&mut got, 16);
        pub_.offer(b"b").unwrap();
    }

    #[test]
    fn dropping_channels_releases_them() {
        let driver = LoopbackDriver::new();
        let sub = driver.add_subscription(&unicast(5), 10).unwrap();
        let pub_ = driver.add_publication(&[unicast(5)], 10).unwrap();
        assert_eq!(driver.active_channels(), 2);

        drop(sub);
        drop(pub_);
        assert_eq!(driver.active_channels(), 0);

        // The endpoint is bindable again.
        assert!(driver.add_subscription(&unicast(5), 10).is_ok());
    }

    #[test]
    fn channel_limit_stops_further_opens() {
        let driver = LoopbackDriver::with_channel_limit(2);
        let _a = driver.add_subscription(&unicast(5), 10).unwrap();
        let _b = driver.add_publication(&[group()], 11).unwrap();
        assert!(driver.add_publication(&[group()], 12).is_err());
    }
}
