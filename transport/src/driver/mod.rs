//! The messaging substrate behind the transport.
//!
//! A driver is the process-local resource that actually moves bytes:
//! constructed once by the caller and injected into every transport that
//! needs it, never held as ambient global state, so tests can run several
//! transports side by side without cross-contamination.

mod loopback;
mod udp;

use std::{error::Error, fmt, io};

pub use loopback::{LoopbackDriver, LoopbackPublication, LoopbackSubscription};
pub use udp::{UdpDriver, UdpPublication, UdpSubscription};

use crate::endpoint::{ChannelUri, StreamId};

/// Why an offer did not go through.
#[derive(Debug)]
pub enum OfferErr {
    /// The outbound buffer is full. Transient; the caller retries with
    /// backoff.
    Backpressure,
    Io(io::Error),
}

impl fmt::Display for OfferErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferErr::Backpressure => f.write_str("outbound buffer full"),
            OfferErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for OfferErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OfferErr::Io(e) => Some(e),
            OfferErr::Backpressure => None,
        }
    }
}

/// An outbound channel handle. Closed when dropped.
pub trait Publication {
    /// Hands a payload to the substrate. Non-blocking: a full buffer is
    /// reported as [`OfferErr::Backpressure`], never waited out here.
    fn offer(&self, payload: &[u8]) -> Result<(), OfferErr>;
}

/// An inbound channel handle. Closed when dropped.
pub trait Subscription {
    /// Drains up to `limit` queued payloads into `out`, returning how many
    /// were moved. Never blocks; zero means nothing was pending.
    fn poll(&mut self, out: &mut Vec<Vec<u8>>, limit: usize) -> usize;
}

/// The process-local messaging driver.
///
/// `add_publication` takes the full destination set of the channel: a
/// single unicast endpoint, a single multicast group, or a static fan-out
/// list in routed topology. The stream id is shared by all of them.
pub trait Driver {
    type Pub: Publication;
    type Sub: Subscription;

    fn add_publication(&self, targets: &[ChannelUri], stream: StreamId) -> io::Result<Self::Pub>;

    fn add_subscription(&self, uri: &ChannelUri, stream: StreamId) -> io::Result<Self::Sub>;
}
