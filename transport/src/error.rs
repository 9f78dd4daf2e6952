use std::{error::Error, fmt, io};

use crate::endpoint::Purpose;

/// The transport module's result type.
pub type Result<T> = std::result::Result<T, TransportErr>;

/// Static configuration problems, caught before any channel is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErr {
    /// Multicast topology selected but no multicast group configured.
    MissingMulticastGroup,
    /// The configured group address is outside the multicast range.
    NotMulticast { group: std::net::Ipv4Addr },
    /// A client node needs at least one known shard address.
    NoShardAddresses,
    /// A shard in routed topology needs at least one known client address.
    NoClientAddresses,
}

impl fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErr::MissingMulticastGroup => f.write_str(
                "multicast topology requires a multicast group address allowed in your \
                 environment, i.e.: 224.0.1.1",
            ),
            ConfigErr::NotMulticast { group } => {
                write!(f, "configured group {group} is not a multicast address")
            }
            ConfigErr::NoShardAddresses => {
                f.write_str("client role requires a non-empty shard address list")
            }
            ConfigErr::NoClientAddresses => {
                f.write_str("shard role in routed topology requires a non-empty client address list")
            }
        }
    }
}

impl Error for ConfigErr {}

/// Transport runtime failures.
#[derive(Debug)]
pub enum TransportErr {
    /// Invalid static configuration, surfaced at `init` and never retried internally.
    Config(ConfigErr),
    /// A role string outside the closed {shard, client} set.
    UnsupportedRole { got: String },
    /// `init` called on an instance that already holds live channels.
    AlreadyInitialized,
    /// `send`/`receive_poll` before `init` or after `shutdown`.
    NotInitialized,
    /// A channel failed to open; every channel opened before it was closed again.
    Init {
        uri: String,
        stream: u32,
        source: io::Error,
    },
    /// The requested purpose is not defined for this node's role.
    NoSuchChannel { purpose: Purpose },
    /// Outbound buffer full. Transient; retry with backoff.
    Backpressure,
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for TransportErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErr::Config(e) => write!(f, "invalid configuration: {e}"),
            TransportErr::UnsupportedRole { got } => {
                write!(f, "unsupported node role: {got}")
            }
            TransportErr::AlreadyInitialized => f.write_str("transport is already initialized"),
            TransportErr::NotInitialized => f.write_str("transport is not initialized"),
            TransportErr::Init {
                uri,
                stream,
                source,
            } => write!(f, "cannot open channel {uri}/{stream}: {source}"),
            TransportErr::NoSuchChannel { purpose } => {
                write!(f, "no {purpose} channel for this node's role")
            }
            TransportErr::Backpressure => f.write_str("outbound buffer full"),
            TransportErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for TransportErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransportErr::Config(e) => Some(e),
            TransportErr::Init { source, .. } => Some(source),
            TransportErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigErr> for TransportErr {
    fn from(value: ConfigErr) -> Self {
        Self::Config(value)
    }
}

impl From<io::Error> for TransportErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<TransportErr> for io::Error {
    fn from(value: TransportErr) -> Self {
        match value {
            TransportErr::Io(e) => e,
            TransportErr::Backpressure => io::Error::new(io::ErrorKind::WouldBlock, value),
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }
}

impl TransportErr {
    /// Transient errors may be retried by the caller; everything else is fatal.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportErr::Backpressure)
    }
}
