use std::net::IpAddr;

use log::info;
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    channels::ChannelSet,
    config::Configuration,
    driver::{Driver, OfferErr, Publication, Subscription},
    endpoint::Purpose,
    error::{Result, TransportErr},
    role::NodeRole,
    topology,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Running,
    Stopped,
}

/// The transport a parameter-server node talks through.
///
/// Owns exactly one channel set and the handle to the messaging driver; the
/// driver is constructed by the caller and injected, so several transports
/// can share one process without ambient global state. Initialized at most
/// once per instance. `init`/`shutdown` are exclusive with `send`/
/// `receive_poll` through the state gate, not by blocking.
pub struct Transport<D: Driver> {
    driver: Option<D>,
    channels: Option<ChannelSet<D>>,
    role: Option<NodeRole>,
    state: State,
}

impl<D: Driver> Transport<D> {
    /// Creates a transport over `driver`. No channels are opened until
    /// [`Transport::init`].
    pub fn new(driver: D) -> Self {
        Self {
            driver: Some(driver),
            channels: None,
            role: None,
            state: State::Created,
        }
    }

    /// Validates the configuration and opens this role's channels.
    ///
    /// Configuration and role problems surface here, before any channel is
    /// opened; they reflect static misconfiguration and are never retried
    /// internally. A channel-open failure closes everything opened before
    /// it, so a retried `init` starts from a clean slate.
    ///
    /// # Arguments
    /// * `config` - The cluster wiring, shared by reference.
    /// * `role` - The role this node plays.
    /// * `local_addr` - The node's own IP, caller-supplied.
    ///
    /// # Errors
    /// `AlreadyInitialized` on a second call, `Config` on invalid wiring,
    /// `Init` when the substrate rejects a channel.
    pub fn init(
        &mut self,
        config: &Configuration,
        role: NodeRole,
        local_addr: IpAddr,
    ) -> Result<()> {
        if self.state != State::Created {
            return Err(TransportErr::AlreadyInitialized);
        }
        let Some(driver) = self.driver.as_ref() else {
            return Err(TransportErr::NotInitialized);
        };

        config.validate(role)?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let channels = topology::build(driver, config, role, local_addr, &mut rng)?;
        info!(
            "transport initialized: role={role} local_addr={local_addr} channels={}",
            channels.len()
        );

        self.channels = Some(channels);
        self.role = Some(role);
        self.state = State::Running;
        Ok(())
    }

    /// Offers an opaque payload on the outbound channel under `purpose`.
    ///
    /// The transport neither parses nor frames payloads; callers that need
    /// to correlate a submission with a later completion report embed
    /// their own sequence or epoch identifiers.
    ///
    /// # Errors
    /// `NotInitialized` outside the running state, `NoSuchChannel` when
    /// this role defines no outbound channel under `purpose` (the payload
    /// never reaches the substrate), and transient `Backpressure` when the
    /// outbound buffer is full; retry with backoff, this is not a fault.
    pub fn send(&self, purpose: Purpose, payload: &[u8]) -> Result<()> {
        let channels = match self.state {
            State::Running => self.channels.as_ref().ok_or(TransportErr::NotInitialized)?,
            _ => return Err(TransportErr::NotInitialized),
        };

        let publication = channels
            .publication(purpose)
            .ok_or(TransportErr::NoSuchChannel { purpose })?;

        publication.offer(payload).map_err(|e| match e {
            OfferErr::Backpressure => TransportErr::Backpressure,
            OfferErr::Io(e) => TransportErr::Io(e),
        })
    }

    /// Drains the messages currently queued on the inbound channel under
    /// `purpose`. Never blocks: an empty vec means nothing was pending, so
    /// one loop can round-robin several purposes without starving any.
    ///
    /// # Errors
    /// `NotInitialized` outside the running state, `NoSuchChannel` when
    /// this role defines no inbound channel under `purpose`.
    pub fn receive_poll(&mut self, purpose: Purpose) -> Result<Vec<Vec<u8>>> {
        if self.state != State::Running {
            return Err(TransportErr::NotInitialized);
        }
        let channels = self.channels.as_mut().ok_or(TransportErr::NotInitialized)?;

        let Some(subscription) = channels.subscription(purpose) else {
            return Err(TransportErr::NoSuchChannel { purpose });
        };

        let mut out = Vec::new();
        subscription.poll(&mut out, usize::MAX);
        Ok(out)
    }

    /// Closes every owned channel and releases the driver handle.
    /// Idempotent: a no-op after the first call.
    pub fn shutdown(&mut self) {
        if self.state == State::Stopped {
            return;
        }

        self.channels = None;
        self.driver = None;
        self.state = State::Stopped;
        info!("transport shut down");
    }

    /// The role this transport was initialized as, if any.
    pub fn role(&self) -> Option<NodeRole> {
        self.role
    }

    /// The live channel set, for layout inspection.
    pub fn channels(&self) -> Option<&ChannelSet<D>> {
        self.channels.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }
}
