use std::collections::HashMap;

use crate::{
    driver::Driver,
    endpoint::{ChannelEndpoint, Purpose},
};

/// The per-role bundle of live channels, keyed by logical purpose.
///
/// Built once by the role dispatcher at init, torn down once at shutdown;
/// never partially rebuilt. Dropping the set closes every channel.
pub struct ChannelSet<D: Driver> {
    publications: HashMap<Purpose, D::Pub>,
    subscriptions: HashMap<Purpose, D::Sub>,
    layout: Vec<(Purpose, ChannelEndpoint)>,
}

impl<D: Driver> ChannelSet<D> {
    pub(crate) fn new() -> Self {
        Self {
            publications: HashMap::new(),
            subscriptions: HashMap::new(),
            layout: Vec::new(),
        }
    }

    pub(crate) fn insert_publication(
        &mut self,
        purpose: Purpose,
        publication: D::Pub,
        endpoints: impl IntoIterator<Item = ChannelEndpoint>,
    ) {
        self.publications.insert(purpose, publication);
        self.layout.extend(endpoints.into_iter().map(|e| (purpose, e)));
    }

    pub(crate) fn insert_subscription(
        &mut self,
        purpose: Purpose,
        subscription: D::Sub,
        endpoint: ChannelEndpoint,
    ) {
        self.subscriptions.insert(purpose, subscription);
        self.layout.push((purpose, endpoint));
    }

    pub(crate) fn publication(&self, purpose: Purpose) -> Option<&D::Pub> {
        self.publications.get(&purpose)
    }

    pub(crate) fn subscription(&mut self, purpose: Purpose) -> Option<&mut D::Sub> {
        self.subscriptions.get_mut(&purpose)
    }

    /// Every (purpose, endpoint) pair this set was built with, in open
    /// order. A fan-out publication contributes one entry per destination.
    pub fn layout(&self) -> &[(Purpose, ChannelEndpoint)] {
        &self.layout
    }

    /// The number of live channels; a fan-out publication counts once.
    pub fn len(&self) -> usize {
        self.publications.len() + self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publications.is_empty() && self.subscriptions.is_empty()
    }
}
