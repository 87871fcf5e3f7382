//! In-process transport.
//!
//! `MemoryNetwork` keeps a whole overlay in one process: nodes, the links
//! between them, and each node's pending reply filters. It backs the
//! simulator and the integration tests, and shows what a real transport has
//! to provide.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use libp2p::PeerId;
use tokio::{runtime::Handle, sync::oneshot};
use tracing::{debug, trace};

use super::{PeerInfo, ReplyFilter, Transport, TransportError};
use crate::{
    probe::{Probe, WeakProbe},
    protocol::ProbeMessage,
};

struct PendingFilter {
    filter: ReplyFilter,
    reply: oneshot::Sender<ProbeMessage>,
}

#[derive(Default)]
struct NodeEntry {
    location: f64,
    links: HashSet<PeerId>,
    /// Degree reported to neighbours instead of the real link count
    advertised_degree: Option<u32>,
    /// Weak, as the probe holds this network through its transport
    handler: Option<WeakProbe>,
    filters: Vec<PendingFilter>,
    /// Silently drops everything sent to it
    unresponsive: bool,
}

impl NodeEntry {
    fn degree(&self) -> u32 {
        self.advertised_degree.unwrap_or(self.links.len() as u32)
    }

    /// Close every filter waiting on `peer`.
    fn drop_filters_for(&mut self, peer: &PeerId) {
        self.filters.retain(|pending| pending.filter.peer != *peer);
    }
}

#[derive(Default)]
struct State {
    nodes: HashMap<PeerId, NodeEntry>,
}

/// An overlay whose nodes all live in this process.
#[derive(Clone)]
pub struct MemoryNetwork {
    state: Arc<Mutex<State>>,
    runtime: Handle,
}

impl MemoryNetwork {
    /// Create an empty network delivering requests on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self { state: Arc::new(Mutex::new(State::default())), runtime }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a node at `location` and return its transport.
    pub fn add_node(&self, id: PeerId, location: f64) -> MemoryTransport {
        self.lock().nodes.insert(id, NodeEntry { location, ..NodeEntry::default() });
        MemoryTransport { id, network: self.clone() }
    }

    /// Remove a node, closing all of its links.
    pub fn remove_node(&self, id: &PeerId) {
        let mut state = self.lock();
        let Some(entry) = state.nodes.remove(id) else {
            return;
        };
        for peer in entry.links {
            if let Some(neighbour) = state.nodes.get_mut(&peer) {
                neighbour.links.remove(id);
                neighbour.drop_filters_for(id);
            }
        }
    }

    /// Route inbound requests for `id` to `probe` for as long as the caller
    /// keeps it alive.
    pub fn attach(&self, id: &PeerId, probe: &Probe) {
        if let Some(entry) = self.lock().nodes.get_mut(id) {
            entry.handler = Some(probe.downgrade());
        }
    }

    /// Stop routing inbound requests for `id`.
    pub fn detach(&self, id: &PeerId) {
        if let Some(entry) = self.lock().nodes.get_mut(id) {
            entry.handler = None;
        }
    }

    /// Link two nodes. Returns false if either is unknown or they are the same node.
    pub fn connect(&self, a: &PeerId, b: &PeerId) -> bool {
        let mut state = self.lock();
        if a == b || !state.nodes.contains_key(a) || !state.nodes.contains_key(b) {
            return false;
        }
        for (from, to) in [(a, b), (b, a)] {
            if let Some(entry) = state.nodes.get_mut(from) {
                entry.links.insert(*to);
            }
        }
        true
    }

    /// Unlink two nodes. Replies either side was waiting for from the other
    /// are abandoned.
    pub fn disconnect(&self, a: &PeerId, b: &PeerId) {
        let mut state = self.lock();
        for (from, to) in [(a, b), (b, a)] {
            if let Some(entry) = state.nodes.get_mut(from) {
                entry.links.remove(to);
                entry.drop_filters_for(to);
            }
        }
    }

    /// Make `id` report `degree` to its neighbours, or its real link count
    /// for `None`. A degree of 0 means unknown.
    pub fn set_advertised_degree(&self, id: &PeerId, degree: Option<u32>) {
        if let Some(entry) = self.lock().nodes.get_mut(id) {
            entry.advertised_degree = degree;
        }
    }

    /// Make `id` swallow every message sent to it.
    pub fn set_unresponsive(&self, id: &PeerId, unresponsive: bool) {
        if let Some(entry) = self.lock().nodes.get_mut(id) {
            entry.unresponsive = unresponsive;
        }
    }

    pub fn node_ids(&self) -> Vec<PeerId> {
        self.lock().nodes.keys().copied().collect()
    }

    /// Real number of links of `id`.
    pub fn link_count(&self, id: &PeerId) -> usize {
        self.lock().nodes.get(id).map(|entry| entry.links.len()).unwrap_or(0)
    }

    /// Reply filters `id` is still waiting on.
    pub fn pending_filters(&self, id: &PeerId) -> usize {
        self.lock()
            .nodes
            .get(id)
            .map(|entry| entry.filters.iter().filter(|pending| !pending.reply.is_closed()).count())
            .unwrap_or(0)
    }

    fn deliver(&self, from: PeerId, to: &PeerId, message: ProbeMessage) -> Result<(), TransportError> {
        let mut state = self.lock();
        let linked = state.nodes.get(&from).map(|entry| entry.links.contains(to)).unwrap_or(false);
        let Some(target) = state.nodes.get_mut(to).filter(|_| linked) else {
            return Err(TransportError::NotConnected(*to));
        };

        if target.unresponsive {
            trace!("{} swallowed probe message {} from {}", to, message.uid(), from);
            return Ok(());
        }

        if let ProbeMessage::Request { .. } = message {
            match target.handler.as_ref().and_then(WeakProbe::upgrade) {
                Some(probe) => {
                    self.runtime.spawn(async move { probe.handle_message(from, message) });
                },
                None => debug!("No probe handler on {} for request from {}", to, from),
            }
            return Ok(());
        }

        target.filters.retain(|pending| !pending.reply.is_closed());
        match target.filters.iter().position(|pending| pending.filter.matches(&from, &message)) {
            Some(index) => {
                let pending = target.filters.swap_remove(index);
                // The waiter may have timed out since the retain above.
                let _ = pending.reply.send(message);
            },
            None => debug!("Unmatched {:?} for probe {} from {} at {}", message.kind(), message.uid(), from, to),
        }
        Ok(())
    }
}

/// One node's view of a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    id: PeerId,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

impl Transport for MemoryTransport {
    fn connected_peers(&self) -> Vec<PeerInfo> {
        let state = self.network.lock();
        let Some(own) = state.nodes.get(&self.id) else {
            return Vec::new();
        };
        own.links
            .iter()
            .filter_map(|peer| {
                state.nodes.get(peer).map(|entry| PeerInfo {
                    id: *peer,
                    degree: entry.degree(),
                    location: entry.location,
                })
            })
            .collect()
    }

    fn is_connected(&self, peer: &PeerId) -> bool {
        self.network.lock().nodes.get(&self.id).map(|entry| entry.links.contains(peer)).unwrap_or(false)
    }

    fn send(&self, peer: &PeerId, message: ProbeMessage) -> Result<(), TransportError> {
        self.network.deliver(self.id, peer, message)
    }

    fn register_reply_filter(
        &self,
        filter: ReplyFilter,
    ) -> Result<oneshot::Receiver<ProbeMessage>, TransportError> {
        let mut state = self.network.lock();
        let Some(own) = state.nodes.get_mut(&self.id) else {
            return Err(TransportError::Closed);
        };
        if !own.links.contains(&filter.peer) {
            return Err(TransportError::NotConnected(filter.peer));
        }

        let (reply, receiver) = oneshot::channel();
        own.filters.push(PendingFilter { filter, reply });
        Ok(receiver)
    }
}
