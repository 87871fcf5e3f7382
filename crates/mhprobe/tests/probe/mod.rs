//! Shared fixtures for probe scenario tests

mod admission_tests;
mod relay_tests;
mod routing_tests;

use std::sync::{Arc, Mutex};

use mhprobe::{
    transport::memory::{MemoryNetwork, MemoryTransport},
    PeerId, PeerInfo, Probe, ProbeConfig, ProbeMessage, ReplyFilter, StaticStats, Transport,
    TransportError,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::{runtime::Handle, sync::oneshot};

pub struct Node {
    pub id: PeerId,
    pub transport: MemoryTransport,
    pub probe: Probe,
}

/// Add a node with a seeded random source and attach its probe to the network.
pub fn spawn_node(
    network: &MemoryNetwork,
    location: f64,
    seed: u64,
    config: ProbeConfig,
    stats: StaticStats,
) -> Node {
    let id = PeerId::random();
    let transport = network.add_node(id, location);
    let probe = Probe::builder(Arc::new(transport.clone()), Arc::new(stats))
        .config(config)
        .rng(ChaCha8Rng::seed_from_u64(seed))
        .build()
        .unwrap();
    network.attach(&id, &probe);
    Node { id, transport, probe }
}

pub fn default_node(network: &MemoryNetwork, location: f64, seed: u64) -> Node {
    let stats = StaticStats { location, ..StaticStats::default() };
    spawn_node(network, location, seed, ProbeConfig::default(), stats)
}

pub fn network() -> MemoryNetwork {
    MemoryNetwork::new(Handle::current())
}

/// Records everything sent through it. Sends to listed peers succeed.
pub struct RecordingTransport {
    pub peers: Vec<PeerInfo>,
    pub sent: Mutex<Vec<(PeerId, ProbeMessage)>>,
    filters: Mutex<Vec<oneshot::Sender<ProbeMessage>>>,
}

impl RecordingTransport {
    pub fn new(peers: Vec<PeerInfo>) -> Self {
        Self { peers, sent: Mutex::new(Vec::new()), filters: Mutex::new(Vec::new()) }
    }

    pub fn sent(&self) -> Vec<(PeerId, ProbeMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn connected_peers(&self) -> Vec<PeerInfo> {
        self.peers.clone()
    }

    fn is_connected(&self, peer: &PeerId) -> bool {
        self.peers.iter().any(|info| info.id == *peer)
    }

    fn send(&self, peer: &PeerId, message: ProbeMessage) -> Result<(), TransportError> {
        if !self.is_connected(peer) {
            return Err(TransportError::NotConnected(*peer));
        }
        self.sent.lock().unwrap().push((*peer, message));
        Ok(())
    }

    fn register_reply_filter(
        &self,
        _filter: ReplyFilter,
    ) -> Result<oneshot::Receiver<ProbeMessage>, TransportError> {
        let (sender, receiver) = oneshot::channel();
        self.filters.lock().unwrap().push(sender);
        Ok(receiver)
    }
}

pub fn recording_probe(peers: Vec<PeerInfo>, seed: u64) -> (Arc<RecordingTransport>, Probe) {
    let transport = Arc::new(RecordingTransport::new(peers));
    let probe = Probe::builder(transport.clone(), Arc::new(StaticStats::default()))
        .rng(ChaCha8Rng::seed_from_u64(seed))
        .build()
        .unwrap();
    (transport, probe)
}
