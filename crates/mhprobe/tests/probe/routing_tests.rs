//! Random walk and reply handling scenarios

use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use mhprobe::{
    admission::Source, Outcome, PeerId, PeerInfo, ProbeConfig, ProbeError, ProbeMessage,
    ProbeType, ProbeValue, StaticStats,
};
use tokio::time::Instant;

use super::{default_node, network, recording_probe, spawn_node, Node};

fn peer(degree: u32) -> PeerInfo {
    PeerInfo { id: PeerId::random(), degree, location: 0.5 }
}

#[tokio::test(start_paused = true)]
async fn test_oversized_htl_is_clamped() {
    let target = peer(1);
    let (transport, probe) = recording_probe(vec![target.clone()], 30);

    let _handle = probe.start(200, 77, ProbeType::Build);

    // Clamped to 70, then decremented once before routing.
    assert_eq!(transport.sent(), vec![(
        target.id,
        ProbeMessage::Request { uid: 77, htl: 69, probe_type: ProbeType::Build.code() }
    )]);
}

/// Collects formatted log output.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_clamping_is_logged() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (_transport, probe) = recording_probe(vec![peer(1)], 32);
    let _in_range = probe.start(70, 1, ProbeType::Build);
    assert!(!logs.contents().contains("Clamping"), "{}", logs.contents());

    let _oversized = probe.start(71, 2, ProbeType::Build);
    assert!(logs.contents().contains("Clamping htl 71 of probe 2"), "{}", logs.contents());
}

#[tokio::test(start_paused = true)]
async fn test_relayed_requests_carry_only_request_fields() {
    let target = peer(1);
    let source = peer(1);
    let (transport, probe) = recording_probe(vec![target.clone(), source.clone()], 31);

    probe.handle_message(source.id, ProbeMessage::Request {
        uid: 5,
        htl: 40,
        probe_type: ProbeType::StoreSize.code(),
    });

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, ProbeMessage::Request {
        uid: 5,
        htl: 39,
        probe_type: ProbeType::StoreSize.code()
    });
    assert_eq!(probe.admission().accepted(&Source::Peer(source.id)), 1);
}

/// Five nodes in a ring, each with its own location. Admission limits are
/// raised so that repeated probes are never refused.
fn ring(network: &mhprobe::transport::memory::MemoryNetwork) -> Vec<Node> {
    let config = ProbeConfig::builder().peer_limit(1000).local_limit(1000).build();
    let nodes: Vec<Node> = (0..5)
        .map(|i| {
            let location = i as f64 / 5.0 + 0.05;
            let stats = StaticStats { location, ..StaticStats::default() };
            spawn_node(network, location, 100 + i as u64, config.clone(), stats)
        })
        .collect();
    for i in 0..nodes.len() {
        let next = (i + 1) % nodes.len();
        assert!(network.connect(&nodes[i].id, &nodes[next].id));
    }
    nodes
}

#[tokio::test(start_paused = true)]
async fn test_multi_hop_probe_returns_an_overlay_location() {
    let network = network();
    let nodes = ring(&network);
    let locations: Vec<f32> = (0..5).map(|i| (i as f64 / 5.0 + 0.05) as f32).collect();

    for uid in 0..20 {
        let outcome = nodes[0].probe.start(8, uid, ProbeType::Location).outcome().await;
        match outcome {
            Some(Outcome::Value(ProbeValue::Location(location))) => {
                assert!(locations.contains(&location), "{location} is not a node location");
            },
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_identifier_probe_reaches_every_node() {
    let network = network();
    let nodes = ring(&network);
    let identifiers: HashMap<i64, usize> =
        nodes.iter().enumerate().map(|(i, node)| (node.probe.settings().identifier(), i)).collect();

    let mut seen = vec![0usize; nodes.len()];
    for uid in 0..200 {
        match nodes[0].probe.start(10, uid, ProbeType::Identifier).outcome().await {
            Some(Outcome::Value(ProbeValue::Identifier { identifier, .. })) => {
                seen[identifiers[&identifier]] += 1;
            },
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    // A regular graph needs no correction; the walk mixes over all nodes.
    assert!(seen.iter().all(|count| *count > 10), "endpoint counts {seen:?}");
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_probe_times_out() {
    let network = network();
    let node = default_node(&network, 0.1, 40);
    let silent = default_node(&network, 0.6, 41);
    network.connect(&node.id, &silent.id);
    network.set_unresponsive(&silent.id, true);

    let started = Instant::now();
    let outcome = node.probe.start(3, 1, ProbeType::Uptime48h).outcome().await;

    assert_eq!(outcome, Some(Outcome::local_error(ProbeError::Timeout)));
    // Forwarded with htl 2: one step of 3 s plus 15 s for the last hop.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(18) && elapsed < Duration::from_millis(18_010), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_waiting() {
    let network = network();
    let node = default_node(&network, 0.1, 50);
    let peer = network.add_node(PeerId::random(), 0.6);
    network.connect(&node.id, &peer.id());

    let handle = node.probe.start(10, 1, ProbeType::Build);
    assert_eq!(network.pending_filters(&node.id), 1);
    network.disconnect(&node.id, &peer.id());

    assert_eq!(handle.outcome().await, Some(Outcome::local_error(ProbeError::Disconnected)));
}

#[tokio::test(start_paused = true)]
async fn test_unadvertised_degree_is_always_accepted() {
    // Known bias: a hub that hides its degree is stepped to unconditionally,
    // while with its real degree most steps towards it would be rejected.
    let network = network();
    let config = ProbeConfig::builder().local_limit(1000).build();
    let leaf = spawn_node(&network, 0.1, 60, config, StaticStats::default());
    let hub = network.add_node(PeerId::random(), 0.5);
    network.connect(&leaf.id, &hub.id());
    for _ in 0..20 {
        let other = network.add_node(PeerId::random(), 0.9);
        network.connect(&hub.id(), &other.id());
    }

    network.set_advertised_degree(&hub.id(), Some(0));
    for uid in 0..100 {
        let _handle = leaf.probe.start(10, uid, ProbeType::Build);
    }
    assert_eq!(network.pending_filters(&leaf.id), 100);

    let mut forwarded_with_real_degree = 0;
    network.set_advertised_degree(&hub.id(), None);
    for uid in 100..200 {
        let before = network.pending_filters(&leaf.id);
        let _handle = leaf.probe.start(10, uid, ProbeType::Build);
        if network.pending_filters(&leaf.id) > before {
            forwarded_with_real_degree += 1;
        }
    }
    // With p = 1/21 per step and several steps per hop budget, only a
    // fraction of walks leave the leaf.
    assert!(forwarded_with_real_degree < 80, "{forwarded_with_real_degree} of 100 walks were forwarded");
}
