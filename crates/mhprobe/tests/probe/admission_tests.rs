//! Admission control scenarios

use std::time::Duration;

use mhprobe::{
    admission::Source, Outcome, ProbeConfig, ProbeError, ProbeMessage, ProbeType, ReplyFilter,
    Transport,
};

use super::{default_node, network, spawn_node};

#[tokio::test(start_paused = true)]
async fn test_isolated_node_reports_disconnected() {
    let network = network();
    let node = default_node(&network, 0.3, 1);

    let outcome = node.probe.start(10, 1, ProbeType::Bandwidth).outcome().await;

    assert_eq!(outcome, Some(Outcome::local_error(ProbeError::Disconnected)));
    // Only the local window exists; there is no peer to hold one.
    assert_eq!(node.probe.admission().accepted(&Source::Local), 1);
    assert_eq!(node.probe.admission().tracked_sources(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_peer_at_ceiling_is_overloaded() {
    let network = network();
    let node = default_node(&network, 0.3, 2);
    // A bare transport: requests sent to it are never answered.
    let peer = network.add_node(mhprobe::PeerId::random(), 0.7);
    assert!(network.connect(&node.id, &peer.id()));
    let source = Source::Peer(peer.id());

    for uid in 0..10 {
        node.probe.handle_message(
            peer.id(),
            ProbeMessage::Request { uid, htl: 10, probe_type: ProbeType::Build.code() },
        );
    }
    assert_eq!(node.probe.admission().accepted(&source), 10);
    // Both degrees are 1, so every request was forwarded back to the peer.
    assert_eq!(network.pending_filters(&node.id), 10);

    let reply = peer.register_reply_filter(ReplyFilter::new(node.id, 10, ProbeType::Build)).unwrap();
    node.probe.handle_message(
        peer.id(),
        ProbeMessage::Request { uid: 10, htl: 10, probe_type: ProbeType::Build.code() },
    );

    let reply = reply.await.unwrap();
    assert_eq!(reply, ProbeMessage::Error { uid: 10, error: ProbeError::Overload.code(), raw: None });
    assert_eq!(Outcome::from_reply(reply), Some(Outcome::Error {
        error: ProbeError::Overload,
        code: None,
        local: false,
    }));
    assert_eq!(node.probe.admission().accepted(&source), 10);
    assert_eq!(network.pending_filters(&node.id), 10);
}

#[tokio::test(start_paused = true)]
async fn test_slots_expire_after_window() {
    let network = network();
    let node = default_node(&network, 0.3, 3);
    let peer = network.add_node(mhprobe::PeerId::random(), 0.7);
    network.connect(&node.id, &peer.id());
    let source = Source::Peer(peer.id());

    for uid in 0..10 {
        node.probe.handle_message(
            peer.id(),
            ProbeMessage::Request { uid, htl: 5, probe_type: ProbeType::Build.code() },
        );
    }
    assert!(!node.probe.admission().try_admit(&source));

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(node.probe.admission().accepted(&source), 10);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(node.probe.admission().accepted(&source), 0);
    assert_eq!(node.probe.admission().tracked_sources(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_local_ceiling() {
    let network = network();
    let config = ProbeConfig::builder().local_limit(3).build();
    let node = spawn_node(&network, 0.3, 4, config, Default::default());

    let mut handles = Vec::new();
    for uid in 0..4 {
        handles.push(node.probe.start(10, uid, ProbeType::Location));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.outcome().await);
    }
    let disconnected = Some(Outcome::local_error(ProbeError::Disconnected));
    assert_eq!(outcomes[..3], [disconnected.clone(), disconnected.clone(), disconnected]);
    assert_eq!(outcomes[3], Some(Outcome::local_error(ProbeError::Overload)));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_htl_is_dropped_without_side_effects() {
    let network = network();
    let node = default_node(&network, 0.3, 5);
    let peer = network.add_node(mhprobe::PeerId::random(), 0.7);
    network.connect(&node.id, &peer.id());

    assert_eq!(node.probe.start(0, 1, ProbeType::Build).outcome().await, None);

    let reply = peer.register_reply_filter(ReplyFilter::new(node.id, 2, ProbeType::Build)).unwrap();
    node.probe.handle_message(
        peer.id(),
        ProbeMessage::Request { uid: 2, htl: 0, probe_type: ProbeType::Build.code() },
    );

    assert_eq!(network.pending_filters(&peer.id()), 1);
    assert!(tokio::time::timeout(Duration::from_secs(120), reply).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_htl_holds_no_slot() {
    let network = network();
    let node = default_node(&network, 0.3, 6);

    let _ = node.probe.start(0, 1, ProbeType::Build);
    node.probe.handle_message(
        mhprobe::PeerId::random(),
        ProbeMessage::Request { uid: 2, htl: 0, probe_type: ProbeType::Build.code() },
    );

    assert_eq!(node.probe.admission().tracked_sources(), 0);
}
