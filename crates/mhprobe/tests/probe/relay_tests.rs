//! Local responses and replies travelling back along the path

use std::{collections::HashSet, time::Duration};

use mhprobe::{
    admission::Source, Outcome, PeerId, ProbeConfig, ProbeError, ProbeMessage, ProbeType,
    ProbeValue, ReplyFilter, StaticStats, Transport, WAIT_MAX,
};
use tokio::time::Instant;

use super::{network, spawn_node};

/// Ends every probe at the node that receives it.
fn answer_locally() -> ProbeConfig {
    ProbeConfig::builder().decrement_probability(1.0).local_limit(1000).build()
}

#[tokio::test(start_paused = true)]
async fn test_local_bandwidth_answers_cluster_around_limit() {
    let network = network();
    let node = spawn_node(&network, 0.2, 70, answer_locally(), StaticStats::default());

    let handles: Vec<_> = (0..500).map(|uid| node.probe.start(1, uid, ProbeType::Bandwidth)).collect();
    let mut samples = Vec::new();
    for handle in handles {
        match handle.outcome().await {
            Some(Outcome::Value(ProbeValue::Bandwidth(kib))) => samples.push(f64::from(kib)),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let spread = (samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt() / mean;
    assert!((mean - 20.0).abs() < 0.3, "mean was {mean}");
    assert!((spread - 0.05).abs() < 0.01, "relative spread was {spread}");
}

#[tokio::test(start_paused = true)]
async fn test_local_answers_are_delayed() {
    let network = network();
    let node = spawn_node(&network, 0.2, 80, answer_locally(), StaticStats::default());

    let start = Instant::now();
    let waiters: Vec<_> = (0..200)
        .map(|uid| {
            let handle = node.probe.start(1, uid, ProbeType::Build);
            tokio::spawn(async move { (handle.outcome().await, start.elapsed()) })
        })
        .collect();

    let mut delays = Vec::new();
    for waiter in waiters {
        let (outcome, elapsed) = waiter.await.unwrap();
        assert_eq!(outcome, Some(Outcome::Value(ProbeValue::Build(1))));
        delays.push(elapsed);
    }

    assert!(delays.iter().all(|delay| *delay > Duration::ZERO), "{delays:?}");
    assert!(delays.iter().all(|delay| *delay <= WAIT_MAX), "{delays:?}");
    let distinct: HashSet<_> = delays.iter().collect();
    assert!(distinct.len() > 100, "only {} distinct delays", distinct.len());

    let mean = delays.iter().map(Duration::as_secs_f64).sum::<f64>() / delays.len() as f64;
    assert!((0.2..0.5).contains(&mean), "mean delay was {mean}");
}

#[tokio::test(start_paused = true)]
async fn test_zero_response_delay_answers_at_once() {
    let network = network();
    let config = ProbeConfig::builder()
        .decrement_probability(1.0)
        .response_delay(Duration::ZERO, Duration::ZERO)
        .build();
    let node = spawn_node(&network, 0.2, 81, config, StaticStats::default());

    let start = Instant::now();
    let outcome = node.probe.start(1, 1, ProbeType::Build).outcome().await;

    assert_eq!(outcome, Some(Outcome::Value(ProbeValue::Build(1))));
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_type_is_always_refused() {
    let network = network();
    let node = spawn_node(&network, 0.2, 71, answer_locally(), StaticStats::default());
    node.probe.settings().set_enabled(ProbeType::Bandwidth, false);

    for uid in 0..50 {
        assert_eq!(
            node.probe.start(1, uid, ProbeType::Bandwidth).outcome().await,
            Some(Outcome::Refused)
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_remote_overload_is_not_local() {
    let network = network();
    let origin = spawn_node(&network, 0.2, 72, ProbeConfig::default(), StaticStats::default());
    let refusing = ProbeConfig::builder().peer_limit(0).build();
    let relay = spawn_node(&network, 0.7, 73, refusing, StaticStats::default());
    network.connect(&origin.id, &relay.id);

    let outcome = origin.probe.start(10, 1, ProbeType::Location).outcome().await;

    assert_eq!(outcome, Some(Outcome::Error { error: ProbeError::Overload, code: None, local: false }));
    assert_eq!(relay.probe.admission().tracked_sources(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_remote_refusal_is_relayed() {
    let network = network();
    let origin = spawn_node(&network, 0.2, 74, ProbeConfig::default(), StaticStats::default());
    let endpoint = spawn_node(&network, 0.7, 75, answer_locally(), StaticStats::default());
    endpoint.probe.settings().set_enabled(ProbeType::StoreSize, false);
    network.connect(&origin.id, &endpoint.id);

    // htl 2 always survives the origin's own decrement.
    let outcome = origin.probe.start(2, 1, ProbeType::StoreSize).outcome().await;

    assert_eq!(outcome, Some(Outcome::Refused));
    assert_eq!(endpoint.probe.admission().accepted(&Source::Peer(origin.id)), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unrecognized_type_is_rejected_before_admission() {
    let network = network();
    let node = spawn_node(&network, 0.7, 76, ProbeConfig::default(), StaticStats::default());
    let peer = network.add_node(PeerId::random(), 0.2);
    network.connect(&node.id, &peer.id());

    let reply = peer.register_reply_filter(ReplyFilter::new(node.id, 9, ProbeType::Build)).unwrap();
    peer.send(&node.id, ProbeMessage::Request { uid: 9, htl: 10, probe_type: 99 }).unwrap();

    let reply = reply.await.unwrap();
    assert_eq!(Outcome::from_reply(reply), Some(Outcome::Error {
        error: ProbeError::UnrecognizedType,
        code: Some(99),
        local: false,
    }));
    assert_eq!(node.probe.admission().tracked_sources(), 0);
    assert_eq!(network.pending_filters(&node.id), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_remote_error_code_is_reported_as_unknown() {
    let network = network();
    let origin = spawn_node(&network, 0.2, 77, ProbeConfig::default(), StaticStats::default());
    let peer = network.add_node(PeerId::random(), 0.7);
    network.connect(&origin.id, &peer.id());

    let handle = origin.probe.start(10, 3, ProbeType::Build);
    peer.send(&origin.id, ProbeMessage::Error { uid: 3, error: 200, raw: None }).unwrap();

    assert_eq!(
        handle.outcome().await,
        Some(Outcome::Error { error: ProbeError::Unknown, code: Some(200), local: false })
    );
}

#[tokio::test(start_paused = true)]
async fn test_raw_byte_is_dropped_from_known_remote_errors() {
    let network = network();
    let origin = spawn_node(&network, 0.2, 82, ProbeConfig::default(), StaticStats::default());
    let relay = spawn_node(&network, 0.5, 83, ProbeConfig::default(), StaticStats::default());
    let peer = network.add_node(PeerId::random(), 0.7);
    network.connect(&origin.id, &relay.id);
    network.connect(&relay.id, &peer.id());
    // The relay steps on to the peer rather than back to the origin.
    network.set_advertised_degree(&relay.id, Some(1));
    network.set_advertised_degree(&origin.id, Some(1000));

    let handle = origin.probe.start(10, 4, ProbeType::Build);
    // Let the request reach the relay.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(network.pending_filters(&relay.id), 1);
    peer.send(&relay.id, ProbeMessage::Error { uid: 4, error: 1, raw: Some(7) }).unwrap();

    assert_eq!(
        handle.outcome().await,
        Some(Outcome::Error { error: ProbeError::Overload, code: None, local: false })
    );
}

#[tokio::test(start_paused = true)]
async fn test_link_lengths_cover_every_connection() {
    let network = network();
    let origin = spawn_node(&network, 0.2, 78, ProbeConfig::default(), StaticStats::default());
    let stats = StaticStats { location: 0.5, ..StaticStats::default() };
    let endpoint = spawn_node(&network, 0.5, 79, answer_locally(), stats);
    network.connect(&origin.id, &endpoint.id);
    for location in [0.45, 0.9] {
        let other = network.add_node(PeerId::random(), location);
        network.connect(&endpoint.id, &other.id());
    }
    // Keep the origin's single step to the endpoint certain.
    network.set_advertised_degree(&endpoint.id, Some(1));

    match origin.probe.start(2, 1, ProbeType::LinkLengths).outcome().await {
        Some(Outcome::Value(ProbeValue::LinkLengths(mut lengths))) => {
            lengths.sort_by(f32::total_cmp);
            assert_eq!(lengths.len(), 3);
            assert!((lengths[0] - 0.05).abs() < 0.005, "{lengths:?}");
            assert!((lengths[1] - 0.3).abs() < 0.03, "{lengths:?}");
            assert!((lengths[2] - 0.4).abs() < 0.04, "{lengths:?}");
        },
        other => panic!("unexpected outcome {other:?}"),
    }
}
