mod common;

use std::time::{Duration, Instant};

use futures::StreamExt;
use paxos_election::{
    api::ElectionApi,
    config::{ClusterConfig, RetryPolicy},
    events::PaxosEvent,
    fault::FaultProfile,
    message::MessageType,
    types::{RoundFailure, RoundOutcome},
};

use common::{QUORUM, init_tracing, running_cluster, running_cluster_with};

fn always_drop() -> FaultProfile {
    FaultProfile::unreliable_with(1.0, Duration::ZERO).expect("valid probability")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dropping_peers_leave_proposer_without_quorum() {
    init_tracing();
    let cluster = running_cluster(24_400).await;
    for node in 2..=9 {
        cluster.set_fault_profile(node, always_drop()).unwrap();
    }
    assert_eq!(cluster.fault_profile(2).unwrap(), always_drop());

    let outcome = cluster.propose(1).await.unwrap();
    assert!(matches!(
        outcome,
        RoundOutcome::NoConsensus {
            failure: RoundFailure::InsufficientPromises { received: 1, .. },
            ..
        }
    ));
    // Dropped requests leave the acceptor untouched.
    for node in 2..=9 {
        assert!(cluster.node(node).unwrap().acceptor_state().promised().is_zero());
    }
    cluster.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dropped_requests_are_reported_as_events() {
    init_tracing();
    let cluster = running_cluster(24_420).await;
    cluster.set_fault_profile(6, always_drop()).unwrap();
    let events = cluster.event_stream();

    assert!(cluster.propose(1).await.unwrap().succeeded());

    let dropped = events
        .filter_map(|(node, event)| async move {
            match event {
                PaxosEvent::ResponseDropped { request, from } if node == 6 => Some((request, from)),
                _ => None,
            }
        })
        .take(2)
        .collect::<Vec<_>>();
    let dropped = tokio::time::timeout(Duration::from_secs(2), dropped)
        .await
        .expect("both phases should hit the dropping node");
    assert_eq!(
        dropped,
        vec![(MessageType::Prepare, 1), (MessageType::Accept, 1)]
    );
    cluster.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_slow_peers_bound_phase_duration_by_timeout() {
    init_tracing();
    let request_timeout = Duration::from_millis(300);
    let config = ClusterConfig::builder()
        .fast_local_preset(24_440)
        .with_request_timeout(request_timeout)
        .build()
        .unwrap();
    let cluster = running_cluster_with(config).await;
    for node in 6..=9 {
        cluster.set_fault_profile(node, FaultProfile::large_delay()).unwrap();
    }

    let started = Instant::now();
    let outcome = cluster.propose(1).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome.as_pair(), (true, 1));
    // Two phases, each waiting at most about one timeout for the slow peers.
    assert!(
        elapsed < request_timeout * 5,
        "round took {elapsed:?} with a {request_timeout:?} timeout"
    );
    cluster.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_small_delay_still_reaches_consensus() {
    init_tracing();
    let cluster = running_cluster(24_460).await;
    for node in 1..=9 {
        cluster.set_fault_profile(node, FaultProfile::small_delay()).unwrap();
    }

    let outcome = cluster.propose(4).await.unwrap();
    assert_eq!(outcome.as_pair(), (true, 4));
    assert!(cluster.stats().agreement_count >= QUORUM);
    cluster.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_profile_change_applies_to_next_round() {
    init_tracing();
    let cluster = running_cluster(24_480).await;
    for node in 2..=9 {
        cluster.set_fault_profile(node, always_drop()).unwrap();
    }
    let policy = RetryPolicy::default()
        .with_max_attempts(2)
        .with_backoff(Duration::from_millis(10), Duration::from_millis(20));

    let failed = cluster.propose_with_retry(1, &policy).await.unwrap();
    assert!(!failed.succeeded());

    for node in 2..=9 {
        cluster.set_fault_profile(node, FaultProfile::Immediate).unwrap();
    }
    let recovered = cluster.propose_with_retry(1, &policy).await.unwrap();
    assert_eq!(recovered.as_pair(), (true, 1));
    cluster.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreliable_cluster_never_disagrees() {
    init_tracing();
    let config = ClusterConfig::builder()
        .fast_local_preset(24_500)
        .with_rng_seed(11)
        .build()
        .unwrap();
    let cluster = running_cluster_with(config).await;
    let flaky = FaultProfile::unreliable_with(0.3, Duration::from_millis(100)).unwrap();
    for node in 1..=9 {
        cluster.set_fault_profile(node, flaky).unwrap();
    }

    let mut values = Vec::new();
    for proposer in [1, 2, 3, 4] {
        let outcome = cluster
            .propose_with_retry(proposer, &RetryPolicy::default())
            .await
            .unwrap();
        values.extend(outcome.value());
    }
    values.sort_unstable();
    values.dedup();
    assert!(values.len() <= 1, "rounds chose different values: {values:?}");
    cluster.stop_all().await;
}
