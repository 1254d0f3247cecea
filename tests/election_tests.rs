mod common;

use std::time::Duration;

use paxos_election::{
    api::ElectionApi,
    error::PaxosError,
    events::PaxosEvent,
    types::{Phase, RoundFailure, RoundOutcome},
};
use tokio::time::timeout;

use common::{QUORUM, all_nodes, eventually, init_tracing, running_cluster};

const PROPOSER: u32 = 1;

#[tokio::test(flavor = "multi_thread")]
async fn test_uncontested_proposal_with_reliable_nodes() {
    init_tracing();
    let cluster = running_cluster(24_000).await;

    let outcome = cluster.propose(PROPOSER).await.expect("known node");
    assert_eq!(outcome.as_pair(), (true, 1));

    for node in all_nodes() {
        assert_eq!(
            cluster.highest_accepted_value(node).expect("known node"),
            Some(1),
            "node {node} should have accepted the proposal"
        );
    }
    cluster.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_two_nodes_down_still_reaches_consensus() {
    init_tracing();
    let cluster = running_cluster(24_020).await;
    cluster.stop(8).await.expect("stop node 8");
    cluster.stop(9).await.expect("stop node 9");

    let outcome = cluster.propose(3).await.expect("known node");
    assert_eq!(outcome.as_pair(), (true, 3));
    assert_eq!(cluster.highest_accepted_value(8).unwrap(), None);
    assert_eq!(cluster.highest_accepted_value(9).unwrap(), None);
    cluster.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_quorum_scenario_with_nodes_1_4_5_6_7() {
    init_tracing();
    let cluster = running_cluster(24_040).await;
    for node in [2, 3, 8, 9] {
        cluster.stop(node).await.expect("stop node");
    }

    let outcome = cluster.propose(PROPOSER).await.expect("known node");
    assert_eq!(outcome.as_pair(), (true, 1));

    for node in [1, 4, 5, 6, 7] {
        assert_eq!(cluster.highest_accepted_value(node).unwrap(), Some(1));
    }
    for node in [2, 3, 8, 9] {
        assert_eq!(cluster.highest_accepted_value(node).unwrap(), None);
    }
    cluster.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_minority_cannot_reach_consensus() {
    init_tracing();
    let cluster = running_cluster(24_060).await;
    for node in 5..=9 {
        cluster.stop(node).await.expect("stop node");
    }

    let outcome = cluster.propose(PROPOSER).await.expect("known node");
    assert_eq!(outcome.as_pair(), (false, -1));
    assert_eq!(
        outcome,
        RoundOutcome::NoConsensus {
            ballot: outcome.ballot(),
            failure: RoundFailure::InsufficientPromises {
                received: 4,
                required: QUORUM,
            },
        }
    );
    // Nothing may be accepted without a promise quorum.
    for node in all_nodes() {
        assert_eq!(cluster.highest_accepted_value(node).unwrap(), None);
    }
    cluster.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_is_idempotent_and_node_can_restart() {
    init_tracing();
    let cluster = running_cluster(24_080).await;

    assert!(cluster.is_running(4).await);
    cluster.stop(4).await.expect("first stop");
    cluster.stop(4).await.expect("second stop is a no-op");
    assert!(!cluster.is_running(4).await);

    cluster.start(4).await.expect("restart binds again");
    cluster.start(4).await.expect("start on a running node is a no-op");
    assert!(cluster.is_running(4).await);

    assert!(matches!(
        cluster.stop(42).await,
        Err(PaxosError::UnknownNode(42))
    ));
    assert!(matches!(
        cluster.propose(0).await,
        Err(PaxosError::UnknownNode(0))
    ));

    cluster.stop_all().await;
    cluster.stop_all().await;
    for node in all_nodes() {
        assert!(!cluster.is_running(node).await);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_acceptor_state_survives_restart() {
    init_tracing();
    let cluster = running_cluster(24_100).await;
    assert!(cluster.propose(2).await.unwrap().succeeded());

    cluster.stop(6).await.unwrap();
    cluster.start(6).await.unwrap();
    assert_eq!(cluster.highest_accepted_value(6).unwrap(), Some(2));
    cluster.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_learn_reaches_every_running_node() {
    init_tracing();
    let cluster = running_cluster(24_120).await;

    assert_eq!(cluster.propose(5).await.unwrap().as_pair(), (true, 5));
    assert_eq!(cluster.learned_value(5).unwrap(), Some(5));

    let learned = eventually(Duration::from_secs(2), || {
        all_nodes().all(|node| cluster.learned_value(node).unwrap() == Some(5))
    })
    .await;
    assert!(learned, "every node should learn the elected value");
    cluster.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stats_report_agreement() {
    init_tracing();
    let cluster = running_cluster(24_140).await;

    let before = cluster.stats();
    assert_eq!(before.winning_value, None);
    assert!(!before.consensus_reached);

    cluster.propose(7).await.unwrap();
    let after = cluster.stats();
    assert_eq!(after.winning_value, Some(7));
    assert_eq!(after.agreement_count, 9);
    assert_eq!(after.total_nodes, 9);
    assert_eq!(after.quorum, QUORUM);
    assert!(after.consensus_reached);
    cluster.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_round_emits_events() {
    init_tracing();
    let cluster = running_cluster(24_160).await;
    let mut events = cluster.subscribe_to_events();

    cluster.propose(PROPOSER).await.unwrap();

    let mut round_started = false;
    let mut prepare_completed = false;
    let mut accepted_by_peers = 0;
    loop {
        let (node, event) = timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event before timeout")
            .expect("bus open");
        match event {
            PaxosEvent::RoundStarted { .. } => {
                assert_eq!(node, PROPOSER);
                round_started = true;
            }
            PaxosEvent::PhaseCompleted {
                phase: Phase::Prepare,
                responses,
                required,
                ..
            } => {
                assert_eq!(responses, 9);
                assert_eq!(required, QUORUM);
                prepare_completed = true;
            }
            PaxosEvent::Accepted { value, .. } => {
                assert_eq!(value, 1);
                accepted_by_peers += 1;
            }
            PaxosEvent::ConsensusReached { value, .. } => {
                assert_eq!(node, PROPOSER);
                assert_eq!(value, 1);
                break;
            }
            _ => {}
        }
    }
    assert!(round_started);
    assert!(prepare_completed);
    assert_eq!(accepted_by_peers, 9);
    cluster.stop_all().await;
}
