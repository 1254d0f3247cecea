#![allow(dead_code)]

use std::time::Duration;

use paxos_election::{
    cluster::DefaultCluster,
    config::ClusterConfig,
    types::NodeId,
};

pub const NODE_COUNT: usize = 9;
pub const QUORUM: usize = 5;

/// Install a process-wide fmt subscriber once, so listener tasks on worker threads log too.
/// Uses RUST_LOG for filtering, defaulting to this crate at debug.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("paxos_election=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn config(base_port: u16) -> ClusterConfig {
    ClusterConfig::builder()
        .fast_local_preset(base_port)
        .with_rng_seed(u64::from(base_port))
        .build()
        .expect("valid test configuration")
}

/// Nine-node cluster with every listener up.
pub async fn running_cluster(base_port: u16) -> DefaultCluster {
    running_cluster_with(config(base_port)).await
}

pub async fn running_cluster_with(config: ClusterConfig) -> DefaultCluster {
    let cluster = DefaultCluster::new(config).expect("cluster should build");
    let failures = cluster.start_all().await;
    assert!(failures.is_empty(), "listeners failed to bind: {failures:?}");
    cluster
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn all_nodes() -> impl Iterator<Item = NodeId> {
    1..=NODE_COUNT as NodeId
}
