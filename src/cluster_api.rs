//! Implementation of [`ElectionApi`] for [`Cluster`].

use crate::{
    api::ElectionApi,
    cluster::Cluster,
    error::PaxosError,
    events::PaxosEventBus,
    fault::FaultProfile,
    transport::Transport,
    types::{NodeId, RoundOutcome, Value},
};

impl<T, E> ElectionApi for Cluster<T, E>
where
    T: Transport,
    E: PaxosEventBus,
{
    /// Run one Paxos round with `node` as proposer, proposing its own id.
    ///
    /// A round that gathers fewer than a quorum of promises or accepts is reported as
    /// [`RoundOutcome::NoConsensus`]; only an unknown node id is an error.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use paxos_election::{api::ElectionApi, cluster::DefaultCluster, config::ClusterConfig};
    ///
    /// async fn example() -> Result<(), Box<dyn std::error::Error>> {
    ///     let cluster = DefaultCluster::new(ClusterConfig::default())?;
    ///     cluster.start_all().await;
    ///
    ///     let (succeeded, value) = cluster.propose(1).await?.as_pair();
    ///     assert!(succeeded);
    ///     assert_eq!(value, 1);
    ///     Ok(())
    /// }
    /// ```
    async fn propose(&self, node: NodeId) -> Result<RoundOutcome, PaxosError> {
        Ok(self.node(node)?.propose().await)
    }

    /// Replace the fault profile `node` applies to the requests it answers.
    ///
    /// A response already being delayed finishes under the profile it started with.
    fn set_fault_profile(&self, node: NodeId, profile: FaultProfile) -> Result<(), PaxosError> {
        self.node(node)?.set_fault_profile(profile);
        Ok(())
    }

    /// Value of the highest-numbered proposal `node` has accepted, `None` if it accepted nothing.
    fn highest_accepted_value(&self, node: NodeId) -> Result<Option<Value>, PaxosError> {
        Ok(self.node(node)?.highest_accepted_value())
    }

    /// Bring `node`'s listener up. Starting a running node does nothing.
    async fn start(&self, node: NodeId) -> Result<(), PaxosError> {
        self.start_listener(node).await
    }

    /// Take `node`'s listener down. Stopping a stopped node does nothing.
    async fn stop(&self, node: NodeId) -> Result<(), PaxosError> {
        self.stop_listener(node).await
    }
}
