use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use futures::{Stream, future::join_all};
use parking_lot::Mutex;
use rand::{SeedableRng, rngs::StdRng};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::{
    api::ElectionApi,
    config::{ClusterConfig, RetryPolicy},
    error::PaxosError,
    events::{BroadcastEventBus, PaxosEvent, PaxosEventBus},
    fault::FaultProfile,
    listener::{ListenerHandle, spawn_listener},
    node::ConsensusNode,
    registry::Registry,
    transport::{TcpTransport, Transport},
    types::{NodeId, RoundOutcome, Value},
};

/// A fixed council of nodes sharing one registry, transport and event bus.
///
/// Nodes keep their acceptor state for the lifetime of the cluster; stopping a node only takes
/// its listener down.
pub struct Cluster<T = TcpTransport, E = BroadcastEventBus>
where
    T: Transport,
    E: PaxosEventBus,
{
    config: ClusterConfig,
    registry: Arc<Registry>,
    nodes: BTreeMap<NodeId, Arc<ConsensusNode<T, E>>>,
    listeners: AsyncMutex<HashMap<NodeId, ListenerHandle>>,
    event_bus: E,
    retry_rng: Mutex<StdRng>,
}

pub type DefaultCluster = Cluster<TcpTransport, BroadcastEventBus>;

impl DefaultCluster {
    /// TCP cluster described by `config`. No listener runs until [`Cluster::start_all`] or
    /// [`ElectionApi::start`] is called.
    pub fn new(config: ClusterConfig) -> Result<Self, PaxosError> {
        let event_bus = BroadcastEventBus::new(config.event_buffer);
        let timeout = config.request_timeout;
        Self::new_with_components(
            config,
            |registry| TcpTransport::new(registry, timeout),
            event_bus,
        )
    }

    /// Events from every node as a stream.
    pub fn event_stream(&self) -> impl Stream<Item = (NodeId, PaxosEvent)> + Send + 'static {
        self.event_bus.stream()
    }
}

impl<T, E> Cluster<T, E>
where
    T: Transport,
    E: PaxosEventBus,
{
    pub fn new_with_components<F>(
        config: ClusterConfig,
        make_transport: F,
        event_bus: E,
    ) -> Result<Self, PaxosError>
    where
        F: FnOnce(Arc<Registry>) -> T,
    {
        config.validate()?;
        let registry = Arc::new(Registry::from_config(&config)?);
        let transport = Arc::new(make_transport(Arc::clone(&registry)));

        let nodes = registry
            .ids()
            .map(|id| {
                let node = ConsensusNode::new(
                    id,
                    Arc::clone(&registry),
                    Arc::clone(&transport),
                    event_bus.clone(),
                    config.rng_seed,
                );
                (id, Arc::new(node))
            })
            .collect();

        let retry_rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            config,
            registry,
            nodes,
            listeners: AsyncMutex::new(HashMap::new()),
            event_bus,
            retry_rng: Mutex::new(retry_rng),
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn quorum(&self) -> usize {
        self.registry.quorum()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn subscribe_to_events(&self) -> E::Receiver {
        self.event_bus.subscribe()
    }

    pub fn node(&self, id: NodeId) -> Result<&Arc<ConsensusNode<T, E>>, PaxosError> {
        self.nodes.get(&id).ok_or(PaxosError::UnknownNode(id))
    }

    pub fn fault_profile(&self, id: NodeId) -> Result<FaultProfile, PaxosError> {
        Ok(self.node(id)?.fault_profile())
    }

    pub fn learned_value(&self, id: NodeId) -> Result<Option<Value>, PaxosError> {
        Ok(self.node(id)?.learned_value())
    }

    pub async fn is_running(&self, id: NodeId) -> bool {
        self.listeners
            .lock()
            .await
            .get(&id)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub(crate) async fn start_listener(&self, id: NodeId) -> Result<(), PaxosError> {
        let node = Arc::clone(self.node(id)?);
        let descriptor = self
            .registry
            .descriptor(id)
            .ok_or(PaxosError::UnknownNode(id))?;

        let mut listeners = self.listeners.lock().await;
        if listeners
            .get(&id)
            .is_some_and(|handle| !handle.is_finished())
        {
            return Ok(());
        }
        debug!(node = id, name = %descriptor.name, "starting listener");
        let handle = spawn_listener(node, descriptor.addr).await?;
        listeners.insert(id, handle);
        Ok(())
    }

    pub(crate) async fn stop_listener(&self, id: NodeId) -> Result<(), PaxosError> {
        self.node(id)?;
        let handle = self.listeners.lock().await.remove(&id);
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        Ok(())
    }

    /// Start every node's listener. Nodes that fail to bind stay down and are reported; the
    /// rest keep running.
    pub async fn start_all(&self) -> Vec<(NodeId, PaxosError)> {
        let mut failures = Vec::new();
        for id in self.registry.ids() {
            if let Err(err) = self.start_listener(id).await {
                warn!(node = id, error = %err, "node did not join the network");
                failures.push((id, err));
            }
        }
        info!(
            running = self.registry.len() - failures.len(),
            failed = failures.len(),
            "cluster started"
        );
        failures
    }

    pub async fn stop_all(&self) {
        let handles: Vec<_> = self.listeners.lock().await.drain().map(|(_, h)| h).collect();
        join_all(handles.into_iter().map(ListenerHandle::shutdown)).await;
        info!("cluster stopped");
    }

    /// Repeat [`ElectionApi::propose`] from `id` until a round succeeds or the policy's attempts
    /// run out, sleeping a jittered exponential backoff between rounds. Returns the last outcome.
    pub async fn propose_with_retry(
        &self,
        id: NodeId,
        policy: &RetryPolicy,
    ) -> Result<RoundOutcome, PaxosError> {
        policy.validate()?;
        let mut attempt = 0;
        loop {
            let outcome = self.propose(id).await?;
            attempt += 1;
            if outcome.succeeded() || attempt >= policy.max_attempts {
                return Ok(outcome);
            }
            let backoff = {
                let mut rng = self.retry_rng.lock();
                policy.backoff(attempt - 1, &mut *rng)
            };
            info!(node = id, attempt, ?backoff, "retrying proposal");
            tokio::time::sleep(backoff).await;
        }
    }
}
