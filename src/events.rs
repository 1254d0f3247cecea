use futures::Stream;
use tokio::sync::broadcast;

use crate::{
    message::MessageType,
    types::{Ballot, NodeId, Phase, RoundFailure, Value},
};

/// Diagnostic events emitted by nodes. Purely observational: nothing in the protocol reads them.
#[derive(Debug, Clone, PartialEq)]
pub enum PaxosEvent {
    /// A proposer began a round.
    RoundStarted { round_id: u32, ballot: Ballot },
    /// A proposer finished collecting responses for one phase.
    PhaseCompleted {
        round_id: u32,
        phase: Phase,
        responses: usize,
        required: usize,
    },
    /// A proposer's round succeeded.
    ConsensusReached {
        round_id: u32,
        ballot: Ballot,
        value: Value,
    },
    /// A proposer's round ended below quorum.
    ConsensusFailed {
        round_id: u32,
        ballot: Ballot,
        failure: RoundFailure,
    },
    /// This acceptor promised `ballot` to `proposer`.
    Promised { ballot: Ballot, proposer: NodeId },
    /// This acceptor refused a PREPARE or ACCEPT because it is bound to `promised`.
    Rejected {
        request: MessageType,
        ballot: Ballot,
        promised: Ballot,
        proposer: NodeId,
    },
    /// This acceptor accepted `value` at `ballot`.
    Accepted {
        ballot: Ballot,
        value: Value,
        proposer: NodeId,
    },
    /// This node learned the elected value.
    Learned { value: Value, from: NodeId },
    /// The fault profile swallowed a request from `from`.
    ResponseDropped { request: MessageType, from: NodeId },
}

pub trait PaxosEventBus: Clone + Send + Sync + 'static {
    /// Type returned to consumers that subscribe to node events.
    type Receiver;

    fn subscribe(&self) -> Self::Receiver;
    fn publish(&self, node: NodeId, event: PaxosEvent);
}

#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<(NodeId, PaxosEvent)>,
}

impl BroadcastEventBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    /// Events from the moment of the call onwards as a stream. Events missed because the
    /// consumer lagged behind are skipped.
    pub fn stream(&self) -> impl Stream<Item = (NodeId, PaxosEvent)> + Send + 'static {
        let mut receiver = self.sender.subscribe();
        async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(item) => yield item,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl PaxosEventBus for BroadcastEventBus {
    type Receiver = broadcast::Receiver<(NodeId, PaxosEvent)>;

    fn subscribe(&self) -> Self::Receiver {
        self.sender.subscribe()
    }

    fn publish(&self, node: NodeId, event: PaxosEvent) {
        let _ = self.sender.send((node, event));
    }
}
