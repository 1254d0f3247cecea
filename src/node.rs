//! A council node: acceptor, proposer and learner in one.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use rand::{SeedableRng, rngs::StdRng};
use tracing::{Span, debug, field, info, instrument, warn};

use crate::{
    acceptor::{AcceptOutcome, AcceptorState, PrepareOutcome},
    error::PaxosError,
    events::{PaxosEvent, PaxosEventBus},
    fault::FaultProfile,
    message::{MessageType, PaxosMessage},
    proposer::{ProposerRound, Tally},
    registry::Registry,
    transport::Transport,
    types::{Ballot, NodeId, Phase, RoundFailure, RoundOutcome, Value},
    utils::generate_round_id,
};

/// One member of the council.
///
/// Acceptor state is owned here and only mutated by this node's own message handling. Other
/// nodes reach it exclusively through the [`Transport`].
pub struct ConsensusNode<T, E>
where
    T: Transport,
    E: PaxosEventBus,
{
    id: NodeId,
    registry: Arc<Registry>,
    transport: Arc<T>,
    event_bus: E,
    acceptor: Mutex<AcceptorState>,
    profile: RwLock<FaultProfile>,
    rng: Mutex<StdRng>,
    learned: Mutex<Option<Value>>,
    /// Highest ballot round this node has issued or observed.
    ballot_round: AtomicU64,
}

impl<T, E> ConsensusNode<T, E>
where
    T: Transport,
    E: PaxosEventBus,
{
    pub fn new(
        id: NodeId,
        registry: Arc<Registry>,
        transport: Arc<T>,
        event_bus: E,
        rng_seed: Option<u64>,
    ) -> Self {
        let rng = match rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(id))),
            None => StdRng::from_os_rng(),
        };
        Self {
            id,
            registry,
            transport,
            event_bus,
            acceptor: Mutex::new(AcceptorState::new()),
            profile: RwLock::new(FaultProfile::default()),
            rng: Mutex::new(rng),
            learned: Mutex::new(None),
            ballot_round: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn fault_profile(&self) -> FaultProfile {
        *self.profile.read()
    }

    /// Takes effect from the next request this node handles; a response already being
    /// delayed keeps the profile it started with.
    pub fn set_fault_profile(&self, profile: FaultProfile) {
        *self.profile.write() = profile;
    }

    /// Snapshot of the acceptor's ballot state.
    pub fn acceptor_state(&self) -> AcceptorState {
        *self.acceptor.lock()
    }

    /// Value of the highest-numbered proposal this node has accepted.
    pub fn highest_accepted_value(&self) -> Option<Value> {
        self.acceptor.lock().highest_accepted_value()
    }

    /// Value announced to this node through LEARN, or decided by its own successful round.
    pub fn learned_value(&self) -> Option<Value> {
        *self.learned.lock()
    }

    fn emit_event(&self, event: PaxosEvent) {
        self.event_bus.publish(self.id, event);
    }

    fn observe_ballot(&self, ballot: Ballot) {
        self.ballot_round.fetch_max(ballot.round(), Ordering::SeqCst);
    }

    /// A ballot strictly above every ballot this node has issued, promised or been refused with.
    pub fn next_ballot(&self) -> Ballot {
        let promised = self.acceptor.lock().promised();
        self.observe_ballot(promised);
        let round = self.ballot_round.fetch_add(1, Ordering::SeqCst) + 1;
        Ballot::new(round, self.id)
    }

    /// Acceptor entry point for a request arriving from a peer.
    ///
    /// The fault profile runs first: it may hold the response back or swallow the request
    /// entirely, in which case `PaxosError::SimulatedDrop` is returned and no state changes.
    /// `Ok(None)` means the request needs no reply (LEARN).
    pub async fn handle_message(
        &self,
        message: PaxosMessage,
    ) -> Result<Option<PaxosMessage>, PaxosError> {
        let kind = message
            .kind()
            .map_err(|_| PaxosError::UnknownMessageType(message.message_type))?;

        let profile = self.fault_profile();
        let action = {
            let mut rng = self.rng.lock();
            profile.plan(&mut *rng)
        };
        if let Err(err) = action.apply().await {
            debug!(node = self.id, from = message.sender_id, ?kind, "request dropped");
            self.emit_event(PaxosEvent::ResponseDropped {
                request: kind,
                from: message.sender_id,
            });
            return Err(err);
        }

        match kind {
            MessageType::Prepare => Ok(Some(self.on_prepare(message.sender_id, message.ballot()))),
            MessageType::Accept => {
                let Some(value) = message.value() else {
                    warn!(node = self.id, from = message.sender_id, "ACCEPT without a value");
                    return Ok(Some(PaxosMessage::nack(self.id, self.acceptor.lock().promised())));
                };
                Ok(Some(self.on_accept(message.sender_id, message.ballot(), value)))
            }
            MessageType::Learn => {
                if let Some(value) = message.value() {
                    self.on_learn(message.sender_id, value);
                }
                Ok(None)
            }
            MessageType::Promise | MessageType::Accepted | MessageType::Nack => {
                warn!(node = self.id, from = message.sender_id, ?kind, "unexpected message");
                Err(PaxosError::UnexpectedMessage(kind))
            }
        }
    }

    fn on_prepare(&self, proposer: NodeId, ballot: Ballot) -> PaxosMessage {
        let outcome = self.acceptor.lock().prepare(ballot);
        match outcome {
            PrepareOutcome::Promised { ballot, accepted } => {
                self.observe_ballot(ballot);
                debug!(node = self.id, proposer, %ballot, "promised");
                self.emit_event(PaxosEvent::Promised { ballot, proposer });
                PaxosMessage::promise(self.id, ballot, accepted)
            }
            PrepareOutcome::Rejected { promised } => {
                debug!(node = self.id, proposer, %ballot, %promised, "rejected prepare");
                self.emit_event(PaxosEvent::Rejected {
                    request: MessageType::Prepare,
                    ballot,
                    promised,
                    proposer,
                });
                PaxosMessage::nack(self.id, promised)
            }
        }
    }

    fn on_accept(&self, proposer: NodeId, ballot: Ballot, value: Value) -> PaxosMessage {
        let outcome = self.acceptor.lock().accept(ballot, value);
        match outcome {
            AcceptOutcome::Accepted { ballot, value } => {
                self.observe_ballot(ballot);
                debug!(node = self.id, proposer, %ballot, value, "accepted");
                self.emit_event(PaxosEvent::Accepted {
                    ballot,
                    value,
                    proposer,
                });
                PaxosMessage::accepted(self.id, ballot, value)
            }
            AcceptOutcome::Rejected { promised } => {
                debug!(node = self.id, proposer, %ballot, %promised, "rejected accept");
                self.emit_event(PaxosEvent::Rejected {
                    request: MessageType::Accept,
                    ballot,
                    promised,
                    proposer,
                });
                PaxosMessage::nack(self.id, promised)
            }
        }
    }

    fn on_learn(&self, from: NodeId, value: Value) {
        *self.learned.lock() = Some(value);
        info!(node = self.id, from, value, "learned elected value");
        self.emit_event(PaxosEvent::Learned { value, from });
    }

    /// Send `message` to every peer concurrently and keep the answers that arrived.
    async fn broadcast_request(&self, message: PaxosMessage) -> Vec<(NodeId, PaxosMessage)> {
        let requests = self.registry.peers_of(self.id).into_iter().map(|peer| {
            let transport = Arc::clone(&self.transport);
            async move { (peer, transport.request(peer, message).await) }
        });

        join_all(requests)
            .await
            .into_iter()
            .filter_map(|(peer, result)| match result {
                Ok(response) => Some((peer, response)),
                Err(err) => {
                    debug!(node = self.id, peer, error = %err, "no response");
                    None
                }
            })
            .collect()
    }

    async fn broadcast_learn(&self, message: PaxosMessage) {
        let notifications = self.registry.peers_of(self.id).into_iter().map(|peer| {
            let transport = Arc::clone(&self.transport);
            async move { (peer, transport.notify(peer, message).await) }
        });

        for (peer, result) in join_all(notifications).await {
            if let Err(err) = result {
                debug!(node = self.id, peer, error = %err, "learn not delivered");
            }
        }
    }

    fn tally(
        &self,
        round: &mut ProposerRound,
        phase: Phase,
        from: NodeId,
        response: &PaxosMessage,
    ) {
        let tally = match phase {
            Phase::Prepare => round.record_promise(from, response),
            Phase::Accept => round.record_accepted(from, response),
        };
        match tally {
            Tally::Rejected(promised) => self.observe_ballot(promised),
            Tally::Duplicate | Tally::Ignored => {
                debug!(node = self.id, from, ?phase, ?tally, "response not counted");
            }
            Tally::Counted => {}
        }
    }

    fn fail(&self, round_id: u32, ballot: Ballot, failure: RoundFailure) -> RoundOutcome {
        info!(node = self.id, %ballot, %failure, "no consensus this round");
        self.emit_event(PaxosEvent::ConsensusFailed {
            round_id,
            ballot,
            failure,
        });
        RoundOutcome::NoConsensus { ballot, failure }
    }

    /// Run one full Paxos round proposing this node's own id.
    ///
    /// The node's co-located acceptor votes in-process; every other member is reached over the
    /// transport. A round below quorum in either phase is a normal outcome, not an error.
    #[instrument(skip(self), fields(node = self.id, ballot = field::Empty))]
    pub async fn propose(&self) -> RoundOutcome {
        let round_id = generate_round_id();
        let ballot = self.next_ballot();
        Span::current().record("ballot", field::display(ballot));
        let mut round = ProposerRound::new(self.id, ballot, self.registry.len());
        info!(%ballot, "starting proposal");
        self.emit_event(PaxosEvent::RoundStarted { round_id, ballot });

        // Phase 1: prepare
        let local = self.on_prepare(self.id, ballot);
        self.tally(&mut round, Phase::Prepare, self.id, &local);
        for (peer, response) in self
            .broadcast_request(PaxosMessage::prepare(self.id, ballot))
            .await
        {
            self.tally(&mut round, Phase::Prepare, peer, &response);
        }
        self.emit_event(PaxosEvent::PhaseCompleted {
            round_id,
            phase: Phase::Prepare,
            responses: round.promise_count(),
            required: round.quorum(),
        });
        if !round.has_promise_quorum() {
            return self.fail(
                round_id,
                ballot,
                RoundFailure::InsufficientPromises {
                    received: round.promise_count(),
                    required: round.quorum(),
                },
            );
        }

        let value = round.choose_value();
        info!(%ballot, value, promises = round.promise_count(), "sending accept");

        // Phase 2: accept
        let local = self.on_accept(self.id, ballot, value);
        self.tally(&mut round, Phase::Accept, self.id, &local);
        for (peer, response) in self
            .broadcast_request(PaxosMessage::accept(self.id, ballot, value))
            .await
        {
            self.tally(&mut round, Phase::Accept, peer, &response);
        }
        self.emit_event(PaxosEvent::PhaseCompleted {
            round_id,
            phase: Phase::Accept,
            responses: round.accept_count(),
            required: round.quorum(),
        });
        if !round.has_accept_quorum() {
            return self.fail(
                round_id,
                ballot,
                RoundFailure::InsufficientAccepts {
                    received: round.accept_count(),
                    required: round.quorum(),
                },
            );
        }

        // Learn
        self.on_learn(self.id, value);
        self.broadcast_learn(PaxosMessage::learn(self.id, ballot, value))
            .await;

        info!(%ballot, value, accepts = round.accept_count(), "consensus reached");
        self.emit_event(PaxosEvent::ConsensusReached {
            round_id,
            ballot,
            value,
        });
        RoundOutcome::Chosen { ballot, value }
    }
}
