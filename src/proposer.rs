//! Per-round proposer bookkeeping: response tallies and value selection.

use std::collections::{HashMap, HashSet};

use crate::{
    message::{MessageType, PaxosMessage},
    types::{Ballot, NodeId, Value},
    utils::majority_quorum,
};

/// How a response affected the tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tally {
    /// A new vote from this sender.
    Counted,
    /// The sender already voted in this phase.
    Duplicate,
    /// The acceptor refused; carries the ballot it is bound to.
    Rejected(Ballot),
    /// Not a vote for this round (wrong type, ballot or value).
    Ignored,
}

/// Ephemeral state of a single `propose` call.
///
/// Votes are keyed by sender, so a repeated answer never counts twice toward quorum.
#[derive(Debug, Clone)]
pub struct ProposerRound {
    node: NodeId,
    ballot: Ballot,
    quorum: usize,
    promises: HashMap<NodeId, Option<(Ballot, Value)>>,
    accepts: HashSet<NodeId>,
    value: Option<Value>,
}

impl ProposerRound {
    pub fn new(node: NodeId, ballot: Ballot, node_count: usize) -> Self {
        Self {
            node,
            ballot,
            quorum: majority_quorum(node_count),
            promises: HashMap::new(),
            accepts: HashSet::new(),
            value: None,
        }
    }

    pub fn ballot(&self) -> Ballot {
        self.ballot
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn promise_count(&self) -> usize {
        self.promises.len()
    }

    pub fn accept_count(&self) -> usize {
        self.accepts.len()
    }

    pub fn has_promise_quorum(&self) -> bool {
        self.promise_count() >= self.quorum
    }

    pub fn has_accept_quorum(&self) -> bool {
        self.accept_count() >= self.quorum
    }

    /// Value sent in phase 2, once chosen.
    pub fn value(&self) -> Option<Value> {
        self.value
    }

    /// Record a phase 1 response from `from`.
    pub fn record_promise(&mut self, from: NodeId, response: &PaxosMessage) -> Tally {
        match response.kind() {
            Ok(MessageType::Promise) if response.ballot() == self.ballot => {
                if self.promises.contains_key(&from) {
                    return Tally::Duplicate;
                }
                self.promises.insert(from, response.accepted_pair());
                Tally::Counted
            }
            Ok(MessageType::Nack) => Tally::Rejected(response.ballot()),
            _ => Tally::Ignored,
        }
    }

    /// Pick the phase 2 value: the value accepted at the highest ballot among the promises,
    /// or this node's own id when no promise reported one.
    pub fn choose_value(&mut self) -> Value {
        let value = self
            .promises
            .values()
            .flatten()
            .max_by_key(|(ballot, _)| *ballot)
            .map_or(self.node, |(_, value)| *value);
        self.value = Some(value);
        value
    }

    /// Record a phase 2 response from `from`.
    pub fn record_accepted(&mut self, from: NodeId, response: &PaxosMessage) -> Tally {
        match response.kind() {
            Ok(MessageType::Accepted)
                if response.ballot() == self.ballot && response.value() == self.value =>
            {
                if self.accepts.insert(from) {
                    Tally::Counted
                } else {
                    Tally::Duplicate
                }
            }
            Ok(MessageType::Nack) => Tally::Rejected(response.ballot()),
            _ => Tally::Ignored,
        }
    }
}
