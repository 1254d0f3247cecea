//! Acceptor state machine - no I/O, no async, no synchronization.

use crate::types::{Ballot, Value};

/// Ballot state of one acceptor.
///
/// Invariant: the accepted ballot (if any) never exceeds `promised`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptorState {
    promised: Ballot,
    accepted: Option<(Ballot, Value)>,
}

/// Result of handling a PREPARE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// `ballot` is now the promise floor. Reports the highest accepted pair, if any.
    Promised {
        ballot: Ballot,
        accepted: Option<(Ballot, Value)>,
    },
    /// An equal or higher ballot was already promised.
    Rejected { promised: Ballot },
}

/// Result of handling an ACCEPT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted { ballot: Ballot, value: Value },
    /// A higher ballot was already promised.
    Rejected { promised: Ballot },
}

impl AcceptorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn promised(&self) -> Ballot {
        self.promised
    }

    pub fn accepted(&self) -> Option<(Ballot, Value)> {
        self.accepted
    }

    /// Value of the highest-numbered accepted proposal.
    pub fn highest_accepted_value(&self) -> Option<Value> {
        self.accepted.map(|(_, value)| value)
    }

    /// Phase 1b. Strictly greater ballots only: a retried PREPARE at the current floor is
    /// refused rather than promised twice.
    pub fn prepare(&mut self, ballot: Ballot) -> PrepareOutcome {
        if ballot > self.promised {
            self.promised = ballot;
            PrepareOutcome::Promised {
                ballot,
                accepted: self.accepted,
            }
        } else {
            PrepareOutcome::Rejected {
                promised: self.promised,
            }
        }
    }

    /// Phase 2b. Accepts at the promised ballot itself as well as anything above it.
    pub fn accept(&mut self, ballot: Ballot, value: Value) -> AcceptOutcome {
        if !ballot.is_zero() && ballot >= self.promised {
            self.promised = ballot;
            self.accepted = Some((ballot, value));
            AcceptOutcome::Accepted { ballot, value }
        } else {
            AcceptOutcome::Rejected {
                promised: self.promised,
            }
        }
    }
}
