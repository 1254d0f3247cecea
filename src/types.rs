use std::fmt;

/// Identity of a council node, `1..=node_count`.
pub type NodeId = u32;

/// The elected value. In an election every node proposes its own id, so a value is a node id.
pub type Value = NodeId;

/// Low bits of a ballot reserved for the issuing node's id.
pub const NODE_ID_BITS: u32 = 8;
const NODE_ID_MASK: u64 = (1 << NODE_ID_BITS) - 1;

/// Totally ordered proposal number.
///
/// Laid out as `(round << 8) | node_id`, so ballots from different nodes never collide and
/// a higher round always wins regardless of which node issued it. [`Ballot::ZERO`] means
/// "no ballot seen".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ballot(u64);

impl Ballot {
    pub const ZERO: Ballot = Ballot(0);

    pub fn new(round: u64, node: NodeId) -> Self {
        Ballot((round << NODE_ID_BITS) | (u64::from(node) & NODE_ID_MASK))
    }

    /// Wrap a raw wire value without interpreting it.
    pub const fn from_raw(raw: u64) -> Self {
        Ballot(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn round(self) -> u64 {
        self.0 >> NODE_ID_BITS
    }

    pub fn node(self) -> NodeId {
        (self.0 & NODE_ID_MASK) as NodeId
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Ballot {
    fn from(raw: u64) -> Self {
        Ballot::from_raw(raw)
    }
}

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.round(), self.node())
    }
}

/// The two request phases a proposer drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Phase 1: PREPARE / PROMISE.
    Prepare,
    /// Phase 2: ACCEPT / ACCEPTED.
    Accept,
}

/// Why a round ended without consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundFailure {
    /// Fewer than `required` acceptors promised the ballot.
    InsufficientPromises { received: usize, required: usize },
    /// Fewer than `required` acceptors accepted the chosen value.
    InsufficientAccepts { received: usize, required: usize },
}

impl fmt::Display for RoundFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundFailure::InsufficientPromises { received, required } => {
                write!(f, "{received}/{required} promises")
            }
            RoundFailure::InsufficientAccepts { received, required } => {
                write!(f, "{received}/{required} accepts")
            }
        }
    }
}

/// Result of one `propose` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// A quorum accepted `value` at `ballot`; LEARN has been broadcast.
    Chosen { ballot: Ballot, value: Value },
    /// No consensus this round. The caller may retry; the next ballot will be higher.
    NoConsensus { ballot: Ballot, failure: RoundFailure },
}

impl RoundOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, RoundOutcome::Chosen { .. })
    }

    /// The chosen value, if the round succeeded.
    pub fn value(&self) -> Option<Value> {
        match self {
            RoundOutcome::Chosen { value, .. } => Some(*value),
            RoundOutcome::NoConsensus { .. } => None,
        }
    }

    pub fn ballot(&self) -> Ballot {
        match self {
            RoundOutcome::Chosen { ballot, .. } | RoundOutcome::NoConsensus { ballot, .. } => {
                *ballot
            }
        }
    }

    /// `(succeeded, value)` with `-1` standing for "no value", as reported on the wire.
    pub fn as_pair(&self) -> (bool, i64) {
        (
            self.succeeded(),
            self.value().map_or(crate::message::NO_VALUE, i64::from),
        )
    }
}
