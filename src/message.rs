//! Wire messages exchanged between nodes.
//!
//! Each message is a protobuf record; one message travels per frame.

use crate::types::{Ballot, NodeId, Value};

/// Wire encoding of "no value".
pub const NO_VALUE: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MessageType {
    Prepare = 0,
    Promise = 1,
    Accept = 2,
    Accepted = 3,
    Nack = 4,
    Learn = 5,
}

#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct PaxosMessage {
    #[prost(enumeration = "MessageType", tag = "1")]
    pub message_type: i32,
    #[prost(uint32, tag = "2")]
    pub sender_id: u32,
    /// Ballot under discussion. A NACK carries the rejecting acceptor's promised ballot.
    #[prost(uint64, tag = "3")]
    pub proposal_number: u64,
    /// Proposed, accepted or elected value; [`NO_VALUE`] when there is none.
    #[prost(sint64, tag = "4")]
    pub value: i64,
    /// PROMISE only: ballot at which `value` was accepted, 0 when nothing was accepted.
    #[prost(uint64, tag = "5")]
    pub accepted_ballot: u64,
}

fn encode_value(value: Option<Value>) -> i64 {
    value.map_or(NO_VALUE, i64::from)
}

impl PaxosMessage {
    fn build(
        message_type: MessageType,
        sender: NodeId,
        ballot: Ballot,
        value: Option<Value>,
    ) -> Self {
        Self {
            message_type: message_type as i32,
            sender_id: sender,
            proposal_number: ballot.as_u64(),
            value: encode_value(value),
            accepted_ballot: 0,
        }
    }

    pub fn prepare(sender: NodeId, ballot: Ballot) -> Self {
        Self::build(MessageType::Prepare, sender, ballot, None)
    }

    /// Promise for `ballot`, reporting the highest accepted `(ballot, value)` if any.
    pub fn promise(sender: NodeId, ballot: Ballot, accepted: Option<(Ballot, Value)>) -> Self {
        let mut message = Self::build(
            MessageType::Promise,
            sender,
            ballot,
            accepted.map(|(_, value)| value),
        );
        message.accepted_ballot = accepted.map_or(0, |(ballot, _)| ballot.as_u64());
        message
    }

    pub fn accept(sender: NodeId, ballot: Ballot, value: Value) -> Self {
        Self::build(MessageType::Accept, sender, ballot, Some(value))
    }

    pub fn accepted(sender: NodeId, ballot: Ballot, value: Value) -> Self {
        Self::build(MessageType::Accepted, sender, ballot, Some(value))
    }

    pub fn nack(sender: NodeId, promised: Ballot) -> Self {
        Self::build(MessageType::Nack, sender, promised, None)
    }

    pub fn learn(sender: NodeId, ballot: Ballot, value: Value) -> Self {
        Self::build(MessageType::Learn, sender, ballot, Some(value))
    }

    /// Strictly decoded message type; unknown wire values are an error rather than a default.
    pub fn kind(&self) -> Result<MessageType, prost::UnknownEnumValue> {
        MessageType::try_from(self.message_type)
    }

    pub fn ballot(&self) -> Ballot {
        Ballot::from_raw(self.proposal_number)
    }

    /// Decoded value; negative or out-of-range wire values read as "no value".
    pub fn value(&self) -> Option<Value> {
        Value::try_from(self.value).ok()
    }

    /// The accepted `(ballot, value)` carried by a PROMISE.
    pub fn accepted_pair(&self) -> Option<(Ballot, Value)> {
        let value = self.value()?;
        if self.accepted_ballot == 0 {
            return None;
        }
        Some((Ballot::from_raw(self.accepted_ballot), value))
    }
}
