use std::net::SocketAddr;

use crate::types::NodeId;

/// Why a single request/response exchange produced no answer.
///
/// Every variant is a non-vote to the proposer; none of them is fatal.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Peer did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("Peer unreachable: {0}")]
    Unreachable(#[source] std::io::Error),
    #[error("Peer closed the connection without replying")]
    Dropped,
    #[error("Frame error: {0}")]
    Codec(#[source] std::io::Error),
    #[error("Malformed message: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("No address known for node {0}")]
    UnknownPeer(NodeId),
}

#[derive(Debug, thiserror::Error)]
pub enum PaxosError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("Response dropped by fault profile")]
    SimulatedDrop,
    #[error("Node {node} failed to bind {addr}: {source}")]
    Bind {
        node: NodeId,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),
    #[error("Unknown message type {0}")]
    UnknownMessageType(i32),
    #[error("Unexpected message type {0:?} for acceptor")]
    UnexpectedMessage(crate::message::MessageType),
    #[error("Invalid cluster configuration: {0}")]
    InvalidConfiguration(String),
}
