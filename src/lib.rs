//! Single-decree Paxos for electing one value among a fixed council of nodes.
//!
//! Every node is acceptor, proposer and learner at once. A proposer runs two phases against
//! its peers over TCP: PREPARE/PROMISE to claim a ballot and learn any value already accepted,
//! then ACCEPT/ACCEPTED to get a majority to accept it, after which it announces the result
//! with LEARN. A majority is 5 of the default 9 nodes.
//!
//! Each node carries a [`fault::FaultProfile`] that delays or drops the responses it sends,
//! so the protocol can be exercised under slow and lossy links. A peer that does not answer in
//! time simply does not count toward quorum; a round below quorum is an ordinary outcome.
//!
//! The main entry point is [`cluster::Cluster`], driven through [`api::ElectionApi`].

pub mod acceptor;
pub mod api;
pub mod cluster;
pub mod cluster_api;
pub mod config;
pub mod error;
pub mod events;
pub mod fault;
pub mod listener;
pub mod message;
pub mod node;
pub mod proposer;
pub mod registry;
pub mod stats;
pub mod transport;
pub mod types;
pub mod utils;
