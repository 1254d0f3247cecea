//! Fixed council membership and addressing.

use std::net::SocketAddr;

use crate::{
    config::ClusterConfig,
    error::PaxosError,
    types::NodeId,
    utils::majority_quorum,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub name: String,
    pub addr: SocketAddr,
}

/// Ordered, immutable membership list.
#[derive(Debug, Clone)]
pub struct Registry {
    nodes: Vec<NodeDescriptor>,
    quorum: usize,
}

impl Registry {
    /// Node `i` is named `M{i}` and listens on `host:(base_port + i)`.
    pub fn from_config(config: &ClusterConfig) -> Result<Self, PaxosError> {
        config.validate()?;
        let nodes = (1..=config.node_count)
            .map(|id| NodeDescriptor {
                id,
                name: format!("M{id}"),
                // validate() guarantees base_port + node_count fits in a u16
                addr: SocketAddr::new(config.host, config.base_port + id as u16),
            })
            .collect::<Vec<_>>();
        let quorum = majority_quorum(nodes.len());
        Ok(Self { nodes, quorum })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Majority threshold, `floor(N/2) + 1`.
    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|node| node.id)
    }

    pub fn descriptor(&self, id: NodeId) -> Option<&NodeDescriptor> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn address_of(&self, id: NodeId) -> Option<SocketAddr> {
        self.descriptor(id).map(|node| node.addr)
    }

    /// Every member except `id`, in registry order.
    pub fn peers_of(&self, id: NodeId) -> Vec<NodeId> {
        self.ids().filter(|peer| *peer != id).collect()
    }
}
