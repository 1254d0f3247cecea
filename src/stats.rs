use std::collections::BTreeMap;

use crate::{
    cluster::Cluster,
    events::PaxosEventBus,
    transport::Transport,
    types::{NodeId, Value},
};

/// Agreement summary across the council at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterStats {
    /// Each node's highest accepted value.
    pub values: BTreeMap<NodeId, Option<Value>>,
    /// Most widely accepted value; ties go to the smaller value.
    pub winning_value: Option<Value>,
    /// How many nodes accepted `winning_value`.
    pub agreement_count: usize,
    pub total_nodes: usize,
    pub quorum: usize,
    /// Whether `winning_value` is held by at least a quorum of nodes.
    pub consensus_reached: bool,
}

impl ClusterStats {
    pub fn from_values(values: BTreeMap<NodeId, Option<Value>>, quorum: usize) -> Self {
        let mut counts: BTreeMap<Value, usize> = BTreeMap::new();
        for value in values.values().flatten() {
            *counts.entry(*value).or_default() += 1;
        }
        let (winning_value, agreement_count) = counts
            .iter()
            .rev()
            .max_by_key(|(_, count)| **count)
            .map_or((None, 0), |(value, count)| (Some(*value), *count));

        Self {
            total_nodes: values.len(),
            values,
            winning_value,
            agreement_count,
            quorum,
            consensus_reached: agreement_count >= quorum,
        }
    }
}

impl<T, E> Cluster<T, E>
where
    T: Transport,
    E: PaxosEventBus,
{
    /// Snapshot of every node's highest accepted value and how far they agree.
    pub fn stats(&self) -> ClusterStats {
        let values = self
            .node_ids()
            .filter_map(|id| {
                self.node(id)
                    .ok()
                    .map(|node| (id, node.highest_accepted_value()))
            })
            .collect();
        ClusterStats::from_values(values, self.quorum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cluster_has_no_winner() {
        let values = (1..=9).map(|id| (id, None)).collect();
        let stats = ClusterStats::from_values(values, 5);
        assert_eq!(stats.winning_value, None);
        assert_eq!(stats.agreement_count, 0);
        assert_eq!(stats.total_nodes, 9);
        assert!(!stats.consensus_reached);
    }

    #[test]
    fn quorum_of_matching_values_is_consensus() {
        let values = (1..=9)
            .map(|id| (id, if id <= 5 { Some(3) } else { Some(7) }))
            .collect();
        let stats = ClusterStats::from_values(values, 5);
        assert_eq!(stats.winning_value, Some(3));
        assert_eq!(stats.agreement_count, 5);
        assert!(stats.consensus_reached);
    }

    #[test]
    fn ties_prefer_the_smaller_value() {
        let values = BTreeMap::from([
            (1, Some(8)),
            (2, Some(8)),
            (3, Some(2)),
            (4, Some(2)),
            (5, None),
        ]);
        let stats = ClusterStats::from_values(values, 3);
        assert_eq!(stats.winning_value, Some(2));
        assert_eq!(stats.agreement_count, 2);
        assert!(!stats.consensus_reached);
    }
}
