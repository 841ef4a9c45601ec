//! Node registry: last reported and wanted state per configured node.
//!
//! Pure storage with idempotence and ordering guarantees; no transition
//! logic. The registry is owned exclusively by the control loop (single
//! writer), so methods take `&mut self` and snapshots are cheap clones
//! handed to the pure checker/builder functions.

use std::collections::BTreeMap;

use ahash::AHashMap;
use tracing::debug;

use steward_core::topology::Topology;
use steward_core::types::{NodeId, NodeState};

use super::types::NodeInfo;

/// What happened to an incoming report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Recorded; the node's entry was updated.
    Applied,
    /// Same sequence as the last applied report; redelivery, nothing done.
    Duplicate,
    /// Lower sequence than the last applied report; dropped.
    OutOfOrder,
    /// Node is not in the current topology; dropped.
    UnknownNode,
}

impl ReportOutcome {
    /// Metrics label for the report counter.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ReportOutcome::Applied => "applied",
            ReportOutcome::Duplicate => "duplicate",
            ReportOutcome::OutOfOrder => "out_of_order",
            ReportOutcome::UnknownNode => "unknown_node",
        }
    }
}

/// Live registry of every configured node.
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: AHashMap<NodeId, NodeInfo>,
}

impl NodeRegistry {
    /// One fresh entry per node in the topology.
    #[must_use]
    pub fn new(topology: &Topology) -> Self {
        let mut registry = NodeRegistry { nodes: AHashMap::new() };
        registry.sync_topology(topology);
        registry
    }

    /// Aligns the node set with a replaced topology: new nodes get fresh
    /// entries, removed nodes are dropped (their wanted states with them),
    /// surviving nodes keep their full history.
    pub fn sync_topology(&mut self, topology: &Topology) {
        let configured = topology.node_ids();
        self.nodes.retain(|id, _| configured.contains(id));
        for id in configured {
            self.nodes.entry(id).or_insert_with(|| NodeInfo::new(id));
        }
    }

    /// Applies a node report, enforcing per-node sequence ordering.
    ///
    /// Idempotent: redelivering the last applied sequence is a no-op, and
    /// anything older is dropped. Neither is an error to the reporter.
    pub fn report(
        &mut self,
        node: NodeId,
        state: NodeState,
        sequence: u64,
        now_ms: u64,
    ) -> ReportOutcome {
        let Some(info) = self.nodes.get_mut(&node) else {
            debug!(%node, sequence, "dropping report from node outside the topology");
            return ReportOutcome::UnknownNode;
        };
        match info.last_sequence {
            Some(last) if sequence < last => {
                debug!(%node, sequence, last, "dropping out-of-order report");
                return ReportOutcome::OutOfOrder;
            }
            Some(last) if sequence == last => return ReportOutcome::Duplicate,
            _ => {}
        }
        info.reported = Some(state);
        info.last_report_at_ms = Some(now_ms);
        info.last_sequence = Some(sequence);
        ReportOutcome::Applied
    }

    /// Records an operator's wanted state. Unconditional; the safety checker
    /// has already ruled by the time this is called. Returns `false` for a
    /// node outside the topology.
    pub fn set_wanted(&mut self, node: NodeId, wanted: NodeState) -> bool {
        match self.nodes.get_mut(&node) {
            Some(info) => {
                info.wanted = wanted;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn get(&self, node: NodeId) -> Option<&NodeInfo> {
        self.nodes.get(&node)
    }

    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immutable, deterministic view for the checker and builder.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            nodes: self.nodes.iter().map(|(id, info)| (*id, info.clone())).collect(),
        }
    }
}

/// Frozen copy of the registry at one instant.
///
/// Ordered so that iteration, and everything derived from it, is
/// deterministic for identical registry content.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySnapshot {
    nodes: BTreeMap<NodeId, NodeInfo>,
}

impl RegistrySnapshot {
    #[must_use]
    pub fn get(&self, node: NodeId) -> Option<&NodeInfo> {
        self.nodes.get(&node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeInfo)> {
        self.nodes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Canonical effective state for `node`, including the never-reported
    /// and stale-report demotions. A node missing from the snapshot reads
    /// as never reported.
    #[must_use]
    pub fn effective_state(&self, node: NodeId, now_ms: u64, staleness_ms: u64) -> NodeState {
        self.nodes.get(&node).map_or_else(
            || NodeState::down("no report received"),
            |info| info.effective(now_ms, staleness_ms),
        )
    }
}
