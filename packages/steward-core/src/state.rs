//! The versioned cluster state: the one artifact the controller exists to
//! produce.
//!
//! A [`ClusterState`] is immutable once built. Versions increase strictly and
//! survive controller restarts (the controller persists each version before
//! publishing it), so every consumer can order states by version alone and
//! drop anything older than what it already holds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Availability, NodeId, NodeState, NodeType};

/// Immutable snapshot of the whole cluster at one version.
///
/// `node_states` is a `BTreeMap` so serialization order is deterministic;
/// two states with equal content encode to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterState {
    /// Strictly increasing for the lifetime of the cluster, never reset.
    pub version: u64,

    /// Effective state per configured node.
    pub node_states: BTreeMap<NodeId, NodeState>,

    /// Bucket-split depth nodes must use for data placement.
    pub distribution_bits: u8,
}

impl ClusterState {
    #[must_use]
    pub const fn new(
        version: u64,
        node_states: BTreeMap<NodeId, NodeState>,
        distribution_bits: u8,
    ) -> Self {
        ClusterState { version, node_states, distribution_bits }
    }

    /// Pre-first-build placeholder carrying only the resumed version.
    ///
    /// Never published: `distribution_bits` 0 is outside the valid range, so
    /// the first real build always differs and bumps the version.
    #[must_use]
    pub const fn resumed(version: u64) -> Self {
        ClusterState { version, node_states: BTreeMap::new(), distribution_bits: 0 }
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&NodeState> {
        self.node_states.get(&id)
    }

    /// Count of nodes of `node_type` whose effective availability is `Up`.
    #[must_use]
    pub fn up_count(&self, node_type: NodeType) -> usize {
        self.node_states
            .iter()
            .filter(|(id, state)| {
                id.node_type == node_type && state.availability == Availability::Up
            })
            .count()
    }

    /// Whether `other` describes the same cluster condition, version aside.
    ///
    /// The builder uses this to decide if a new version is warranted at all.
    #[must_use]
    pub fn same_content(&self, other: &ClusterState) -> bool {
        self.distribution_bits == other.distribution_bits && self.node_states == other.node_states
    }
}
