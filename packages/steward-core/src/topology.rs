//! Cluster topology: the configured node inventory and its group hierarchy.
//!
//! Topology is the shared contract between the controller and the nodes, the
//! same way a partition map is in a sharded store: both sides must agree on
//! which nodes exist and how redundancy is laid out before any state math is
//! meaningful. A topology is validated once at config-apply time; everything
//! downstream may assume a valid tree.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::distribution::{DistributionError, DistributionParams};
use crate::types::{NodeId, NodeType};

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// One node of the group tree: either a leaf holding storage node indices or
/// an inner group holding subgroups, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Unique name across the whole tree; safety verdicts cite it.
    pub name: String,

    /// Maximum number of storage nodes under this group that may be
    /// unavailable at the same time.
    pub tolerance: u32,

    /// Storage node indices, non-empty exactly when this is a leaf.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<u16>,

    /// Subgroups, non-empty exactly when this is an inner group.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
}

impl Group {
    /// All storage node indices under this group, leaves included.
    #[must_use]
    pub fn storage_indices(&self) -> Vec<u16> {
        let mut indices = self.nodes.clone();
        for child in &self.groups {
            indices.extend(child.storage_indices());
        }
        indices
    }

    /// Number of storage nodes under this group.
    #[must_use]
    pub fn storage_count(&self) -> usize {
        self.nodes.len() + self.groups.iter().map(Group::storage_count).sum::<usize>()
    }
}

// ---------------------------------------------------------------------------
// Tolerance policy
// ---------------------------------------------------------------------------

/// How many simultaneously unavailable storage nodes a group can sustain.
///
/// The default policy reads the per-group configured value; deployments with
/// replica-placement-aware math can plug in their own. Implementations must
/// be monotone: a larger group never gets a smaller tolerance than one of
/// its subgroups would in its place.
pub trait TolerancePolicy: Send + Sync {
    fn tolerance(&self, group: &Group) -> u32;
}

/// Reads the tolerance straight from the topology configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfiguredTolerance;

impl TolerancePolicy for ConfiguredTolerance {
    fn tolerance(&self, group: &Group) -> u32 {
        group.tolerance
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

fn default_min_distributors_up() -> u16 {
    1
}

/// Full node inventory of one content cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    /// Root of the group tree; for flat clusters a single leaf group.
    pub root: Group,

    /// Distributors are a flat set with indices `0..distributor_count`.
    pub distributor_count: u16,

    /// Minimum number of distributors that must stay `Up` for a safe
    /// wanted-state change to pass.
    #[serde(default = "default_min_distributors_up")]
    pub min_distributors_up: u16,

    /// Bucket-split depth parameters shared with the nodes.
    #[serde(default)]
    pub distribution: DistributionParams,

    /// Optional base URL per node for cluster state push.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub endpoints: BTreeMap<NodeId, String>,
}

impl Topology {
    /// Single-group layout: storage nodes `0..storage_count` under the root.
    /// The common shape for small clusters.
    #[must_use]
    pub fn flat(storage_count: u16, distributor_count: u16, tolerance: u32) -> Self {
        Topology {
            root: Group {
                name: "root".to_string(),
                tolerance,
                nodes: (0..storage_count).collect(),
                groups: Vec::new(),
            },
            distributor_count,
            min_distributors_up: default_min_distributors_up(),
            distribution: DistributionParams::default(),
            endpoints: BTreeMap::new(),
        }
    }

    /// Rejects trees the safety checker and builder cannot reason about.
    /// Callers keep the previous topology when this fails.
    pub fn validate(&self) -> Result<(), TopologyError> {
        let mut names = BTreeSet::new();
        let mut indices = BTreeSet::new();
        validate_group(&self.root, &mut names, &mut indices)?;

        if self.distributor_count == 0 {
            return Err(TopologyError::NoDistributors);
        }
        if self.min_distributors_up > self.distributor_count {
            return Err(TopologyError::DistributorFloorTooHigh {
                min: self.min_distributors_up,
                count: self.distributor_count,
            });
        }
        self.distribution.validate()?;
        for node in self.endpoints.keys() {
            if !self.contains(*node) {
                return Err(TopologyError::UnknownEndpointNode(*node));
            }
        }
        Ok(())
    }

    /// Whether `node` is part of the configured inventory.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        match node.node_type {
            NodeType::Storage => !self.group_chain(node.index).is_empty(),
            NodeType::Distributor => node.index < self.distributor_count,
        }
    }

    /// Groups containing the storage node `index`, ordered from its own leaf
    /// group up to the root. Empty when the index is not in the topology.
    #[must_use]
    pub fn group_chain(&self, index: u16) -> Vec<&Group> {
        path_to(&self.root, index).unwrap_or_default()
    }

    /// Every configured node id, storage first, each type ordered by index.
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = {
            let mut storage = self.root.storage_indices();
            storage.sort_unstable();
            storage.into_iter().map(NodeId::storage).collect()
        };
        ids.extend((0..self.distributor_count).map(NodeId::distributor));
        ids
    }

    #[must_use]
    pub fn storage_count(&self) -> usize {
        self.root.storage_count()
    }

    #[must_use]
    pub fn endpoint(&self, node: NodeId) -> Option<&str> {
        self.endpoints.get(&node).map(String::as_str)
    }
}

fn validate_group(
    group: &Group,
    names: &mut BTreeSet<String>,
    indices: &mut BTreeSet<u16>,
) -> Result<(), TopologyError> {
    if !names.insert(group.name.clone()) {
        return Err(TopologyError::DuplicateGroupName(group.name.clone()));
    }
    match (group.nodes.is_empty(), group.groups.is_empty()) {
        (true, true) => return Err(TopologyError::EmptyGroup(group.name.clone())),
        (false, false) => return Err(TopologyError::MixedGroup(group.name.clone())),
        _ => {}
    }
    for index in &group.nodes {
        if !indices.insert(*index) {
            return Err(TopologyError::DuplicateStorageNode(*index));
        }
    }
    for child in &group.groups {
        validate_group(child, names, indices)?;
    }

    let size = group.storage_count();
    if group.tolerance as usize > size {
        return Err(TopologyError::ToleranceExceedsGroupSize {
            group: group.name.clone(),
            tolerance: group.tolerance,
            size,
        });
    }
    if group.tolerance as usize == size {
        // Legal (a whole rack may be allowed down) but worth flagging.
        warn!(
            group = %group.name,
            tolerance = group.tolerance,
            "group tolerance equals its storage node count"
        );
    }
    Ok(())
}

fn path_to<'a>(group: &'a Group, index: u16) -> Option<Vec<&'a Group>> {
    if group.nodes.contains(&index) {
        return Some(vec![group]);
    }
    for child in &group.groups {
        if let Some(mut path) = path_to(child, index) {
            path.push(group);
            return Some(path);
        }
    }
    None
}

/// Why a topology was rejected at config-apply time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("group {0:?} has neither nodes nor subgroups")]
    EmptyGroup(String),
    #[error("group {0:?} declares both nodes and subgroups")]
    MixedGroup(String),
    #[error("storage node {0} appears in more than one group")]
    DuplicateStorageNode(u16),
    #[error("group name {0:?} is used more than once")]
    DuplicateGroupName(String),
    #[error("group {group:?} tolerance {tolerance} exceeds its {size} storage nodes")]
    ToleranceExceedsGroupSize { group: String, tolerance: u32, size: usize },
    #[error("cluster has no distributors")]
    NoDistributors,
    #[error("minDistributorsUp {min} exceeds distributorCount {count}")]
    DistributorFloorTooHigh { min: u16, count: u16 },
    #[error("endpoint configured for unknown node {0}")]
    UnknownEndpointNode(NodeId),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
}
