//! Health report payloads pushed by content nodes to the controller.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` and travel as named
//! `MsgPack` maps (`rmp_serde::to_vec_named()`), so fields can be added
//! without breaking older nodes.

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, NodeState};

/// One node's view of itself at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStateReport {
    pub node: NodeId,

    pub state: NodeState,

    /// Monotonic per-node sequence set by the reporting node. A report
    /// carrying a lower value than the last applied one is dropped.
    pub sequence: u64,
}

/// Controller's answer to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAck {
    /// False when the report was a duplicate, out of order, or from a node
    /// not in the current topology.
    pub applied: bool,
}
