//! Cluster state push payloads: what the controller sends every node after
//! building a new version. Named `MsgPack` on the wire.

use serde::{Deserialize, Serialize};

use crate::state::ClusterState;

/// A freshly built state, addressed to all nodes of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStateBundle {
    pub cluster: String,
    pub state: ClusterState,
}

/// Node acknowledgement naming the version it now acts on.
///
/// Nodes ignore bundles older than what they already hold, so an ack may
/// name a newer version than the bundle it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStateAck {
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::types::{NodeId, NodeState};

    use super::*;

    #[test]
    fn bundle_msgpack_round_trip() {
        let mut nodes = BTreeMap::new();
        nodes.insert(NodeId::storage(0), NodeState::up());
        nodes.insert(NodeId::distributor(0), NodeState::down("connection refused"));
        let bundle = ClusterStateBundle {
            cluster: "music".to_string(),
            state: ClusterState::new(12, nodes, 16),
        };
        let bytes = rmp_serde::to_vec_named(&bundle).unwrap();
        let decoded: ClusterStateBundle = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, bundle);
    }
}
