//! Operator API payloads: requesting wanted-state changes and inspecting
//! node state. JSON over the REST surface, camelCase field names.

use serde::{Deserialize, Serialize};

use crate::types::{Availability, NodeId, NodeState, StateChangeCondition};

/// Operator request to change a node's wanted state.
///
/// The target node is addressed by the URL, not the body. `probe` asks for
/// the safety verdict without applying anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetWantedStateRequest {
    pub state: Availability,

    /// Reason recorded on the node and echoed in the published state,
    /// e.g. "replacing disk 3".
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,

    #[serde(default)]
    pub condition: StateChangeCondition,

    #[serde(default)]
    pub probe: bool,
}

/// The three-way safety verdict, wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StateChangeOutcome {
    Allowed,
    Disallowed,
    AlreadySet,
}

/// Controller's answer to a wanted-state request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetWantedStateResponse {
    pub outcome: StateChangeOutcome,

    /// Present on `Disallowed`, naming the group or floor that blocked it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,

    /// Echoes the request's probe flag; probed verdicts change nothing.
    pub probe: bool,

    /// First published version reflecting the change, when one was built.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub published_version: Option<u64>,
}

/// Full view of one node for `GET .../nodes/{type}/{index}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStateView {
    pub node: NodeId,
    pub reported: NodeState,
    pub wanted: NodeState,
    pub effective: NodeState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_to_safe_non_probe() {
        let request: SetWantedStateRequest =
            serde_json::from_str(r#"{"state":"maintenance"}"#).unwrap();
        assert_eq!(request.state, Availability::Maintenance);
        assert_eq!(request.condition, StateChangeCondition::Safe);
        assert!(!request.probe);
        assert!(request.description.is_none());
    }

    #[test]
    fn outcome_uses_camel_case_wire_values() {
        assert_eq!(
            serde_json::to_value(StateChangeOutcome::AlreadySet).unwrap(),
            serde_json::json!("alreadySet")
        );
        assert_eq!(
            serde_json::to_value(StateChangeOutcome::Disallowed).unwrap(),
            serde_json::json!("disallowed")
        );
    }

    #[test]
    fn response_omits_absent_fields() {
        let response = SetWantedStateResponse {
            outcome: StateChangeOutcome::Allowed,
            reason: None,
            probe: false,
            published_version: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("reason"));
        assert!(!object.contains_key("publishedVersion"));
    }

    #[test]
    fn node_state_view_round_trip() {
        let view = NodeStateView {
            node: NodeId::storage(2),
            reported: NodeState::up(),
            wanted: NodeState::new(Availability::Maintenance).with_description("disk swap"),
            effective: NodeState::new(Availability::Maintenance).with_description("disk swap"),
        };
        let json = serde_json::to_string(&view).unwrap();
        let back: NodeStateView = serde_json::from_str(&json).unwrap();
        assert_eq!(back, view);
    }
}
