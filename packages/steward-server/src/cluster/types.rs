//! Controller domain types: roles, verdicts, per-node bookkeeping, and the
//! typed errors the operator surface maps onto HTTP statuses.
//!
//! These are internal to the controller. The wire-facing shapes live in
//! `steward_core::messages` and are produced from these at the boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use steward_core::messages::operator::StateChangeOutcome;
use steward_core::topology::TopologyError;
use steward_core::types::{Availability, NodeId, NodeState, StateChangeCondition};

// ---------------------------------------------------------------------------
// Roles and verdicts
// ---------------------------------------------------------------------------

/// This instance's position in the controller election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControllerRole {
    /// Not seeking mastership; still ingesting node reports.
    Follower,
    /// Eligible and waiting for majority recognition.
    Candidate,
    /// Sole publisher of cluster states.
    Master,
}

impl ControllerRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ControllerRole::Follower => "follower",
            ControllerRole::Candidate => "candidate",
            ControllerRole::Master => "master",
        }
    }
}

/// Safety checker verdict. `Disallowed` is an answer, not an error: the
/// request was well-formed, the cluster just cannot afford it right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChangeVerdict {
    Allowed,
    Disallowed(String),
    AlreadySet,
}

impl StateChangeVerdict {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, StateChangeVerdict::Allowed)
    }

    /// Wire form of the verdict.
    #[must_use]
    pub const fn outcome(&self) -> StateChangeOutcome {
        match self {
            StateChangeVerdict::Allowed => StateChangeOutcome::Allowed,
            StateChangeVerdict::Disallowed(_) => StateChangeOutcome::Disallowed,
            StateChangeVerdict::AlreadySet => StateChangeOutcome::AlreadySet,
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            StateChangeVerdict::Disallowed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Metrics label for the verdict counter.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            StateChangeVerdict::Allowed => "allowed",
            StateChangeVerdict::Disallowed(_) => "disallowed",
            StateChangeVerdict::AlreadySet => "already_set",
        }
    }
}

// ---------------------------------------------------------------------------
// Per-node bookkeeping
// ---------------------------------------------------------------------------

/// Everything the registry tracks for one configured node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub node: NodeId,

    /// Latest applied report; `None` until the node reports for the first
    /// time after entering the topology.
    pub reported: Option<NodeState>,

    /// Operator intent, `Up` by default.
    pub wanted: NodeState,

    /// Wall-clock millis of the last applied report.
    pub last_report_at_ms: Option<u64>,

    /// Sequence of the last applied report, for out-of-order rejection.
    pub last_sequence: Option<u64>,
}

impl NodeInfo {
    #[must_use]
    pub fn new(node: NodeId) -> Self {
        NodeInfo {
            node,
            reported: None,
            wanted: NodeState::default(),
            last_report_at_ms: None,
            last_sequence: None,
        }
    }

    /// Reported state as the builder sees it: a node that never reported, or
    /// whose last report is older than `staleness_ms`, counts as `Down`.
    #[must_use]
    pub fn reported_or_down(&self, now_ms: u64, staleness_ms: u64) -> NodeState {
        match (&self.reported, self.last_report_at_ms) {
            (Some(state), Some(at)) if now_ms.saturating_sub(at) <= staleness_ms => state.clone(),
            (Some(_), Some(at)) => {
                let silent_secs = now_ms.saturating_sub(at) / 1000;
                NodeState::down(format!("no report received for {silent_secs}s"))
            }
            _ => NodeState::down("no report received"),
        }
    }

    /// Effective state: wanted caps reported, staleness demotion included.
    #[must_use]
    pub fn effective(&self, now_ms: u64, staleness_ms: u64) -> NodeState {
        let reported = self.reported_or_down(now_ms, staleness_ms);
        NodeState::effective(&reported, &self.wanted).clone()
    }
}

// ---------------------------------------------------------------------------
// Requests and status
// ---------------------------------------------------------------------------

/// A wanted-state change as carried through the controller's event queue.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangeRequest {
    pub node: NodeId,
    pub state: Availability,
    pub description: Option<String>,
    pub condition: StateChangeCondition,
    /// Evaluate only; never mutates, regardless of verdict.
    pub probe: bool,
}

impl StateChangeRequest {
    /// The wanted state this request would record if allowed.
    #[must_use]
    pub fn wanted_state(&self) -> NodeState {
        NodeState {
            availability: self.state,
            description: self.description.clone(),
            init_progress: None,
        }
    }
}

/// Diagnostic summary served by the health endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub cluster: String,
    pub role: ControllerRole,
    pub in_moratorium: bool,
    pub published_version: u64,
    pub node_count: usize,
    pub nodes_up: usize,
    pub topology_generation: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a state-changing or state-reading request was rejected outright.
///
/// Distinct from a `Disallowed` verdict: these never reach the safety
/// checker, and `NotMaster`/`NotMasterReady` are retryable against the next
/// master or after the moratorium.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateChangeError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("{0} is a report-only state and cannot be requested")]
    NotSettable(Availability),
    #[error("this controller is not the master")]
    NotMaster,
    #[error("master is still gathering node reports, retry shortly")]
    NotMasterReady,
    #[error("controller is shutting down")]
    ShuttingDown,
}

impl StateChangeError {
    /// Whether the caller should simply retry later, unchanged.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            StateChangeError::NotMaster
                | StateChangeError::NotMasterReady
                | StateChangeError::ShuttingDown
        )
    }
}

/// Why a topology replacement was not applied. The previous topology stays
/// in force in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyApplyError {
    #[error(transparent)]
    Invalid(#[from] TopologyError),
    #[error("generation {submitted} is not newer than the active generation {current}")]
    StaleGeneration { submitted: u64, current: u64 },
    #[error("controller is shutting down")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- verdicts --

    #[test]
    fn verdict_maps_to_wire_outcome() {
        assert_eq!(StateChangeVerdict::Allowed.outcome(), StateChangeOutcome::Allowed);
        assert_eq!(
            StateChangeVerdict::Disallowed("full".to_string()).outcome(),
            StateChangeOutcome::Disallowed
        );
        assert_eq!(StateChangeVerdict::AlreadySet.outcome(), StateChangeOutcome::AlreadySet);
    }

    #[test]
    fn only_disallowed_carries_a_reason() {
        assert_eq!(StateChangeVerdict::Allowed.reason(), None);
        assert_eq!(
            StateChangeVerdict::Disallowed("rack full".to_string()).reason(),
            Some("rack full")
        );
    }

    // -- node bookkeeping --

    #[test]
    fn never_reported_node_reads_down() {
        let info = NodeInfo::new(NodeId::storage(0));
        let state = info.reported_or_down(10_000, 5_000);
        assert_eq!(state.availability, Availability::Down);
        assert_eq!(state.description.as_deref(), Some("no report received"));
    }

    #[test]
    fn fresh_report_passes_through() {
        let mut info = NodeInfo::new(NodeId::storage(0));
        info.reported = Some(NodeState::up());
        info.last_report_at_ms = Some(8_000);
        assert_eq!(info.reported_or_down(10_000, 5_000).availability, Availability::Up);
    }

    #[test]
    fn stale_report_demotes_to_down_with_age() {
        let mut info = NodeInfo::new(NodeId::storage(0));
        info.reported = Some(NodeState::up());
        info.last_report_at_ms = Some(1_000);
        let state = info.reported_or_down(31_000, 5_000);
        assert_eq!(state.availability, Availability::Down);
        assert_eq!(state.description.as_deref(), Some("no report received for 30s"));
    }

    #[test]
    fn effective_respects_wanted_cap_and_staleness() {
        let mut info = NodeInfo::new(NodeId::storage(0));
        info.reported = Some(NodeState::up());
        info.last_report_at_ms = Some(9_000);
        info.wanted = NodeState::new(Availability::Maintenance).with_description("disk swap");

        // Fresh report: wanted caps it down to Maintenance.
        assert_eq!(info.effective(10_000, 5_000).availability, Availability::Maintenance);
        // Stale report: Down is below Maintenance, demotion wins.
        assert_eq!(info.effective(60_000, 5_000).availability, Availability::Down);
    }

    // -- errors --

    #[test]
    fn transient_errors_are_marked_retryable() {
        assert!(StateChangeError::NotMaster.is_transient());
        assert!(StateChangeError::NotMasterReady.is_transient());
        assert!(StateChangeError::ShuttingDown.is_transient());
        assert!(!StateChangeError::UnknownNode(NodeId::storage(9)).is_transient());
        assert!(!StateChangeError::NotSettable(Availability::Stopping).is_transient());
    }
}
