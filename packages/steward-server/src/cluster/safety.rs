//! State change safety checker.
//!
//! Pure verdict function over a registry snapshot and the topology
//! contract. A storage change is walked through every group that contains
//! the node, leaf to root, and refused if it would push any of them past
//! its configured tolerance. Distributor changes are guarded by the
//! cluster-wide minimum-up floor instead. Moving a node towards higher
//! availability is never gated.

use steward_core::topology::{Group, TolerancePolicy, Topology};
use steward_core::types::{Availability, NodeId, NodeType, StateChangeCondition};

use super::registry::RegistrySnapshot;
use super::types::{StateChangeRequest, StateChangeVerdict};

/// Rules on one wanted-state change.
///
/// The verdict order is fixed: an identical request is `AlreadySet` even
/// under `Force`; `Force` then bypasses every safety rule; a move towards
/// higher availability is always allowed; only moves into `maintenance` or
/// `down` are walked against the topology.
#[must_use]
pub fn evaluate(
    snapshot: &RegistrySnapshot,
    topology: &Topology,
    policy: &dyn TolerancePolicy,
    request: &StateChangeRequest,
    now_ms: u64,
    staleness_ms: u64,
) -> StateChangeVerdict {
    let current_wanted = snapshot
        .get(request.node)
        .map(|info| info.wanted.clone())
        .unwrap_or_default();
    let requested = request.wanted_state();

    if requested == current_wanted {
        return StateChangeVerdict::AlreadySet;
    }
    if request.condition == StateChangeCondition::Force {
        return StateChangeVerdict::Allowed;
    }
    if requested
        .availability
        .more_available_than(current_wanted.availability)
    {
        return StateChangeVerdict::Allowed;
    }
    if !matches!(
        requested.availability,
        Availability::Maintenance | Availability::Down
    ) {
        return StateChangeVerdict::Allowed;
    }

    match request.node.node_type {
        NodeType::Storage => {
            storage_verdict(snapshot, topology, policy, request.node, now_ms, staleness_ms)
        }
        NodeType::Distributor => {
            distributor_verdict(snapshot, topology, request.node, now_ms, staleness_ms)
        }
    }
}

/// Checks the group chain of one storage node, innermost group first.
fn storage_verdict(
    snapshot: &RegistrySnapshot,
    topology: &Topology,
    policy: &dyn TolerancePolicy,
    node: NodeId,
    now_ms: u64,
    staleness_ms: u64,
) -> StateChangeVerdict {
    for group in topology.group_chain(node.index) {
        let unavailable =
            unavailable_storage_under(snapshot, group, node, now_ms, staleness_ms);
        let would = unavailable + 1;
        let tolerance = policy.tolerance(group) as usize;
        if would > tolerance {
            return StateChangeVerdict::Disallowed(format!(
                "group {} would have {} of {} nodes unavailable, tolerance is {}",
                group.name,
                would,
                group.storage_count(),
                tolerance,
            ));
        }
    }
    StateChangeVerdict::Allowed
}

/// Counts storage nodes under `group`, excluding `node` itself, whose
/// effective state is unavailable right now.
fn unavailable_storage_under(
    snapshot: &RegistrySnapshot,
    group: &Group,
    node: NodeId,
    now_ms: u64,
    staleness_ms: u64,
) -> usize {
    group
        .storage_indices()
        .into_iter()
        .map(NodeId::storage)
        .filter(|id| *id != node)
        .filter(|id| {
            snapshot
                .effective_state(*id, now_ms, staleness_ms)
                .availability
                .is_unavailable()
        })
        .count()
}

/// Checks the minimum-up floor across the distributor tier.
fn distributor_verdict(
    snapshot: &RegistrySnapshot,
    topology: &Topology,
    node: NodeId,
    now_ms: u64,
    staleness_ms: u64,
) -> StateChangeVerdict {
    let staying_up = (0..topology.distributor_count)
        .map(NodeId::distributor)
        .filter(|id| *id != node)
        .filter(|id| {
            snapshot.effective_state(*id, now_ms, staleness_ms).availability == Availability::Up
        })
        .count();
    if staying_up < topology.min_distributors_up as usize {
        return StateChangeVerdict::Disallowed(format!(
            "only {} of {} distributors would stay up, minimum is {}",
            staying_up, topology.distributor_count, topology.min_distributors_up,
        ));
    }
    StateChangeVerdict::Allowed
}
