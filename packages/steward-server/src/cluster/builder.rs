//! Cluster state builder.
//!
//! Derives a candidate [`ClusterState`] from a registry snapshot and the
//! topology, and compares it against the previous state. A new version is
//! minted only when content actually changed; quiet clusters produce no
//! version churn no matter how often the builder runs.

use steward_core::distribution::ideal_distribution_bits;
use steward_core::state::ClusterState;
use steward_core::topology::Topology;

use super::registry::RegistrySnapshot;

/// Builds the next cluster state, or `None` when it would equal `previous`
/// in everything but the version number.
///
/// Deterministic: equal inputs yield an equal candidate. Nodes in the
/// topology that never reported, or whose last report is older than
/// `staleness_ms`, appear as `down` rather than being left out, so consumers
/// always see the full configured inventory.
#[must_use]
pub fn build_cluster_state(
    previous: &ClusterState,
    snapshot: &RegistrySnapshot,
    topology: &Topology,
    now_ms: u64,
    staleness_ms: u64,
) -> Option<ClusterState> {
    let node_states = topology
        .node_ids()
        .into_iter()
        .map(|node| (node, snapshot.effective_state(node, now_ms, staleness_ms)))
        .collect();
    let bits = ideal_distribution_bits(&topology.distribution, topology.storage_count());

    let candidate = ClusterState::new(previous.version + 1, node_states, bits);
    if candidate.same_content(previous) {
        None
    } else {
        Some(candidate)
    }
}
