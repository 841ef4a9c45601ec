//! Fleet control module.
//!
//! Provides the node registry, the state change safety checker, cluster
//! state building, mastership election, and the per-cluster control loop
//! that ties them together, plus the publisher that pushes each published
//! state out to the nodes.

pub mod builder;
pub mod controller;
pub mod election;
pub mod publish;
pub mod registry;
pub mod safety;
pub mod set;
pub mod state;
pub mod traits;
pub mod types;

// ---------------------------------------------------------------------------
// Re-exports: flat public API
// ---------------------------------------------------------------------------

// types
pub use types::{
    ControllerRole, ControllerStatus, NodeInfo, StateChangeError, StateChangeRequest,
    StateChangeVerdict, TopologyApplyError,
};

// registry
pub use registry::{NodeRegistry, RegistrySnapshot, ReportOutcome};

// builder
pub use builder::build_cluster_state;

// election
pub use election::MasterElection;

// controller
pub use controller::FleetController;

// state
pub use state::{ControllerEvent, ControllerHandle, PublishedState};

// set
pub use set::ControllerSet;

// traits
pub use traits::{
    ClockSource, ManualClock, PeerLiveness, SharedPeerLiveness, StatePublisher,
    StaticPeerLiveness, SystemClock,
};

// publish
pub use publish::{HttpStatePublisher, NullStatePublisher, RecordingPublisher, CLUSTER_STATE_PATH};

// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod integration_tests {
    use steward_core::topology::Topology;
    use steward_core::types::{Availability, NodeId, NodeState, StateChangeCondition};

    use super::*;

    #[test]
    fn reexports_types_accessible() {
        // Construct values using only the cluster:: prefix (no submodule path).
        let _role = ControllerRole::Follower;
        let _outcome = ReportOutcome::Applied;
        let _info = NodeInfo::new(NodeId::storage(0));
        let _verdict = StateChangeVerdict::AlreadySet;
        let _request = StateChangeRequest {
            node: NodeId::storage(0),
            state: Availability::Maintenance,
            description: None,
            condition: StateChangeCondition::Safe,
            probe: false,
        };
        let _err = StateChangeError::NotMaster;
        let _err = TopologyApplyError::StaleGeneration { submitted: 1, current: 1 };
    }

    #[test]
    fn reexports_registry_and_builder_accessible() {
        let topology = Topology::flat(2, 1, 1);
        let mut registry = NodeRegistry::new(&topology);
        registry.report(NodeId::storage(0), NodeState::up(), 1, 1_000);

        let previous = steward_core::state::ClusterState::resumed(0);
        let state =
            build_cluster_state(&previous, &registry.snapshot(), &topology, 1_000, 60_000);
        assert!(state.is_some());
    }

    #[test]
    fn reexports_traits_accessible() {
        fn assert_publisher(_: &dyn StatePublisher) {}
        fn assert_liveness(_: &dyn PeerLiveness) {}
        fn assert_clock(_: &dyn ClockSource) {}

        assert_publisher(&NullStatePublisher);
        assert_publisher(&RecordingPublisher::new());
        assert_liveness(&StaticPeerLiveness);
        assert_liveness(&SharedPeerLiveness::new());
        assert_clock(&SystemClock);
        assert_clock(&*ManualClock::at(0));
    }
}
