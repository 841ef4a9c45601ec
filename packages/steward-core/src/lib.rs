//! Steward Core: cluster state model, topology contract, and message schemas.

pub mod distribution;
pub mod messages;
pub mod state;
pub mod topology;
pub mod types;

pub use distribution::{ideal_distribution_bits, DistributionError, DistributionParams};
pub use state::ClusterState;
pub use topology::{ConfiguredTolerance, Group, TolerancePolicy, Topology, TopologyError};
pub use types::{Availability, NodeId, NodeState, NodeType, StateChangeCondition};
