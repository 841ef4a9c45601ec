//! Steward server: per-cluster fleet controllers, the operator HTTP API,
//! and cluster state version persistence.

pub mod cluster;
pub mod network;
pub mod service;
pub mod store;

pub use cluster::{ControllerHandle, ControllerSet, FleetController};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
