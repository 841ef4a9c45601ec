//! HTTP handler definitions for the operator API.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod health;
pub mod operator;
pub mod report;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use operator::{
    apply_topology_handler, cluster_state_handler, cluster_status_handler, list_clusters_handler,
    node_state_handler, set_node_state_handler, TopologyUpdate,
};
pub use report::report_handler;

use std::sync::Arc;
use std::time::Instant;

use crate::cluster::ControllerSet;

use super::ShutdownController;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Controller handles for every cluster this daemon runs.
    pub controllers: Arc<ControllerSet>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Daemon process start time, used for uptime calculation.
    pub start_time: Instant,
}
