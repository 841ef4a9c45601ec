//! Daemon-level plumbing shared by every cluster controller.
//!
//! 1. **Configuration** (`config`): the daemon config file and per-cluster
//!    tuning knobs
//! 2. **Metrics** (`metrics`): Prometheus counters and gauges, one label per
//!    cluster
//! 3. **Background workers** (`worker`): the event loop each controller
//!    runs on

pub mod config;
pub mod metrics;
pub mod worker;

// Re-export key types for convenient access.
pub use config::{ClusterSpec, ControllerTuning, DaemonConfig};
pub use worker::{BackgroundRunnable, BackgroundWorker};
