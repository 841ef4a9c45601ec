//! Controller and daemon configuration types.
//!
//! The daemon reads one JSON file listing the clusters to control; every
//! knob beyond the topology has a default, so a minimal file is just names
//! and topologies.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use steward_core::topology::Topology;

// ---------------------------------------------------------------------------
// ControllerTuning
// ---------------------------------------------------------------------------

/// Timing and capacity knobs for one cluster's control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerTuning {
    /// Tick interval driving elections, staleness demotion, and the
    /// moratorium deadline.
    pub tick_interval_ms: u64,
    /// A node whose last report is older than this reads as `down`.
    pub node_staleness_ms: u64,
    /// Longest a fresh master waits for silent nodes before publishing.
    pub moratorium_grace_ms: u64,
    /// Bounded event queue capacity; senders wait when the loop is behind.
    pub event_queue_capacity: usize,
    /// Per-request timeout for cluster state pushes to nodes.
    pub publish_timeout_ms: u64,
}

impl Default for ControllerTuning {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            node_staleness_ms: 30_000,
            moratorium_grace_ms: 30_000,
            event_queue_capacity: 256,
            publish_timeout_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// ClusterSpec
// ---------------------------------------------------------------------------

fn default_generation() -> u64 {
    1
}

/// One cluster in the daemon configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub name: String,

    /// Configuration generation. A topology replacement submitted at
    /// runtime must carry a strictly higher one.
    #[serde(default = "default_generation")]
    pub generation: u64,

    pub topology: Topology,

    #[serde(default)]
    pub tuning: ControllerTuning,
}

// ---------------------------------------------------------------------------
// DaemonConfig
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    19050
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig {
    /// Bind address for the operator API.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the operator API. 0 means OS-assigned.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Prometheus exporter address, e.g. "127.0.0.1:9184". `None` disables
    /// the exporter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_bind: Option<String>,

    /// Version store database path. `None` keeps versions in memory, which
    /// forfeits version monotonicity across restarts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// Clusters this daemon runs controllers for.
    pub clusters: Vec<ClusterSpec>,
}

impl DaemonConfig {
    /// Reads and parses a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: DaemonConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the daemon cannot start from.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut names = BTreeSet::new();
        for cluster in &self.clusters {
            if cluster.name.is_empty() {
                anyhow::bail!("cluster with an empty name");
            }
            if !names.insert(cluster.name.as_str()) {
                anyhow::bail!("cluster name {:?} is used more than once", cluster.name);
            }
            cluster
                .topology
                .validate()
                .with_context(|| format!("topology of cluster {:?}", cluster.name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> serde_json::Value {
        serde_json::json!({
            "clusters": [{
                "name": "media",
                "topology": {
                    "root": { "name": "root", "tolerance": 1, "nodes": [0, 1, 2] },
                    "distributorCount": 2,
                },
            }],
        })
    }

    #[test]
    fn tuning_defaults() {
        let tuning = ControllerTuning::default();
        assert_eq!(tuning.tick_interval_ms, 500);
        assert_eq!(tuning.node_staleness_ms, 30_000);
        assert_eq!(tuning.moratorium_grace_ms, 30_000);
        assert_eq!(tuning.event_queue_capacity, 256);
        assert_eq!(tuning.publish_timeout_ms, 5_000);
    }

    #[test]
    fn minimal_config_fills_in_defaults() {
        let config: DaemonConfig = serde_json::from_value(minimal_json()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 19050);
        assert!(config.metrics_bind.is_none());
        assert!(config.store_path.is_none());

        let cluster = &config.clusters[0];
        assert_eq!(cluster.generation, 1);
        assert_eq!(cluster.tuning, ControllerTuning::default());
        assert_eq!(config.validate().ok(), Some(()));
    }

    #[test]
    fn duplicate_cluster_names_rejected() {
        let mut json = minimal_json();
        let cluster = json["clusters"][0].clone();
        json["clusters"].as_array_mut().unwrap().push(cluster);

        let config: DaemonConfig = serde_json::from_value(json).unwrap();
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("media"), "got: {error}");
    }

    #[test]
    fn invalid_topology_names_the_cluster() {
        let mut json = minimal_json();
        json["clusters"][0]["topology"]["distributorCount"] = serde_json::json!(0);

        let config: DaemonConfig = serde_json::from_value(json).unwrap();
        let error = format!("{:#}", config.validate().unwrap_err());
        assert!(error.contains("media"), "got: {error}");
        assert!(error.contains("no distributors"), "got: {error}");
    }

    #[test]
    fn config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steward.json");
        std::fs::write(&path, minimal_json().to_string()).unwrap();

        let config = DaemonConfig::from_file(&path).unwrap();
        assert_eq!(config.clusters.len(), 1);
        assert_eq!(config.clusters[0].name, "media");
    }
}
