//! Controller metrics.
//!
//! Thin helpers over the `metrics` macros so metric names live in one place
//! and call sites stay one line. The Prometheus exporter is installed by the
//! daemon; without it these are no-ops.

use metrics::{counter, gauge};

/// Pre-registers the per-cluster series so they show up in scrapes before
/// the first event.
pub fn register_cluster(cluster: &str) {
    counter!("steward_reports_total", "cluster" => cluster.to_string(), "outcome" => "applied")
        .absolute(0);
    counter!("steward_states_published_total", "cluster" => cluster.to_string()).absolute(0);
    gauge!("steward_cluster_state_version", "cluster" => cluster.to_string()).set(0.0);
}

/// Counts one node report by registry outcome.
pub fn record_report(cluster: &str, outcome: &'static str) {
    counter!("steward_reports_total", "cluster" => cluster.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Counts one operator state change request by verdict.
pub fn record_state_change(cluster: &str, verdict: &'static str) {
    counter!(
        "steward_state_change_requests_total",
        "cluster" => cluster.to_string(),
        "verdict" => verdict
    )
    .increment(1);
}

/// Counts one election role transition.
pub fn record_role_transition(cluster: &str, role: &'static str) {
    counter!(
        "steward_role_transitions_total",
        "cluster" => cluster.to_string(),
        "role" => role
    )
    .increment(1);
}

/// Records a successful publish: version gauge, node gauges, publish count.
pub fn record_published(cluster: &str, version: u64, nodes_up: usize, node_count: usize) {
    counter!("steward_states_published_total", "cluster" => cluster.to_string()).increment(1);
    gauge!("steward_cluster_state_version", "cluster" => cluster.to_string()).set(version as f64);
    gauge!("steward_cluster_nodes_up", "cluster" => cluster.to_string()).set(nodes_up as f64);
    gauge!("steward_cluster_nodes_total", "cluster" => cluster.to_string())
        .set(node_count as f64);
}

/// Counts a version persist failure (the publish it blocked never happened).
pub fn record_persist_failure(cluster: &str) {
    counter!("steward_version_persist_failures_total", "cluster" => cluster.to_string())
        .increment(1);
}

/// Counts an incomplete state push fan-out.
pub fn record_push_failure(cluster: &str) {
    counter!("steward_state_push_failures_total", "cluster" => cluster.to_string()).increment(1);
}
