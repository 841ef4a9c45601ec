//! State publisher implementations.
//!
//! The HTTP publisher fans a freshly built cluster state out to every node
//! endpoint in the topology, concurrently and with a per-request timeout.
//! Push failures are logged and surfaced but never block the controller:
//! the state is already persisted and published locally by the time a push
//! starts, and a node that missed it converges on its next report.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use steward_core::messages::ClusterStateBundle;
use steward_core::topology::Topology;
use steward_core::types::NodeId;

use super::traits::StatePublisher;

/// Path nodes accept cluster state pushes on, relative to their endpoint.
pub const CLUSTER_STATE_PATH: &str = "/cluster-state";

// ---------------------------------------------------------------------------
// Null
// ---------------------------------------------------------------------------

/// Publishes nothing. For deployments where nodes poll the operator API and
/// no push endpoints are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStatePublisher;

#[async_trait]
impl StatePublisher for NullStatePublisher {
    async fn publish(
        &self,
        _bundle: &ClusterStateBundle,
        _topology: &Topology,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// Keeps every published bundle in memory, in publish order. Test double.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<ClusterStateBundle>>,
}

impl RecordingPublisher {
    #[must_use]
    pub fn new() -> Self {
        RecordingPublisher::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<ClusterStateBundle> {
        self.sent.lock().clone()
    }

    #[must_use]
    pub fn last_version(&self) -> Option<u64> {
        self.sent.lock().last().map(|bundle| bundle.state.version)
    }
}

#[async_trait]
impl StatePublisher for RecordingPublisher {
    async fn publish(
        &self,
        bundle: &ClusterStateBundle,
        _topology: &Topology,
    ) -> anyhow::Result<()> {
        self.sent.lock().push(bundle.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HTTP fan-out
// ---------------------------------------------------------------------------

/// Pushes the state to `{endpoint}/cluster-state` on every node that has an
/// endpoint configured, as named-field msgpack.
#[derive(Debug, Clone)]
pub struct HttpStatePublisher {
    client: reqwest::Client,
}

impl HttpStatePublisher {
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("building state push client")?;
        Ok(HttpStatePublisher { client })
    }
}

#[async_trait]
impl StatePublisher for HttpStatePublisher {
    async fn publish(
        &self,
        bundle: &ClusterStateBundle,
        topology: &Topology,
    ) -> anyhow::Result<()> {
        if topology.endpoints.is_empty() {
            debug!(
                cluster = %bundle.cluster,
                version = bundle.state.version,
                "no node endpoints configured, skipping state push"
            );
            return Ok(());
        }

        let body = Bytes::from(
            rmp_serde::to_vec_named(bundle).context("encoding cluster state push")?,
        );

        let mut pushes: JoinSet<(NodeId, bool)> = JoinSet::new();
        for (node, endpoint) in &topology.endpoints {
            let url = format!("{}{}", endpoint.trim_end_matches('/'), CLUSTER_STATE_PATH);
            let client = self.client.clone();
            let body = body.clone();
            let node = *node;
            let version = bundle.state.version;
            pushes.spawn(async move {
                let result = client
                    .post(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/msgpack")
                    .body(body)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status);
                match result {
                    Ok(_) => (node, true),
                    Err(error) => {
                        warn!(%node, version, %error, "cluster state push failed");
                        (node, false)
                    }
                }
            });
        }

        let total = pushes.len();
        let mut failed = 0usize;
        while let Some(joined) = pushes.join_next().await {
            match joined {
                Ok((_, true)) => {}
                Ok((_, false)) => failed += 1,
                Err(error) => {
                    warn!(%error, "cluster state push task panicked");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            anyhow::bail!("cluster state push failed for {failed} of {total} nodes");
        }
        debug!(
            cluster = %bundle.cluster,
            version = bundle.state.version,
            nodes = total,
            "cluster state pushed"
        );
        Ok(())
    }
}
