//! The per-cluster control loop.
//!
//! `FleetController` owns everything that can change one cluster's picture:
//! the node registry, the election state machine, the last built
//! `ClusterState`, and the version store. It runs inside a
//! `BackgroundWorker`, consuming `ControllerEvent`s and periodic ticks on a
//! single task, so every handler takes `&mut self` and nothing here locks.
//!
//! Publishing is persist-then-publish: a new version is written to the
//! version store before it becomes visible anywhere. If the write fails the
//! state is discarded and the same version number is retried on the next
//! rebuild, so observers may see version numbers skip but never repeat.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use steward_core::messages::{
    ClusterStateBundle, NodeStateReport, NodeStateView, ReportAck, SetWantedStateResponse,
    StateChangeOutcome,
};
use steward_core::state::ClusterState;
use steward_core::topology::{ConfiguredTolerance, TolerancePolicy, Topology};
use steward_core::types::{NodeId, NodeType};

use crate::service::config::{ClusterSpec, ControllerTuning};
use crate::service::metrics;
use crate::service::worker::{BackgroundRunnable, BackgroundWorker};
use crate::store::VersionStore;

use super::builder::build_cluster_state;
use super::election::MasterElection;
use super::registry::{NodeRegistry, ReportOutcome};
use super::safety;
use super::state::{ControllerEvent, ControllerHandle, PublishedState};
use super::traits::{ClockSource, PeerLiveness, StatePublisher};
use super::types::{
    ControllerStatus, StateChangeError, StateChangeRequest, StateChangeVerdict, TopologyApplyError,
};

// ---------------------------------------------------------------------------
// FleetController
// ---------------------------------------------------------------------------

/// Single-writer controller for one cluster.
///
/// Constructed from a `ClusterSpec`, then moved into its worker with
/// [`FleetController::spawn`]. Everything after that arrives through the
/// event queue or the tick.
pub struct FleetController {
    cluster: String,
    tuning: ControllerTuning,
    topology: Arc<Topology>,
    topology_generation: u64,
    registry: NodeRegistry,
    election: MasterElection,
    /// Last state that survived the persist step. Version numbering
    /// continues from here; never read for content before the first build.
    previous: ClusterState,
    published: Arc<PublishedState>,
    publisher: Arc<dyn StatePublisher>,
    liveness: Arc<dyn PeerLiveness>,
    clock: Arc<dyn ClockSource>,
    store: Arc<dyn VersionStore>,
    policy: Arc<dyn TolerancePolicy>,
}

impl FleetController {
    /// Builds a controller from its spec and collaborators. Reads the
    /// persisted version so numbering resumes across restarts.
    pub fn new(
        spec: ClusterSpec,
        publisher: Arc<dyn StatePublisher>,
        liveness: Arc<dyn PeerLiveness>,
        clock: Arc<dyn ClockSource>,
        store: Arc<dyn VersionStore>,
    ) -> anyhow::Result<Self> {
        spec.topology
            .validate()
            .with_context(|| format!("invalid topology for cluster {}", spec.name))?;
        let resumed = store
            .load(&spec.name)
            .with_context(|| format!("loading persisted version for cluster {}", spec.name))?
            .unwrap_or(0);
        if resumed > 0 {
            info!(cluster = %spec.name, version = resumed, "resuming version numbering");
        }
        metrics::register_cluster(&spec.name);

        let registry = NodeRegistry::new(&spec.topology);
        let election = MasterElection::new(spec.tuning.moratorium_grace_ms);
        let previous = ClusterState::resumed(resumed);
        let published = Arc::new(PublishedState::new(previous.clone()));

        Ok(FleetController {
            cluster: spec.name,
            tuning: spec.tuning,
            topology: Arc::new(spec.topology),
            topology_generation: spec.generation,
            registry,
            election,
            previous,
            published,
            publisher,
            liveness,
            clock,
            store,
            policy: Arc::new(ConfiguredTolerance),
        })
    }

    /// Swaps in a different tolerance policy. The default asks each group
    /// for its configured tolerance.
    #[must_use]
    pub fn with_tolerance_policy(mut self, policy: Arc<dyn TolerancePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Moves the controller onto its worker task and returns the handle the
    /// HTTP layer talks through. Dropping the worker (or calling
    /// `stop().await`) ends the loop.
    #[must_use]
    pub fn spawn(self) -> (ControllerHandle, BackgroundWorker<FleetController>) {
        let cluster = self.cluster.clone();
        let published = Arc::clone(&self.published);
        let tick_interval_ms = self.tuning.tick_interval_ms;
        let queue_capacity = self.tuning.event_queue_capacity;
        let (worker, events) = BackgroundWorker::start(self, tick_interval_ms, queue_capacity);
        (ControllerHandle::new(cluster, events, published), worker)
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    async fn handle_report(&mut self, report: NodeStateReport) -> ReportAck {
        let now_ms = self.clock.now_ms();
        let outcome = self
            .registry
            .report(report.node, report.state, report.sequence, now_ms);
        metrics::record_report(&self.cluster, outcome.label());
        if outcome == ReportOutcome::Applied {
            self.election.note_report(report.node);
            if self.election.is_master_ready() {
                self.rebuild_and_publish(now_ms).await;
            }
        }
        ReportAck { applied: outcome == ReportOutcome::Applied }
    }

    async fn handle_set_wanted_state(
        &mut self,
        request: StateChangeRequest,
    ) -> Result<SetWantedStateResponse, StateChangeError> {
        if !request.state.is_settable() {
            return Err(StateChangeError::NotSettable(request.state));
        }
        if !self.topology.contains(request.node) {
            return Err(StateChangeError::UnknownNode(request.node));
        }
        if !self.election.is_master() {
            return Err(StateChangeError::NotMaster);
        }
        if self.election.in_moratorium() {
            return Err(StateChangeError::NotMasterReady);
        }

        let now_ms = self.clock.now_ms();
        let snapshot = self.registry.snapshot();
        let verdict = safety::evaluate(
            &snapshot,
            &self.topology,
            self.policy.as_ref(),
            &request,
            now_ms,
            self.tuning.node_staleness_ms,
        );
        metrics::record_state_change(&self.cluster, verdict.label());
        if let StateChangeVerdict::Disallowed(reason) = &verdict {
            info!(node = %request.node, state = %request.state, %reason, "state change denied");
        }
        if request.probe || !verdict.is_allowed() {
            return Ok(verdict_response(&verdict, request.probe));
        }

        self.registry.set_wanted(request.node, request.wanted_state());
        info!(node = %request.node, state = %request.state, "wanted state set");
        let published_version = self.rebuild_and_publish(now_ms).await;
        Ok(SetWantedStateResponse {
            outcome: StateChangeOutcome::Allowed,
            reason: None,
            probe: false,
            published_version,
        })
    }

    fn handle_node_state(&self, node: NodeId) -> Result<NodeStateView, StateChangeError> {
        let info = self
            .registry
            .get(node)
            .ok_or(StateChangeError::UnknownNode(node))?;
        let now_ms = self.clock.now_ms();
        let staleness_ms = self.tuning.node_staleness_ms;
        Ok(NodeStateView {
            node,
            reported: info.reported_or_down(now_ms, staleness_ms),
            wanted: info.wanted.clone(),
            effective: info.effective(now_ms, staleness_ms),
        })
    }

    async fn handle_apply_topology(
        &mut self,
        generation: u64,
        topology: Topology,
    ) -> Result<(), TopologyApplyError> {
        if generation <= self.topology_generation {
            debug!(
                submitted = generation,
                current = self.topology_generation,
                "ignoring stale topology generation"
            );
            return Err(TopologyApplyError::StaleGeneration {
                submitted: generation,
                current: self.topology_generation,
            });
        }
        topology.validate()?;

        self.topology = Arc::new(topology);
        self.topology_generation = generation;
        self.registry.sync_topology(&self.topology);
        self.election.reset_outstanding(&self.topology.node_ids());
        info!(generation, nodes = self.registry.len(), "topology replaced");

        if self.election.is_master_ready() {
            let now_ms = self.clock.now_ms();
            self.rebuild_and_publish(now_ms).await;
        }
        Ok(())
    }

    fn status(&self) -> ControllerStatus {
        let state = self.published.load();
        ControllerStatus {
            cluster: self.cluster.clone(),
            role: self.election.role(),
            in_moratorium: self.election.in_moratorium(),
            published_version: state.version,
            node_count: self.registry.len(),
            nodes_up: state.up_count(NodeType::Storage) + state.up_count(NodeType::Distributor),
            topology_generation: self.topology_generation,
        }
    }

    // -----------------------------------------------------------------------
    // Control loop
    // -----------------------------------------------------------------------

    /// One pass of the periodic loop: feed the election, expire the
    /// moratorium, and rebuild so staleness demotions get published even
    /// when no event arrives.
    async fn tick(&mut self) {
        let now_ms = self.clock.now_ms();
        self.observe_election(now_ms);
        self.election.tick(now_ms);
        if self.election.is_master_ready() {
            self.rebuild_and_publish(now_ms).await;
        }
    }

    fn observe_election(&mut self, now_ms: u64) {
        let eligible = self.liveness.is_eligible();
        let has_majority = self.liveness.has_majority();
        let nodes = self.topology.node_ids();
        if let Some(role) = self.election.observe(eligible, has_majority, &nodes, now_ms) {
            metrics::record_role_transition(&self.cluster, role.as_str());
        }
    }

    /// Builds a candidate state and, if it differs from the last one,
    /// persists its version and publishes it. Returns the version that went
    /// out, or `None` when nothing changed or the persist failed.
    async fn rebuild_and_publish(&mut self, now_ms: u64) -> Option<u64> {
        let snapshot = self.registry.snapshot();
        let candidate = build_cluster_state(
            &self.previous,
            &snapshot,
            &self.topology,
            now_ms,
            self.tuning.node_staleness_ms,
        )?;
        let version = candidate.version;

        if let Err(error) = self.store.record(&self.cluster, version) {
            error!(version, %error, "failed to persist cluster state version, keeping previous state");
            metrics::record_persist_failure(&self.cluster);
            return None;
        }

        let nodes_up =
            candidate.up_count(NodeType::Storage) + candidate.up_count(NodeType::Distributor);
        self.previous = candidate.clone();
        self.published.store(candidate.clone());
        metrics::record_published(&self.cluster, version, nodes_up, candidate.node_states.len());
        info!(
            version,
            nodes_up,
            distribution_bits = candidate.distribution_bits,
            "published cluster state"
        );

        let bundle = ClusterStateBundle { cluster: self.cluster.clone(), state: candidate };
        if let Err(error) = self.publisher.publish(&bundle, &self.topology).await {
            warn!(version, %error, "cluster state push incomplete");
            metrics::record_push_failure(&self.cluster);
        }
        Some(version)
    }
}

/// Response for a request that stopped at the verdict: a probe, a denial,
/// or a no-op.
fn verdict_response(verdict: &StateChangeVerdict, probe: bool) -> SetWantedStateResponse {
    SetWantedStateResponse {
        outcome: verdict.outcome(),
        reason: verdict.reason().map(String::from),
        probe,
        published_version: None,
    }
}

#[async_trait]
impl BackgroundRunnable for FleetController {
    type Task = ControllerEvent;

    async fn run(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Report { report, reply } => {
                let ack = self.handle_report(report).await;
                if let Some(reply) = reply {
                    let _ = reply.send(ack);
                }
            }
            ControllerEvent::SetWantedState { request, reply } => {
                let _ = reply.send(self.handle_set_wanted_state(request).await);
            }
            ControllerEvent::NodeState { node, reply } => {
                let _ = reply.send(self.handle_node_state(node));
            }
            ControllerEvent::ApplyTopology { generation, topology, reply } => {
                let _ = reply.send(self.handle_apply_topology(generation, *topology).await);
            }
            ControllerEvent::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    async fn on_tick(&mut self) {
        self.tick().await;
    }

    async fn shutdown(&mut self) {
        info!(cluster = %self.cluster, "fleet controller stopped");
    }
}
