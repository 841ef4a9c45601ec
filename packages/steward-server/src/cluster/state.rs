//! Shared controller state and the control loop's event channel.
//!
//! - `PublishedState`: `ArcSwap<ClusterState>` for lock-free reads of the
//!   last published state (readers never block the control loop)
//! - `ControllerEvent`: the single event type the control loop consumes
//! - `ControllerHandle`: cloneable front door the HTTP layer talks through

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot};

use steward_core::messages::{NodeStateReport, NodeStateView, ReportAck, SetWantedStateResponse};
use steward_core::state::ClusterState;
use steward_core::topology::Topology;
use steward_core::types::NodeId;

use super::types::{
    ControllerStatus, StateChangeError, StateChangeRequest, TopologyApplyError,
};

// ---------------------------------------------------------------------------
// PublishedState
// ---------------------------------------------------------------------------

/// Last published cluster state, readable without touching the control loop.
#[derive(Debug)]
pub struct PublishedState {
    state: ArcSwap<ClusterState>,
}

impl PublishedState {
    #[must_use]
    pub fn new(initial: ClusterState) -> Self {
        PublishedState { state: ArcSwap::from_pointee(initial) }
    }

    /// Returns the current state via lock-free `ArcSwap` load.
    #[must_use]
    pub fn load(&self) -> Arc<ClusterState> {
        self.state.load_full()
    }

    /// Replaces the current state atomically. Control loop only.
    pub fn store(&self, state: ClusterState) {
        self.state.store(Arc::new(state));
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.load().version
    }
}

// ---------------------------------------------------------------------------
// ControllerEvent
// ---------------------------------------------------------------------------

/// Everything the control loop reacts to. One bounded queue per cluster;
/// every mutation of controller state flows through here, which is what
/// makes the loop single-writer.
#[derive(Debug)]
pub enum ControllerEvent {
    /// A node reported its state. The reply is optional so internally
    /// generated reports need no throwaway channel.
    Report {
        report: NodeStateReport,
        reply: Option<oneshot::Sender<ReportAck>>,
    },
    /// An operator wants a node's wanted state changed (or probed).
    SetWantedState {
        request: StateChangeRequest,
        reply: oneshot::Sender<Result<SetWantedStateResponse, StateChangeError>>,
    },
    /// An operator is inspecting one node.
    NodeState {
        node: NodeId,
        reply: oneshot::Sender<Result<NodeStateView, StateChangeError>>,
    },
    /// A new topology generation arrived from configuration.
    ApplyTopology {
        generation: u64,
        topology: Box<Topology>,
        reply: oneshot::Sender<Result<(), TopologyApplyError>>,
    },
    /// Role and moratorium introspection.
    Status { reply: oneshot::Sender<ControllerStatus> },
}

// ---------------------------------------------------------------------------
// ControllerHandle
// ---------------------------------------------------------------------------

/// Cheap-to-clone handle to one cluster's controller.
///
/// Requests are serialized onto the control loop's queue; responses come
/// back on per-request oneshot channels. Reading the published state never
/// goes near the queue.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    cluster: String,
    events: mpsc::Sender<ControllerEvent>,
    published: Arc<PublishedState>,
}

impl ControllerHandle {
    #[must_use]
    pub fn new(
        cluster: String,
        events: mpsc::Sender<ControllerEvent>,
        published: Arc<PublishedState>,
    ) -> Self {
        ControllerHandle { cluster, events, published }
    }

    #[must_use]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Last published cluster state, lock-free.
    #[must_use]
    pub fn cluster_state(&self) -> Arc<ClusterState> {
        self.published.load()
    }

    /// Feeds one node report through the loop and waits for the ack.
    pub async fn report(&self, report: NodeStateReport) -> Result<ReportAck, StateChangeError> {
        let (reply, response) = oneshot::channel();
        self.send(ControllerEvent::Report { report, reply: Some(reply) }).await?;
        response.await.map_err(|_| StateChangeError::ShuttingDown)
    }

    pub async fn set_wanted_state(
        &self,
        request: StateChangeRequest,
    ) -> Result<SetWantedStateResponse, StateChangeError> {
        let (reply, response) = oneshot::channel();
        self.send(ControllerEvent::SetWantedState { request, reply }).await?;
        response.await.map_err(|_| StateChangeError::ShuttingDown)?
    }

    pub async fn node_state(&self, node: NodeId) -> Result<NodeStateView, StateChangeError> {
        let (reply, response) = oneshot::channel();
        self.send(ControllerEvent::NodeState { node, reply }).await?;
        response.await.map_err(|_| StateChangeError::ShuttingDown)?
    }

    pub async fn apply_topology(
        &self,
        generation: u64,
        topology: Topology,
    ) -> Result<(), TopologyApplyError> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(ControllerEvent::ApplyTopology {
                generation,
                topology: Box::new(topology),
                reply,
            })
            .await
            .map_err(|_| TopologyApplyError::ShuttingDown)?;
        response.await.map_err(|_| TopologyApplyError::ShuttingDown)?
    }

    pub async fn status(&self) -> Result<ControllerStatus, StateChangeError> {
        let (reply, response) = oneshot::channel();
        self.send(ControllerEvent::Status { reply }).await?;
        response.await.map_err(|_| StateChangeError::ShuttingDown)
    }

    async fn send(&self, event: ControllerEvent) -> Result<(), StateChangeError> {
        self.events
            .send(event)
            .await
            .map_err(|_| StateChangeError::ShuttingDown)
    }
}
