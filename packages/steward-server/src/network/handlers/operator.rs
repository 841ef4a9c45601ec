//! Operator REST surface: cluster inspection, wanted-state changes, and
//! topology replacement. JSON bodies throughout, camelCase on the wire.
//!
//! Rejections split by kind: malformed requests are 4xx, transient
//! controller conditions (no master yet, moratorium, shutdown) are 503 so
//! callers know to retry unchanged.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use steward_core::messages::SetWantedStateRequest;
use steward_core::topology::Topology;
use steward_core::types::{NodeId, NodeType};

use crate::cluster::{StateChangeError, StateChangeRequest, TopologyApplyError};

use super::AppState;

// ---------------------------------------------------------------------------
// Request shapes
// ---------------------------------------------------------------------------

/// Body of `POST /v1/clusters/{cluster}/topology`: a replacement topology
/// under a strictly newer generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyUpdate {
    pub generation: u64,
    pub topology: Topology,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /v1/clusters`: names of the clusters this daemon controls.
pub async fn list_clusters_handler(State(state): State<AppState>) -> impl IntoResponse {
    let _guard = state.shutdown.in_flight_guard();
    let mut names = state.controllers.names();
    names.sort();
    Json(names)
}

/// `GET /v1/clusters/{cluster}/state`: the last published cluster state.
/// Served from the lock-free snapshot, never touches the control loop.
pub async fn cluster_state_handler(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
) -> Response {
    let _guard = state.shutdown.in_flight_guard();
    match state.controllers.get(&cluster) {
        Some(handle) => Json(handle.cluster_state().as_ref().clone()).into_response(),
        None => unknown_cluster(&cluster),
    }
}

/// `GET /v1/clusters/{cluster}/status`: role, moratorium, and counters.
pub async fn cluster_status_handler(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
) -> Response {
    let _guard = state.shutdown.in_flight_guard();
    let Some(handle) = state.controllers.get(&cluster) else {
        return unknown_cluster(&cluster);
    };
    match handle.status().await {
        Ok(status) => Json(status).into_response(),
        Err(error) => state_change_error(&error),
    }
}

/// `GET /v1/clusters/{cluster}/nodes/{node_type}/{index}`: one node's
/// reported, wanted, and effective state.
pub async fn node_state_handler(
    State(state): State<AppState>,
    Path((cluster, node_type, index)): Path<(String, String, u16)>,
) -> Response {
    let _guard = state.shutdown.in_flight_guard();
    let Some(handle) = state.controllers.get(&cluster) else {
        return unknown_cluster(&cluster);
    };
    let node = match parse_node(&node_type, index) {
        Ok(node) => node,
        Err(response) => return response,
    };
    match handle.node_state(node).await {
        Ok(view) => Json(view).into_response(),
        Err(error) => state_change_error(&error),
    }
}

/// `POST /v1/clusters/{cluster}/nodes/{node_type}/{index}/state`: request a
/// wanted-state change, or probe the safety verdict with `probe: true`.
pub async fn set_node_state_handler(
    State(state): State<AppState>,
    Path((cluster, node_type, index)): Path<(String, String, u16)>,
    Json(request): Json<SetWantedStateRequest>,
) -> Response {
    let _guard = state.shutdown.in_flight_guard();
    let Some(handle) = state.controllers.get(&cluster) else {
        return unknown_cluster(&cluster);
    };
    let node = match parse_node(&node_type, index) {
        Ok(node) => node,
        Err(response) => return response,
    };
    let request = StateChangeRequest {
        node,
        state: request.state,
        description: request.description,
        condition: request.condition,
        probe: request.probe,
    };
    match handle.set_wanted_state(request).await {
        Ok(response) => Json(response).into_response(),
        Err(error) => state_change_error(&error),
    }
}

/// `POST /v1/clusters/{cluster}/topology`: replace the topology under a new
/// generation. 204 on success; the previous topology stays in force on any
/// rejection.
pub async fn apply_topology_handler(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
    Json(update): Json<TopologyUpdate>,
) -> Response {
    let _guard = state.shutdown.in_flight_guard();
    let Some(handle) = state.controllers.get(&cluster) else {
        return unknown_cluster(&cluster);
    };
    match handle.apply_topology(update.generation, update.topology).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => {
            let status = match &error {
                TopologyApplyError::Invalid(_) => StatusCode::BAD_REQUEST,
                TopologyApplyError::StaleGeneration { .. } => StatusCode::CONFLICT,
                TopologyApplyError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            };
            error_response(status, error.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn unknown_cluster(cluster: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("unknown cluster {cluster}"))
}

fn parse_node(node_type: &str, index: u16) -> Result<NodeId, Response> {
    match node_type.parse::<NodeType>() {
        Ok(node_type) => Ok(NodeId { node_type, index }),
        Err(error) => Err(error_response(StatusCode::BAD_REQUEST, error.to_string())),
    }
}

fn state_change_error(error: &StateChangeError) -> Response {
    let status = match error {
        StateChangeError::UnknownNode(_) => StatusCode::NOT_FOUND,
        StateChangeError::NotSettable(_) => StatusCode::BAD_REQUEST,
        StateChangeError::NotMaster
        | StateChangeError::NotMasterReady
        | StateChangeError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
    };
    error_response(status, error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use axum::body::to_bytes;
    use tokio::sync::mpsc;

    use steward_core::messages::{NodeStateReport, SetWantedStateResponse, StateChangeOutcome};
    use steward_core::state::ClusterState;
    use steward_core::types::{Availability, NodeState, StateChangeCondition};

    use crate::cluster::{
        ControllerHandle, ControllerRole, ControllerSet, FleetController, NullStatePublisher,
        PeerLiveness, PublishedState, SharedPeerLiveness, StaticPeerLiveness, SystemClock,
    };
    use crate::network::ShutdownController;
    use crate::service::config::{ClusterSpec, ControllerTuning};
    use crate::service::worker::BackgroundWorker;
    use crate::store::MemoryVersionStore;

    use super::*;

    async fn state_with_liveness(
        liveness: Arc<dyn PeerLiveness>,
    ) -> (AppState, BackgroundWorker<FleetController>) {
        let spec = ClusterSpec {
            name: "media".to_string(),
            generation: 1,
            topology: Topology::flat(2, 1, 1),
            tuning: ControllerTuning {
                tick_interval_ms: 10,
                moratorium_grace_ms: 5_000,
                ..ControllerTuning::default()
            },
        };
        let controller = FleetController::new(
            spec,
            Arc::new(NullStatePublisher),
            liveness,
            Arc::new(SystemClock),
            Arc::new(MemoryVersionStore::new()),
        )
        .unwrap();
        let (handle, worker) = controller.spawn();

        let controllers = Arc::new(ControllerSet::new());
        controllers.insert(handle);
        let state = AppState {
            controllers,
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        };
        (state, worker)
    }

    async fn test_state() -> (AppState, BackgroundWorker<FleetController>) {
        state_with_liveness(Arc::new(StaticPeerLiveness)).await
    }

    /// Drives the controller to a publishing master: waits out the election
    /// ticks, then reports every node so the moratorium ends.
    async fn make_master_ready(state: &AppState) {
        let handle = state.controllers.get("media").unwrap();
        for _ in 0..500 {
            if handle.status().await.unwrap().role == ControllerRole::Master {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        for node in [NodeId::storage(0), NodeId::storage(1), NodeId::distributor(0)] {
            let ack = handle
                .report(NodeStateReport { node, state: NodeState::up(), sequence: 1 })
                .await
                .unwrap();
            assert!(ack.applied);
        }
        let status = handle.status().await.unwrap();
        assert_eq!(status.role, ControllerRole::Master);
        assert!(!status.in_moratorium);
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn clusters_are_listed_sorted() {
        let (state, mut worker) = test_state().await;
        let (events, _rx) = mpsc::channel(1);
        state.controllers.insert(ControllerHandle::new(
            "alpha".to_string(),
            events,
            Arc::new(PublishedState::new(ClusterState::resumed(0))),
        ));

        let response = list_clusters_handler(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!(["alpha", "media"]));
        worker.stop().await;
    }

    #[tokio::test]
    async fn cluster_state_serves_the_published_snapshot() {
        let (state, mut worker) = test_state().await;
        make_master_ready(&state).await;

        let response = cluster_state_handler(State(state.clone()), Path("media".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["version"], 1);
        assert_eq!(body["nodeStates"]["storage.0"]["availability"], "up");
        assert_eq!(body["nodeStates"]["distributor.0"]["availability"], "up");

        let missing = cluster_state_handler(State(state), Path("search".to_string())).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        worker.stop().await;
    }

    #[tokio::test]
    async fn status_reports_role_and_version() {
        let (state, mut worker) = test_state().await;
        make_master_ready(&state).await;

        let response =
            cluster_status_handler(State(state.clone()), Path("media".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["role"], "master");
        assert_eq!(body["publishedVersion"], 1);
        assert_eq!(body["nodeCount"], 3);
        worker.stop().await;
    }

    #[tokio::test]
    async fn node_state_is_served_and_parse_errors_map_to_400() {
        let (state, mut worker) = test_state().await;
        make_master_ready(&state).await;

        let response = node_state_handler(
            State(state.clone()),
            Path(("media".to_string(), "storage".to_string(), 0)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["node"], "storage.0");
        assert_eq!(body["reported"]["availability"], "up");
        assert_eq!(body["effective"]["availability"], "up");

        let bad_type = node_state_handler(
            State(state.clone()),
            Path(("media".to_string(), "gateway".to_string(), 0)),
        )
        .await;
        assert_eq!(bad_type.status(), StatusCode::BAD_REQUEST);

        let missing = node_state_handler(
            State(state),
            Path(("media".to_string(), "storage".to_string(), 9)),
        )
        .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        worker.stop().await;
    }

    #[tokio::test]
    async fn set_node_state_applies_through_the_controller() {
        let (state, mut worker) = test_state().await;
        make_master_ready(&state).await;

        let request = SetWantedStateRequest {
            state: Availability::Maintenance,
            description: Some("disk swap".to_string()),
            condition: StateChangeCondition::Safe,
            probe: false,
        };
        let response = set_node_state_handler(
            State(state.clone()),
            Path(("media".to_string(), "storage".to_string(), 0)),
            Json(request),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let response: SetWantedStateResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(response.outcome, StateChangeOutcome::Allowed);
        assert_eq!(response.published_version, Some(2));
        worker.stop().await;
    }

    #[tokio::test]
    async fn follower_rejections_and_unsettable_states_map_to_statuses() {
        let liveness = SharedPeerLiveness::new();
        liveness.set_eligible(false);
        let (state, mut worker) = state_with_liveness(Arc::new(liveness)).await;

        // Report-only states are rejected before the mastership check.
        let unsettable = set_node_state_handler(
            State(state.clone()),
            Path(("media".to_string(), "storage".to_string(), 0)),
            Json(SetWantedStateRequest {
                state: Availability::Initializing,
                description: None,
                condition: StateChangeCondition::Safe,
                probe: false,
            }),
        )
        .await;
        assert_eq!(unsettable.status(), StatusCode::BAD_REQUEST);

        let not_master = set_node_state_handler(
            State(state),
            Path(("media".to_string(), "storage".to_string(), 0)),
            Json(SetWantedStateRequest {
                state: Availability::Maintenance,
                description: None,
                condition: StateChangeCondition::Safe,
                probe: false,
            }),
        )
        .await;
        assert_eq!(not_master.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(not_master).await;
        assert!(body["error"].as_str().unwrap_or_default().contains("not the master"));
        worker.stop().await;
    }

    #[tokio::test]
    async fn topology_updates_apply_and_stale_generations_conflict() {
        let (state, mut worker) = test_state().await;
        make_master_ready(&state).await;

        let grown = TopologyUpdate { generation: 2, topology: Topology::flat(3, 1, 1) };
        let response = apply_topology_handler(
            State(state.clone()),
            Path("media".to_string()),
            Json(grown.clone()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let stale =
            apply_topology_handler(State(state.clone()), Path("media".to_string()), Json(grown))
                .await;
        assert_eq!(stale.status(), StatusCode::CONFLICT);

        let invalid = TopologyUpdate { generation: 3, topology: Topology::flat(1, 0, 1) };
        let response =
            apply_topology_handler(State(state), Path("media".to_string()), Json(invalid)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        worker.stop().await;
    }
}
