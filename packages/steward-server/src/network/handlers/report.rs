//! Node report ingress: `POST /v1/clusters/{cluster}/report`.
//!
//! Nodes report with MsgPack-encoded bodies on their own cadence; the ack
//! tells them whether the report was applied. A node that wants the latest
//! published state pulls it from the state endpoint.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::error;

use steward_core::messages::NodeStateReport;

use super::AppState;

/// Handles one node report. The body is a MsgPack `NodeStateReport`; the
/// 200 response is a MsgPack `ReportAck`.
pub async fn report_handler(
    State(state): State<AppState>,
    Path(cluster): Path<String>,
    body: Bytes,
) -> Response {
    let _guard = state.shutdown.in_flight_guard();

    let Some(handle) = state.controllers.get(&cluster) else {
        return (StatusCode::NOT_FOUND, format!("unknown cluster {cluster}")).into_response();
    };
    let report: NodeStateReport = match rmp_serde::from_slice(&body) {
        Ok(report) => report,
        Err(error) => {
            return (StatusCode::BAD_REQUEST, format!("malformed report: {error}"))
                .into_response();
        }
    };

    match handle.report(report).await {
        Ok(ack) => match rmp_serde::to_vec_named(&ack) {
            Ok(bytes) => {
                ([(header::CONTENT_TYPE, "application/msgpack")], bytes).into_response()
            }
            Err(error) => {
                error!(%error, "encoding report ack");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        Err(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "controller is shutting down".to_string())
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use axum::body::to_bytes;

    use steward_core::messages::ReportAck;
    use steward_core::topology::Topology;
    use steward_core::types::{NodeId, NodeState};

    use crate::cluster::{
        ControllerSet, FleetController, NullStatePublisher, StaticPeerLiveness, SystemClock,
    };
    use crate::network::ShutdownController;
    use crate::service::config::{ClusterSpec, ControllerTuning};
    use crate::store::MemoryVersionStore;

    use super::*;

    async fn test_state() -> (AppState, crate::service::worker::BackgroundWorker<FleetController>)
    {
        let spec = ClusterSpec {
            name: "media".to_string(),
            generation: 1,
            topology: Topology::flat(2, 1, 1),
            tuning: ControllerTuning::default(),
        };
        let controller = FleetController::new(
            spec,
            Arc::new(NullStatePublisher),
            Arc::new(StaticPeerLiveness),
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

    fn report_bytes(node: NodeId, sequence: u64) -> Bytes {
        let report = NodeStateReport { node, state: NodeState::up(), sequence };
        Bytes::from(rmp_serde::to_vec_named(&report).unwrap())
    }

    async fn ack_of(response: Response) -> ReportAck {
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        rmp_serde::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn report_is_acked_and_duplicates_are_not_applied() {
        let (state, mut worker) = test_state().await;

        let response = report_handler(
            State(state.clone()),
            Path("media".to_string()),
            report_bytes(NodeId::storage(0), 1),
        )
        .await;
        assert!(ack_of(response).await.applied);

        let response = report_handler(
            State(state),
            Path("media".to_string()),
            report_bytes(NodeId::storage(0), 1),
        )
        .await;
        assert!(!ack_of(response).await.applied);

        worker.stop().await;
    }

    #[tokio::test]
    async fn unknown_cluster_is_404() {
        let (state, mut worker) = test_state().await;
        let response = report_handler(
            State(state),
            Path("search".to_string()),
            report_bytes(NodeId::storage(0), 1),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        worker.stop().await;
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let (state, mut worker) = test_state().await;
        let response = report_handler(
            State(state),
            Path("media".to_string()),
            Bytes::from_static(b"not msgpack"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        worker.stop().await;
    }

    #[tokio::test]
    async fn stopped_controller_is_503() {
        let (state, mut worker) = test_state().await;
        worker.stop().await;

        let response = report_handler(
            State(state),
            Path("media".to_string()),
            report_bytes(NodeId::storage(0), 1),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
