//! Network module with deferred startup lifecycle.
//!
//! `new()` creates resources, `start()` binds the TCP listener, and
//! `serve()` accepts connections. The split lets the daemon wire up
//! controllers and read the bound port between the steps.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::cluster::ControllerSet;

use super::config::NetworkConfig;
use super::handlers::{
    apply_topology_handler, cluster_state_handler, cluster_status_handler, health_handler,
    list_clusters_handler, liveness_handler, node_state_handler, readiness_handler,
    report_handler, set_node_state_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;

/// Manages the operator API server lifecycle.
///
/// 1. `new()` -- allocates the shutdown controller and takes the handles
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    controllers: Arc<ControllerSet>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, controllers: Arc<ControllerSet>) -> Self {
        Self {
            config,
            listener: None,
            controllers,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller so the daemon
    /// can trigger shutdown or check health state from outside.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- Kubernetes liveness probe
    /// - `GET /health/ready` -- Kubernetes readiness probe
    /// - `GET /v1/clusters` -- cluster names
    /// - `GET /v1/clusters/{cluster}/state` -- last published cluster state
    /// - `GET /v1/clusters/{cluster}/status` -- controller role and counters
    /// - `POST /v1/clusters/{cluster}/report` -- node report (`MsgPack`)
    /// - `GET /v1/clusters/{cluster}/nodes/{node_type}/{index}` -- node view
    /// - `POST /v1/clusters/{cluster}/nodes/{node_type}/{index}/state` --
    ///   wanted-state change
    /// - `POST /v1/clusters/{cluster}/topology` -- topology replacement
    pub fn build_router(&self) -> Router {
        let state = AppState {
            controllers: Arc::clone(&self.controllers),
            shutdown: Arc::clone(&self.shutdown),
            start_time: Instant::now(),
        };

        let layers = build_http_layers(&self.config);

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/v1/clusters", get(list_clusters_handler))
            .route("/v1/clusters/{cluster}/state", get(cluster_state_handler))
            .route("/v1/clusters/{cluster}/status", get(cluster_status_handler))
            .route("/v1/clusters/{cluster}/report", post(report_handler))
            .route(
                "/v1/clusters/{cluster}/nodes/{node_type}/{index}",
                get(node_state_handler),
            )
            .route(
                "/v1/clusters/{cluster}/nodes/{node_type}/{index}/state",
                post(set_node_state_handler),
            )
            .route("/v1/clusters/{cluster}/topology", post(apply_topology_handler))
            .layer(layers)
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("operator API listening on {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves the operator API until the shutdown signal fires, then drains
    /// in-flight requests (up to 30 seconds) before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .take()
            .expect("start() must be called before serve()");
        let shutdown_ctrl = self.shutdown;

        // Transition to Ready so readiness probes pass.
        shutdown_ctrl.set_ready();

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        drain(&shutdown_ctrl).await;
        Ok(())
    }
}

/// Waits for in-flight requests once the listener stops accepting, then
/// transitions to Stopped.
async fn drain(shutdown_ctrl: &ShutdownController) {
    shutdown_ctrl.trigger_shutdown();

    let drained = shutdown_ctrl.wait_for_drain(Duration::from_secs(30)).await;
    if drained {
        info!("all in-flight requests drained");
    } else {
        warn!("drain timeout expired with requests still in flight");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use steward_core::messages::{NodeStateReport, ReportAck};
    use steward_core::topology::Topology;
    use steward_core::types::{NodeId, NodeState};

    use crate::cluster::{
        ControllerRole, FleetController, NullStatePublisher, StaticPeerLiveness, SystemClock,
    };
    use crate::service::config::{ClusterSpec, ControllerTuning};
    use crate::store::MemoryVersionStore;

    use super::*;

    fn module() -> NetworkModule {
        NetworkModule::new(NetworkConfig::default(), Arc::new(ControllerSet::new()))
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = module();
        assert!(module.listener.is_none());
    }

    #[test]
    fn shutdown_controller_returns_shared_arc() {
        let module = module();
        let s1 = module.shutdown_controller();
        let s2 = module.shutdown_controller();
        assert!(Arc::ptr_eq(&s1, &s2));
    }

    #[test]
    fn build_router_creates_router() {
        let module = module();
        let _router = module.build_router();
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = module();
        let port = module.start().await.expect("start should succeed");
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    #[should_panic(expected = "start() must be called before serve()")]
    async fn serve_panics_without_start() {
        let module = module();
        let _ = module.serve(std::future::pending::<()>()).await;
    }

    #[tokio::test]
    async fn serves_the_operator_api_end_to_end() {
        let spec = ClusterSpec {
            name: "media".to_string(),
            generation: 1,
            topology: Topology::flat(2, 1, 1),
            tuning: ControllerTuning {
                tick_interval_ms: 10,
                moratorium_grace_ms: 60_000,
                ..ControllerTuning::default()
            },
        };
        let controller = FleetController::new(
            spec,
            Arc::new(NullStatePublisher),
            Arc::new(StaticPeerLiveness),
            Arc::new(SystemClock),
            Arc::new(MemoryVersionStore::new()),
        )
        .unwrap();
        let (handle, mut worker) = controller.spawn();

        let controllers = Arc::new(ControllerSet::new());
        controllers.insert(handle.clone());

        let mut module = NetworkModule::new(NetworkConfig::default(), controllers);
        let port = module.start().await.unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async move {
            let _ = stop_rx.await;
        }));

        let client = reqwest::Client::new();
        let base = format!("http://127.0.0.1:{port}");

        for _ in 0..100 {
            if let Ok(response) = client.get(format!("{base}/health/ready")).send().await {
                if response.status() == reqwest::StatusCode::OK {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Election runs on ticks; reports end the moratorium.
        for _ in 0..500 {
            if handle.status().await.unwrap().role == ControllerRole::Master {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        for node in [NodeId::storage(0), NodeId::storage(1), NodeId::distributor(0)] {
            let report = NodeStateReport { node, state: NodeState::up(), sequence: 1 };
            let response = client
                .post(format!("{base}/v1/clusters/media/report"))
                .header("content-type", "application/msgpack")
                .body(rmp_serde::to_vec_named(&report).unwrap())
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            let ack: ReportAck = rmp_serde::from_slice(&response.bytes().await.unwrap()).unwrap();
            assert!(ack.applied);
        }

        let state: serde_json::Value = client
            .get(format!("{base}/v1/clusters/media/state"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(state["version"], 1);
        assert_eq!(state["nodeStates"]["storage.1"]["availability"], "up");

        let response = client
            .post(format!("{base}/v1/clusters/media/nodes/storage/0/state"))
            .json(&serde_json::json!({ "state": "maintenance", "description": "disk swap" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["outcome"], "allowed");
        assert_eq!(body["publishedVersion"], 2);

        let _ = stop_tx.send(());
        server.await.unwrap().unwrap();
        worker.stop().await;
    }
}
