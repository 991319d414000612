//! HTTP API for the cameras.
//!
//! # Routes
//!
//! - `GET /camera/upper`, `GET /camera/lower` - JPEG snapshot of device 0 / 1
//! - `GET /camera/devices` - configured cameras
//! - `POST /camera/capture` - snapshot, optionally saved (`device`, `save`)
//! - `GET /camera/stream/:device_id` - live MJPEG
//! - `GET /camera/photos` - saved photo names
//! - `GET /camera/photos/*filename` - one saved photo
//! - `GET /metrics` - Prometheus metrics
//! - `GET /health` - liveness
//!
//! Camera routes sit behind the [`SensorGuard`] middleware.

mod guard;
mod routes;
mod stream;

pub use guard::SensorGuard;

use crate::capture::StreamConfig;
use crate::manager::CaptureManager;
use crate::metrics::CaptureMetrics;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

/// Errors that can occur while running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub(crate) manager: CaptureManager,
    pub(crate) metrics: Arc<CaptureMetrics>,
    pub(crate) photos_dir: Arc<PathBuf>,
    pub(crate) stream: StreamConfig,
    pub(crate) guard: SensorGuard,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(
        manager: CaptureManager,
        metrics: Arc<CaptureMetrics>,
        photos_dir: PathBuf,
        guard: SensorGuard,
    ) -> Self {
        let stream = manager.config().stream.clone();
        Self {
            manager,
            metrics,
            photos_dir: Arc::new(photos_dir),
            stream,
            guard,
            shutdown: Arc::new(watch::channel(false).0),
        }
    }

    /// Ends every open MJPEG stream and refuses new ones.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    let camera = Router::new()
        .route("/upper", get(routes::upper))
        .route("/lower", get(routes::lower))
        .route("/devices", get(routes::list_devices))
        .route("/capture", post(routes::capture))
        .route("/stream/:device_id", get(routes::stream))
        .route("/photos", get(routes::list_photos))
        .route("/photos/*filename", get(routes::get_photo))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            guard::check_sensor,
        ));

    Router::new()
        .nest("/camera", camera)
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP server for the camera API.
pub struct CameraServer {
    bind_addr: SocketAddr,
    state: AppState,
}

impl CameraServer {
    pub fn new(bind_addr: SocketAddr, state: AppState) -> Self {
        Self { bind_addr, state }
    }

    /// Serves requests until `shutdown` resolves, then closes all cameras.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let manager = self.state.manager.clone();
        let state = self.state.clone();
        let app = router(self.state);

        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!(
            addr = %self.bind_addr,
            "Camera server listening"
        );

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                // Streams never end by themselves; close them so the drain finishes
                state.begin_shutdown();
            })
            .await
            .map_err(|e| ServerError::Server(e.to_string()));

        manager.shutdown();
        tracing::info!("Camera server stopped");
        served
    }
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
