//! Sensor availability guard for camera routes.

use super::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Switch that enables or disables a sensor's routes at runtime.
#[derive(Debug, Clone)]
pub struct SensorGuard {
    name: &'static str,
    enabled: Arc<AtomicBool>,
}

impl SensorGuard {
    pub fn new(name: &'static str, enabled: bool) -> Self {
        Self {
            name,
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Rejects requests with 503 while the sensor is disabled.
pub async fn check_sensor(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.guard.is_enabled() {
        tracing::debug!(sensor = state.guard.name(), "Rejected request for disabled sensor");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": format!("{} is disabled", state.guard.name()) })),
        )
            .into_response();
    }
    next.run(request).await
}
