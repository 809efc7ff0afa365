//! Health, liveness and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;
use crate::network::HealthState;

/// Detailed health as JSON. Always 200; `state` tells whether the node is
/// serving, and `remote` shows where dispatches are currently delegated.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let resolver = state.dispatcher.resolver();
    let endpoint = resolver.cached();

    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "remote": {
            "enabled": state.dispatcher.remote_enabled(),
            "discovery": resolver.discovery_enabled(),
            "endpoint": endpoint.as_ref().map(|e| e.base_url.clone()),
            "resolved_via": endpoint.as_ref().map(|e| e.resolved_via.as_str()),
        },
    }))
}

/// Liveness probe: the process is up.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 only in the `Ready` state.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
