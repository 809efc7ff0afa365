//! HTTP middleware stack.
//!
//! Layers are listed outermost first: the first layer sees the request first
//! and the response last.

use axum::http::header::HeaderName;
use axum::http::StatusCode;
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

type HttpLayers = Stack<
    PropagateRequestIdLayer,
    Stack<
        TimeoutLayer,
        Stack<
            TraceLayer<SharedClassifier<ServerErrorsAsFailures>>,
            Stack<SetRequestIdLayer<MakeRequestUuid>, Identity>,
        >,
    >,
>;

/// Builds the HTTP-level middleware:
///
/// 1. `SetRequestId`: assigns a UUID v4 `x-request-id` unless the caller sent one
/// 2. `Trace`: one span per request, carrying the request id header
/// 3. `Timeout`: answers 408 when `request_timeout` elapses
/// 4. `PropagateRequestId`: copies the id onto the response
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(request_id))
        .into_inner()
}
