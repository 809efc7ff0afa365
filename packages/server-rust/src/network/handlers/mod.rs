//! HTTP handlers and the state they share.

pub mod assets;
pub mod error;
pub mod health;

pub use error::ApiError;
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use crate::service::OperationDispatcher;

use super::ShutdownController;

/// Shared state passed to every handler via `State` extraction.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<OperationDispatcher>,
    /// Health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Process start time, for uptime.
    pub start_time: Instant,
}
