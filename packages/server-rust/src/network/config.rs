//! Network configuration for the HTTP boundary.

use std::time::Duration;

/// Listener and request settings.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Maximum time one HTTP request may take, peer delegation included.
    pub request_timeout: Duration,
    /// How long shutdown waits for in-flight dispatches.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            request_timeout: Duration::from_secs(60),
            drain_timeout: Duration::from_secs(30),
        }
    }
}
