use std::time::Duration;

/// Dispatch configuration: where operations run and how peers are reached.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Delegate operations to a peer when an endpoint is available.
    pub remote_enabled: bool,
    /// Static peer base URL. Blank means none; also the discovery fallback.
    pub remote_url: String,
    pub discovery: DiscoveryConfig,
    /// Total timeout of one peer request.
    pub request_timeout: Duration,
    /// Connect timeout of one peer request.
    pub connect_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            remote_enabled: false,
            remote_url: String::new(),
            discovery: DiscoveryConfig::default(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Service discovery settings.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// Service identifier peers register under.
    pub service_id: String,
    /// Base URL of the Consul-compatible registry.
    pub registry_url: String,
    /// Maximum age of a discovered endpoint before it is resolved again.
    pub refresh_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_id: "supplychain".to_owned(),
            registry_url: "http://127.0.0.1:8500".to_owned(),
            refresh_interval: Duration::from_secs(30),
        }
    }
}
