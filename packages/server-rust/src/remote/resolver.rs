//! Remote endpoint resolution with a swappable cached snapshot.
//!
//! The resolver never fails: discovery errors and empty lookups fall back to
//! the static URL, which may itself be blank ("no remote available"). The last
//! resolution is held in an `ArcSwapOption`, so readers never block and a new
//! resolution replaces the old snapshot wholesale.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwapOption;
use tracing::{debug, warn};

use super::discovery::ServiceDiscovery;

/// How an endpoint was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedVia {
    Static,
    Discovery,
}

impl ResolvedVia {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Discovery => "discovery",
        }
    }
}

/// Immutable resolution result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    /// Base URL without a trailing slash. Blank means no remote is available.
    pub base_url: String,
    pub resolved_via: ResolvedVia,
    pub resolved_at: SystemTime,
}

impl RemoteEndpoint {
    fn new(base_url: &str, resolved_via: ResolvedVia) -> Self {
        Self {
            base_url: normalize_base(base_url),
            resolved_via,
            resolved_at: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        !self.base_url.is_empty()
    }

    fn younger_than(&self, max_age: Duration) -> bool {
        self.resolved_at
            .elapsed()
            .is_ok_and(|age| age < max_age)
    }
}

fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_owned()
}

struct DiscoverySource {
    client: Arc<dyn ServiceDiscovery>,
    service_id: String,
}

/// Resolves the base URL of the peer to delegate to.
pub struct RemoteEndpointResolver {
    static_url: String,
    discovery: Option<DiscoverySource>,
    refresh_interval: Duration,
    cached: ArcSwapOption<RemoteEndpoint>,
}

impl std::fmt::Debug for RemoteEndpointResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEndpointResolver")
            .field("static_url", &self.static_url)
            .field(
                "service_id",
                &self.discovery.as_ref().map(|d| d.service_id.as_str()),
            )
            .field("refresh_interval", &self.refresh_interval)
            .field("cached", &self.cached.load_full())
            .finish()
    }
}

impl RemoteEndpointResolver {
    /// Resolver that only ever returns `static_url`.
    #[must_use]
    pub fn new(static_url: impl Into<String>, refresh_interval: Duration) -> Self {
        Self {
            static_url: static_url.into(),
            discovery: None,
            refresh_interval,
            cached: ArcSwapOption::empty(),
        }
    }

    /// Enables discovery of `service_id`. The static URL stays the fallback.
    #[must_use]
    pub fn with_discovery(
        mut self,
        client: Arc<dyn ServiceDiscovery>,
        service_id: impl Into<String>,
    ) -> Self {
        self.discovery = Some(DiscoverySource {
            client,
            service_id: service_id.into(),
        });
        self
    }

    #[must_use]
    pub fn discovery_enabled(&self) -> bool {
        self.discovery.is_some()
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Last stored resolution, if any.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<RemoteEndpoint>> {
        self.cached.load_full()
    }

    /// Returns the cached endpoint while it is fresh, otherwise resolves.
    pub async fn endpoint(&self) -> Arc<RemoteEndpoint> {
        if let Some(endpoint) = self.cached.load_full() {
            if self.is_fresh(&endpoint) {
                return endpoint;
            }
        }
        self.resolve().await
    }

    /// Without discovery the static URL never changes. With discovery every
    /// snapshot expires, including a static fallback after a failed lookup.
    fn is_fresh(&self, endpoint: &RemoteEndpoint) -> bool {
        self.discovery.is_none() || endpoint.younger_than(self.refresh_interval)
    }

    /// Resolves afresh and replaces the cached snapshot.
    pub async fn resolve(&self) -> Arc<RemoteEndpoint> {
        let endpoint = Arc::new(self.lookup().await);
        self.cached.store(Some(Arc::clone(&endpoint)));
        endpoint
    }

    async fn lookup(&self) -> RemoteEndpoint {
        let Some(source) = &self.discovery else {
            return RemoteEndpoint::new(&self.static_url, ResolvedVia::Static);
        };

        match source.client.healthy_instances(&source.service_id).await {
            Ok(instances) => match instances.first() {
                Some(instance) => {
                    RemoteEndpoint::new(&instance.base_url(), ResolvedVia::Discovery)
                }
                None => {
                    debug!(
                        service_id = %source.service_id,
                        "no healthy instances, using static remote url"
                    );
                    RemoteEndpoint::new(&self.static_url, ResolvedVia::Static)
                }
            },
            Err(e) => {
                warn!(
                    service_id = %source.service_id,
                    error = %e,
                    "service discovery failed, using static remote url"
                );
                RemoteEndpoint::new(&self.static_url, ResolvedVia::Static)
            }
        }
    }
}
