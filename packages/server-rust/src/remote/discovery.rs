//! Service discovery against a Consul-compatible health API.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

/// A healthy peer instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl ServiceInstance {
    /// `http(s)://host:port`, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Looks up healthy instances of a service.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    /// Returns the healthy instances registered under `service_id`, in
    /// registry order.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be queried.
    async fn healthy_instances(&self, service_id: &str) -> anyhow::Result<Vec<ServiceInstance>>;
}

// ---------------------------------------------------------------------------
// Consul
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthEntry {
    node: NodeEntry,
    service: ServiceEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeEntry {
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceEntry {
    #[serde(default)]
    address: String,
    port: u16,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    meta: Option<HashMap<String, String>>,
}

impl From<HealthEntry> for ServiceInstance {
    fn from(entry: HealthEntry) -> Self {
        let ServiceEntry {
            address,
            port,
            tags,
            meta,
        } = entry.service;
        let secure = meta
            .as_ref()
            .and_then(|m| m.get("secure"))
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
            || tags.iter().flatten().any(|t| t == "secure");
        let host = if address.trim().is_empty() {
            entry.node.address
        } else {
            address
        };
        Self { host, port, secure }
    }
}

/// Discovery client for `GET /v1/health/service/<id>?passing=true`.
#[derive(Debug, Clone)]
pub struct ConsulDiscovery {
    client: Client,
    registry_url: Url,
}

impl ConsulDiscovery {
    /// # Errors
    ///
    /// Returns an error if `registry_url` does not parse or the HTTP client
    /// cannot be built.
    pub fn new(registry_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let registry_url = Url::parse(registry_url)
            .with_context(|| format!("invalid registry url `{registry_url}`"))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build discovery client")?;
        Ok(Self {
            client,
            registry_url,
        })
    }

    fn health_url(&self, service_id: &str) -> anyhow::Result<Url> {
        let mut url = self.registry_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("registry url cannot be a base"))?
            .pop_if_empty()
            .extend(["v1", "health", "service", service_id]);
        url.query_pairs_mut().append_pair("passing", "true");
        Ok(url)
    }
}

#[async_trait]
impl ServiceDiscovery for ConsulDiscovery {
    async fn healthy_instances(&self, service_id: &str) -> anyhow::Result<Vec<ServiceInstance>> {
        let url = self.health_url(service_id)?;
        let entries: Vec<HealthEntry> = self
            .client
            .get(url)
            .send()
            .await
            .context("registry request failed")?
            .error_for_status()
            .context("registry returned an error status")?
            .json()
            .await
            .context("failed to decode registry response")?;
        Ok(entries.into_iter().map(ServiceInstance::from).collect())
    }
}
