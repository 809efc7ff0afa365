//! reqwest-backed peer transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use supplychain_core::RemoteMethod;
use tracing::debug;

use super::{PeerRequest, PeerResponse, PeerTransport, TransportError};
use crate::service::config::DispatchConfig;

/// Peer transport over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpPeerTransport {
    client: Client,
}

impl HttpPeerTransport {
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the HTTP client cannot be built.
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// # Errors
    ///
    /// See [`HttpPeerTransport::new`].
    pub fn from_config(config: &DispatchConfig) -> Result<Self, TransportError> {
        Self::new(config.request_timeout, config.connect_timeout)
    }
}

fn http_method(method: RemoteMethod) -> Method {
    match method {
        RemoteMethod::Post => Method::POST,
        RemoteMethod::Get => Method::GET,
        RemoteMethod::Put => Method::PUT,
        RemoteMethod::Delete => Method::DELETE,
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn send(
        &self,
        base_url: &str,
        request: &PeerRequest,
    ) -> Result<PeerResponse, TransportError> {
        let url = request.url(base_url)?;
        debug!(method = %request.method, %url, "sending peer request");

        let mut builder = self.client.request(http_method(request.method), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(PeerResponse { status, body })
    }
}
