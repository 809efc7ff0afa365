//! Peer delegation: request model, HTTP transport, endpoint resolution.

pub mod discovery;
pub mod http;
pub mod resolver;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use serde_json::Value;
use supplychain_core::{ArgsError, OperationArgs, RemoteMethod};

pub use discovery::{ConsulDiscovery, ServiceDiscovery, ServiceInstance};
pub use http::HttpPeerTransport;
pub use resolver::{RemoteEndpoint, RemoteEndpointResolver, ResolvedVia};

/// Errors raised before or while talking to a peer. A peer answering with an
/// error status is not a transport error.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid peer url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("peer request failed: {0}")]
    Http(#[from] reqwest::Error),
}

// ---------------------------------------------------------------------------
// PeerRequest / PeerResponse
// ---------------------------------------------------------------------------

/// One outbound call to a peer, relative to its base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRequest {
    pub method: RemoteMethod,
    pub segments: Vec<String>,
    pub body: Option<Value>,
}

impl PeerRequest {
    /// Builds the peer request mirroring the operation's public route.
    ///
    /// # Errors
    ///
    /// Returns [`ArgsError`] if an argument cannot be encoded for the peer.
    pub fn for_operation(args: &OperationArgs) -> Result<Self, ArgsError> {
        Ok(Self {
            method: args.kind().operation().method,
            segments: args.remote_segments(),
            body: args.remote_body()?,
        })
    }

    /// Request path, for logging. Segments are not percent-encoded here.
    #[must_use]
    pub fn path(&self) -> String {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    /// Full URL under `base_url`. Segments are appended, so exactly one slash
    /// separates the base from the operation path.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if `base_url` is not an absolute
    /// URL that can carry a path.
    pub fn url(&self, base_url: &str) -> Result<Url, TransportError> {
        let invalid = |reason: String| TransportError::InvalidUrl {
            url: base_url.to_owned(),
            reason,
        };
        let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("url cannot be a base".to_owned()))?
            .pop_if_empty()
            .extend(&self.segments);
        Ok(url)
    }
}

/// A peer's answer. Any status counts as a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerResponse {
    pub status: u16,
    pub body: Bytes,
}

impl PeerResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends [`PeerRequest`]s to a peer instance.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Sends `request` to the peer at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the URL is invalid or the exchange does
    /// not complete.
    async fn send(&self, base_url: &str, request: &PeerRequest)
        -> Result<PeerResponse, TransportError>;
}
