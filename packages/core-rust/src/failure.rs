//! Raw failures, before classification.

use std::error::Error;
use std::fmt;

/// Boxed error used as the opaque cause of a failure.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Typed hint attached by whoever observed the failure.
///
/// Markers take precedence over every other classification signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureMarker {
    NotFound,
    AlreadyExists,
    Conflict,
    /// Caller input was rejected before or by the ledger.
    InvalidInput,
}

/// Non-success answer from a peer node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    pub status: u16,
    pub body: String,
}

/// A failure observed on either execution path.
#[derive(Debug)]
pub struct Failure {
    message: String,
    detail: Option<String>,
    marker: Option<FailureMarker>,
    remote: Option<RemoteFailure>,
    source: Option<BoxError>,
}

impl Failure {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
            marker: None,
            remote: None,
            source: None,
        }
    }

    #[must_use]
    pub fn with_marker(mut self, marker: FailureMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Sets the marker only if one is given.
    #[must_use]
    pub fn with_marker_opt(mut self, marker: Option<FailureMarker>) -> Self {
        if marker.is_some() {
            self.marker = marker;
        }
        self
    }

    /// Text the message rules inspect instead of the full message.
    ///
    /// Set this when the message embeds caller-supplied values, so those
    /// values cannot steer classification.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_remote(mut self, status: u16, body: impl Into<String>) -> Self {
        self.remote = Some(RemoteFailure {
            status,
            body: body.into(),
        });
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Text seen by the message rules: the detail if set, else the message.
    #[must_use]
    pub fn detail(&self) -> &str {
        self.detail.as_deref().unwrap_or(&self.message)
    }

    #[must_use]
    pub fn marker(&self) -> Option<FailureMarker> {
        self.marker
    }

    #[must_use]
    pub fn remote(&self) -> Option<&RemoteFailure> {
        self.remote.as_ref()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for Failure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn Error + 'static))
    }
}
