//! Response envelope normalization.
//!
//! Ledger transactions and peer endpoints answer with one of three shapes: a
//! single-key JSON object (`{"message": "..."}`, `{"product": {...}}`), a
//! bare payload, or nothing at all. [`extract`] collapses these into one
//! [`NormalizedResult`] so callers never see which shape was returned.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::failure::FailureMarker;

/// Envelope keys used by the operation table.
pub mod keys {
    pub const MESSAGE: &str = "message";
    pub const PRODUCT: &str = "product";
    pub const SHIPMENT: &str = "shipment";
    /// Key peers use for error bodies.
    pub const ERROR: &str = "error";
}

/// What an empty body means for a given operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyBody {
    /// Empty body is a successful, empty result.
    Accept,
    /// Empty body is a failure carrying the given marker.
    Reject(FailureMarker),
}

/// Errors raised while normalizing a response body.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("response body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("response carried no `{key}` payload")]
    Empty { key: String, marker: FailureMarker },
}

impl NormalizeError {
    /// Typed marker carried by this error, if any.
    #[must_use]
    pub fn marker(&self) -> Option<FailureMarker> {
        match self {
            Self::InvalidUtf8(_) => None,
            Self::Empty { marker, .. } => Some(*marker),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A parsed response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Object holding the expected key. `value` is the string payload, or
    /// the compact JSON text of a non-string payload.
    Structured { key: String, value: String },
    /// Anything else that has content, kept as text.
    Raw(String),
    /// Blank body, JSON `null`, `{}` or a blank JSON string.
    Empty,
}

impl Envelope {
    /// Classifies `raw` against `expected_key`.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::InvalidUtf8`] if the body is not text.
    pub fn parse(raw: &[u8], expected_key: &str) -> Result<Self, NormalizeError> {
        let text = std::str::from_utf8(raw)?;
        if text.trim().is_empty() {
            return Ok(Self::Empty);
        }

        let envelope = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) if map.is_empty() => Self::Empty,
            Ok(Value::Object(map)) => match map.get(expected_key) {
                Some(value) if !value.is_null() => Self::Structured {
                    key: expected_key.to_owned(),
                    value: payload_text(value),
                },
                _ => Self::Raw(text.to_owned()),
            },
            Ok(Value::Null) => Self::Empty,
            Ok(Value::String(s)) if s.trim().is_empty() => Self::Empty,
            Ok(Value::String(s)) => Self::Raw(s),
            Ok(_) | Err(_) => Self::Raw(text.to_owned()),
        };
        Ok(envelope)
    }

    /// Turns the envelope into a result, applying the empty-body policy.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::Empty`] when the envelope is empty and the
    /// policy rejects empty bodies.
    pub fn into_result(
        self,
        expected_key: &str,
        on_empty: EmptyBody,
    ) -> Result<NormalizedResult, NormalizeError> {
        match self {
            Self::Structured { value, .. } | Self::Raw(value) => Ok(NormalizedResult(value)),
            Self::Empty => match on_empty {
                EmptyBody::Accept => Ok(NormalizedResult::default()),
                EmptyBody::Reject(marker) => Err(NormalizeError::Empty {
                    key: expected_key.to_owned(),
                    marker,
                }),
            },
        }
    }
}

fn payload_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Extracts the payload of `raw` under `expected_key`.
///
/// # Errors
///
/// See [`Envelope::parse`] and [`Envelope::into_result`].
pub fn extract(
    raw: &[u8],
    expected_key: &str,
    on_empty: EmptyBody,
) -> Result<NormalizedResult, NormalizeError> {
    Envelope::parse(raw, expected_key)?.into_result(expected_key, on_empty)
}

// ---------------------------------------------------------------------------
// NormalizedResult
// ---------------------------------------------------------------------------

/// Successful outcome of an operation: the textual payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NormalizedResult(String);

impl NormalizedResult {
    #[must_use]
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NormalizedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedResult {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<NormalizedResult> for String {
    fn from(result: NormalizedResult) -> Self {
        result.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
