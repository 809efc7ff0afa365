//! Error classification.
//!
//! A [`Failure`] from either execution path is mapped to exactly one
//! [`ErrorKind`] by an ordered list of stages. The first stage with an answer
//! wins:
//!
//! 1. typed marker attached by whoever observed the failure,
//! 2. non-success status returned by a peer,
//! 3. text rules matched against the failure detail,
//! 4. the operation's fallback.
//!
//! The last stage always answers, so classification is total.

use std::error::Error;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::envelope::{keys, Envelope};
use crate::failure::{Failure, FailureMarker};
use crate::operation::Operation;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Caller-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Conflict,
    BadRequest,
    /// A peer answered with a non-success status.
    Upstream,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::Conflict => "conflict",
            Self::BadRequest => "bad_request",
            Self::Upstream => "upstream",
            Self::Unknown => "unknown",
        }
    }
}

impl From<FailureMarker> for ErrorKind {
    fn from(marker: FailureMarker) -> Self {
        match marker {
            FailureMarker::NotFound => Self::NotFound,
            FailureMarker::AlreadyExists => Self::AlreadyExists,
            FailureMarker::Conflict => Self::Conflict,
            FailureMarker::InvalidInput => Self::BadRequest,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ClassifiedError
// ---------------------------------------------------------------------------

/// A failure after classification. Only produced by [`ErrorClassifier`].
#[derive(Debug)]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    cause: Failure,
}

impl ClassifiedError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Status returned by the peer, for `Upstream` errors.
    #[must_use]
    pub fn upstream_status(&self) -> Option<u16> {
        self.status
    }

    /// The failure this error was classified from.
    #[must_use]
    pub fn cause(&self) -> &Failure {
        &self.cause
    }

    /// HTTP status to report at the API boundary.
    ///
    /// `Upstream` keeps the peer's status; a peer status that is not an error
    /// status is reported as 400.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self.kind {
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists | ErrorKind::Conflict => 409,
            ErrorKind::BadRequest => 400,
            ErrorKind::Upstream => self.status.filter(|s| (400..600).contains(s)).unwrap_or(400),
            ErrorKind::Unknown => 500,
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.cause)
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Classification stage, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TypedMarker,
    RemoteStatus,
    MessageText,
    Fallback,
}

/// Substring rule over the failure detail. Matching is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRule {
    pub needles: &'static [&'static str],
    pub kind: ErrorKind,
}

impl TextRule {
    fn matches(&self, lowered: &str) -> bool {
        self.needles.iter().any(|n| lowered.contains(n))
    }
}

/// Text rules, checked in order.
pub const TEXT_RULES: &[TextRule] = &[
    TextRule {
        needles: &["already exists"],
        kind: ErrorKind::AlreadyExists,
    },
    TextRule {
        needles: &["not found", "does not exist", "not exist"],
        kind: ErrorKind::NotFound,
    },
];

type StageFn = fn(&ErrorClassifier, &Failure) -> Option<ErrorKind>;

/// Stages that may decline; the fallback is applied after them.
const STAGES: [(Stage, StageFn); 3] = [
    (Stage::TypedMarker, typed_marker),
    (Stage::RemoteStatus, remote_status),
    (Stage::MessageText, ErrorClassifier::match_text),
];

fn typed_marker(_: &ErrorClassifier, failure: &Failure) -> Option<ErrorKind> {
    failure.marker().map(ErrorKind::from)
}

fn remote_status(_: &ErrorClassifier, failure: &Failure) -> Option<ErrorKind> {
    failure
        .remote()
        .filter(|r| !(200..300).contains(&r.status))
        .map(|_| ErrorKind::Upstream)
}

/// Maps failures to [`ClassifiedError`]s.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: &'static [TextRule],
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    #[must_use]
    pub const fn new() -> Self {
        Self { rules: TEXT_RULES }
    }

    #[must_use]
    pub const fn with_rules(rules: &'static [TextRule]) -> Self {
        Self { rules }
    }

    #[must_use]
    pub fn rules(&self) -> &'static [TextRule] {
        self.rules
    }

    fn match_text(&self, failure: &Failure) -> Option<ErrorKind> {
        let lowered = failure.detail().to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.kind)
    }

    /// Determines the deciding stage and the resulting kind.
    #[must_use]
    pub fn decide(&self, failure: &Failure, operation: &Operation) -> (Stage, ErrorKind) {
        STAGES
            .iter()
            .find_map(|(stage, run)| run(self, failure).map(|kind| (*stage, kind)))
            .unwrap_or((Stage::Fallback, operation.policy.fallback_kind()))
    }

    /// Classifies `failure` raised by `operation` for the entity `context_id`.
    #[must_use]
    pub fn classify(
        &self,
        failure: Failure,
        operation: &Operation,
        context_id: &str,
    ) -> ClassifiedError {
        let (stage, kind) = self.decide(&failure, operation);

        let (message, status) = match kind {
            ErrorKind::NotFound => (operation.entity.not_found_message(context_id), None),
            ErrorKind::AlreadyExists => {
                (operation.entity.already_exists_message(context_id), None)
            }
            ErrorKind::Conflict if !failure.message().trim().is_empty() => {
                (failure.message().to_owned(), None)
            }
            ErrorKind::Upstream => {
                let status = failure.remote().map(|r| r.status);
                (upstream_message(&failure, operation), status)
            }
            ErrorKind::Conflict | ErrorKind::BadRequest | ErrorKind::Unknown => {
                (operation.default_error.to_owned(), None)
            }
        };

        debug!(
            operation = operation.name(),
            context_id,
            ?stage,
            kind = kind.as_str(),
            cause = %failure,
            "classified failure"
        );

        ClassifiedError {
            kind,
            message,
            status,
            cause: failure,
        }
    }
}

/// Message carried by a peer error body, or the operation's default.
fn upstream_message(failure: &Failure, operation: &Operation) -> String {
    let body = failure.remote().map_or("", |r| r.body.as_str());
    match Envelope::parse(body.as_bytes(), keys::ERROR) {
        Ok(Envelope::Structured { value, .. } | Envelope::Raw(value))
            if !value.trim().is_empty() =>
        {
            value
        }
        _ => operation.default_error.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::operation::OperationKind;

    fn classify(failure: Failure, kind: OperationKind, id: &str) -> ClassifiedError {
        ErrorClassifier::new().classify(failure, kind.operation(), id)
    }

    #[test]
    fn marker_wins_over_text() {
        let failure = Failure::new("Product P1 does not exist")
            .with_marker(FailureMarker::AlreadyExists);
        let err = classify(failure, OperationKind::CreateProduct, "P1");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(err.message(), "Product with id: P1 already exists");
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn marker_wins_over_remote_status() {
        let failure = Failure::new("boom")
            .with_marker(FailureMarker::Conflict)
            .with_remote(500, "");
        let (stage, kind) =
            ErrorClassifier::new().decide(&failure, OperationKind::PlaceOrder.operation());
        assert_eq!(stage, Stage::TypedMarker);
        assert_eq!(kind, ErrorKind::Conflict);
    }

    #[test]
    fn text_rule_not_found() {
        let failure = Failure::new("Failed to read product: The product P9 does not exist");
        let err = classify(failure, OperationKind::ReadProduct, "P9");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "Product with id: P9 is not found");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn text_rules_are_case_insensitive() {
        let failure = Failure::new("Shipment S1 ALREADY EXISTS");
        let err = classify(failure, OperationKind::CreateShipment, "S1");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(err.message(), "Shipment with id: S1 already exists");
    }

    #[test]
    fn text_rules_ignore_text_outside_detail() {
        let failure = Failure::new("Failed to create product: id=P1: quantity `not found`")
            .with_detail("endorsement timed out");
        let err = classify(failure, OperationKind::CreateProduct, "P1");
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.message(), "Failed to create product");
    }

    #[test]
    fn invalid_input_marker_skips_text_rules() {
        let failure = Failure::new("field `quantity` must be an integer, got `already exists`")
            .with_marker(FailureMarker::InvalidInput);
        let (stage, kind) =
            ErrorClassifier::new().decide(&failure, OperationKind::ReadProduct.operation());
        assert_eq!(stage, Stage::TypedMarker);
        assert_eq!(kind, ErrorKind::BadRequest);
        let err = classify(failure, OperationKind::CreateProduct, "P1");
        assert_eq!(err.http_status(), 400);
        assert_eq!(err.message(), "Failed to create product");
    }

    #[test]
    fn remote_status_becomes_upstream_with_peer_message() {
        let failure = Failure::new("peer returned 404")
            .with_remote(404, r#"{"error":"Product with id: P1 is not found"}"#);
        let err = classify(failure, OperationKind::ReadProduct, "P1");
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.upstream_status(), Some(404));
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.message(), "Product with id: P1 is not found");
    }

    #[test]
    fn upstream_without_body_uses_default() {
        let failure = Failure::new("peer returned 502").with_remote(502, "");
        let err = classify(failure, OperationKind::GetShipment, "S1");
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.message(), "Failed to read shipment");
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn upstream_plain_text_body_is_kept() {
        let failure = Failure::new("peer returned 409").with_remote(409, "Insufficient stock");
        let err = classify(failure, OperationKind::PlaceOrder, "P1");
        assert_eq!(err.message(), "Insufficient stock");
    }

    #[test]
    fn fallback_follows_policy() {
        let err = classify(Failure::new("chaincode panicked"), OperationKind::PlaceOrder, "P1");
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.message(), "Failed to place order");
        assert_eq!(err.http_status(), 400);

        let err = classify(Failure::new("timeout"), OperationKind::ReadProduct, "P1");
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.message(), "Failed to read product");
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn cause_is_preserved() {
        let err = classify(Failure::new("inner"), OperationKind::DeleteProduct, "P1");
        assert_eq!(err.source().unwrap().to_string(), "inner");
        assert_eq!(err.cause().message(), "inner");
    }

    fn any_marker() -> impl Strategy<Value = Option<FailureMarker>> {
        prop_oneof![
            Just(None),
            Just(Some(FailureMarker::NotFound)),
            Just(Some(FailureMarker::AlreadyExists)),
            Just(Some(FailureMarker::Conflict)),
            Just(Some(FailureMarker::InvalidInput)),
        ]
    }

    proptest! {
        #[test]
        fn classification_is_total(
            message in ".{0,60}",
            marker in any_marker(),
            status in proptest::option::of(100u16..600),
            op_index in 0usize..9,
        ) {
            let mut failure = Failure::new(message).with_marker_opt(marker);
            if let Some(status) = status {
                failure = failure.with_remote(status, "");
            }
            let kind = OperationKind::ALL[op_index];
            let err = classify(failure, kind, "X1");
            prop_assert!(!err.message().is_empty());
            prop_assert!((400..600).contains(&err.http_status()));
            if let Some(marker) = marker {
                prop_assert_eq!(err.kind(), ErrorKind::from(marker));
            }
        }
    }
}
