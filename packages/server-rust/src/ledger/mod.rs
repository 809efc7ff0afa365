//! Ledger client seam.
//!
//! The dispatcher talks to the ledger only through [`LedgerClient`]. Gateway
//! sessions, identities and endorsement are the concern of whatever
//! implements the trait; this crate ships [`MemoryLedger`], an in-process
//! implementation that enforces the same contract rules.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use supplychain_core::FailureMarker;

pub use memory::MemoryLedger;

/// Errors returned by a ledger transaction.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    AlreadyExists { message: String },

    #[error("{message}")]
    Conflict { message: String },

    /// An argument failed the contract's validation.
    #[error("transaction {transaction}: invalid argument: {message}")]
    InvalidArgument {
        transaction: String,
        message: String,
    },

    /// Endorsement rejected the transaction for any other reason.
    #[error("transaction {transaction} rejected: {message}")]
    Rejected {
        transaction: String,
        message: String,
    },

    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    /// Typed marker for the classifier, if this error carries one.
    #[must_use]
    pub fn marker(&self) -> Option<FailureMarker> {
        match self {
            Self::NotFound { .. } => Some(FailureMarker::NotFound),
            Self::AlreadyExists { .. } => Some(FailureMarker::AlreadyExists),
            Self::Conflict { .. } => Some(FailureMarker::Conflict),
            Self::InvalidArgument { .. } => Some(FailureMarker::InvalidInput),
            Self::Rejected { .. } | Self::UnknownTransaction(_) | Self::Unavailable(_) => None,
        }
    }
}

/// Invokes namespaced ledger transactions (`Contract:method`).
///
/// `submit` commits state changes; `evaluate` runs a read-only query. Both
/// return the raw response payload.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submits a state-mutating transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if the transaction is rejected or the ledger
    /// cannot be reached.
    async fn submit(&self, transaction: &str, args: &[String]) -> Result<Bytes, LedgerError>;

    /// Evaluates a read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] if the query fails or the ledger cannot be
    /// reached.
    async fn evaluate(&self, transaction: &str, args: &[String]) -> Result<Bytes, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers() {
        let err = LedgerError::NotFound {
            message: "The product P1 does not exist".into(),
        };
        assert_eq!(err.marker(), Some(FailureMarker::NotFound));
        assert_eq!(err.to_string(), "The product P1 does not exist");

        let err = LedgerError::Rejected {
            transaction: "AssetContract:createProduct".into(),
            message: "bad quantity".into(),
        };
        assert_eq!(err.marker(), None);
        assert!(err.to_string().contains("AssetContract:createProduct"));

        let err = LedgerError::InvalidArgument {
            transaction: "AssetContract:createProduct".into(),
            message: "quantity must be a non-negative integer, got `x`".into(),
        };
        assert_eq!(err.marker(), Some(FailureMarker::InvalidInput));
    }
}
