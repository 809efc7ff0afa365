//! Supply-chain dispatch core: operation table, argument encoding, response
//! envelopes and error classification.
//!
//! Nothing in this crate performs I/O. The server crate drives the ledger and
//! peer transports and hands their raw outcomes to the types defined here.

pub mod args;
pub mod envelope;
pub mod error;
pub mod failure;
pub mod operation;

pub use args::{ArgsError, OperationArgs};
pub use envelope::{extract, EmptyBody, Envelope, NormalizeError, NormalizedResult};
pub use error::{ClassifiedError, ErrorClassifier, ErrorKind, Stage, TextRule, TEXT_RULES};
pub use failure::{BoxError, Failure, FailureMarker, RemoteFailure};
pub use operation::{
    Entity, Field, FieldEncoding, FailurePolicy, InvocationMode, Operation, OperationKind,
    RemoteMethod, OPERATIONS,
};
