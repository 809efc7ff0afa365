//! Operation descriptors.
//!
//! Every logical operation is described once, in the constant [`OPERATIONS`]
//! table. The ledger path reads the transaction name, invocation mode and
//! argument order from it; the remote path reads the route, HTTP method and
//! JSON field names from the same entry. Keeping both paths on one descriptor
//! is what makes them substitutable: the argument order sent to the ledger and
//! the field order serialized for a peer are the same list.

use std::fmt;

use serde::Serialize;

use crate::envelope::{keys, EmptyBody};
use crate::failure::FailureMarker;
use crate::ErrorKind;

// ---------------------------------------------------------------------------
// OperationKind
// ---------------------------------------------------------------------------

/// The nine logical operations exposed at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    CreateProduct,
    ReadProduct,
    UpdateProductQuantity,
    DeleteProduct,
    CreateShipment,
    GetShipment,
    UpdateShipmentStatus,
    PlaceOrder,
    GetAuditLogByProductId,
}

impl OperationKind {
    /// All operations, in table order.
    pub const ALL: [OperationKind; 9] = [
        Self::CreateProduct,
        Self::ReadProduct,
        Self::UpdateProductQuantity,
        Self::DeleteProduct,
        Self::CreateShipment,
        Self::GetShipment,
        Self::UpdateShipmentStatus,
        Self::PlaceOrder,
        Self::GetAuditLogByProductId,
    ];

    /// Returns the constant descriptor for this operation.
    #[must_use]
    pub fn operation(self) -> &'static Operation {
        &OPERATIONS[self as usize]
    }

    /// Public operation name, as used in logs and spans.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::CreateProduct => "createProduct",
            Self::ReadProduct => "readProduct",
            Self::UpdateProductQuantity => "updateProductQuantity",
            Self::DeleteProduct => "deleteProduct",
            Self::CreateShipment => "createShipment",
            Self::GetShipment => "getShipment",
            Self::UpdateShipmentStatus => "updateShipmentStatus",
            Self::PlaceOrder => "placeOrder",
            Self::GetAuditLogByProductId => "getAuditLogByProductId",
        }
    }

    /// Returns `true` for operations that create a new entity.
    #[must_use]
    pub fn is_create(self) -> bool {
        matches!(self, Self::CreateProduct | Self::CreateShipment)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Descriptor building blocks
// ---------------------------------------------------------------------------

/// Ledger invocation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// State-mutating transaction, committed to the ledger.
    Submit,
    /// Read-only query, never committed.
    Evaluate,
}

/// HTTP verb used when the operation is delegated to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMethod {
    Post,
    Get,
    Put,
    Delete,
}

impl RemoteMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for RemoteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a field is encoded in the JSON body sent to a peer.
///
/// Arguments are always carried as strings; `Integer` fields are emitted as
/// JSON numbers because the peer's endpoint binds them to integer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEncoding {
    Text,
    Integer,
}

/// One named argument of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub encoding: FieldEncoding,
}

impl Field {
    const fn text(name: &'static str) -> Self {
        Self {
            name,
            encoding: FieldEncoding::Text,
        }
    }

    const fn integer(name: &'static str) -> Self {
        Self {
            name,
            encoding: FieldEncoding::Integer,
        }
    }
}

/// The entity an operation's context id refers to. Used to word
/// not-found / already-exists messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Product,
    Shipment,
    AuditLog,
}

impl Entity {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Product => "Product",
            Self::Shipment => "Shipment",
            Self::AuditLog => "Audit log for product",
        }
    }

    /// Message used when the entity is absent.
    #[must_use]
    pub fn not_found_message(self, id: &str) -> String {
        format!("{} with id: {id} is not found", self.label())
    }

    /// Message used when a create collides with an existing entity.
    #[must_use]
    pub fn already_exists_message(self, id: &str) -> String {
        format!("{} with id: {id} already exists", self.label())
    }
}

/// Which error kind an unclassifiable failure falls back to.
///
/// Recorded per operation: failures of calls driven by user input are most
/// likely caused by that input, failures of queries are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Create/update/delete style calls. Falls back to `BadRequest`.
    InputSensitive,
    /// Query style calls. Falls back to `Unknown`.
    ReadSensitive,
}

impl FailurePolicy {
    #[must_use]
    pub fn fallback_kind(self) -> ErrorKind {
        match self {
            Self::InputSensitive => ErrorKind::BadRequest,
            Self::ReadSensitive => ErrorKind::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Immutable descriptor of one logical operation.
#[derive(Debug, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    /// Namespaced ledger transaction, `Contract:method`.
    pub ledger_transaction: &'static str,
    /// Argument names in ledger order. Doubles as the peer's JSON field names.
    pub argument_order: &'static [Field],
    pub mode: InvocationMode,
    pub method: RemoteMethod,
    /// Public route, also the path requested from a peer. `{id}` is replaced
    /// by the value of `path_field`.
    pub route: &'static str,
    /// Argument carried in the route instead of the JSON body.
    pub path_field: Option<&'static str>,
    /// Key of the single-key response envelope.
    pub envelope_key: &'static str,
    pub entity: Entity,
    /// What an empty response body means for this operation.
    pub on_empty: EmptyBody,
    pub policy: FailurePolicy,
    /// Generic message used when nothing more specific is known.
    pub default_error: &'static str,
}

impl Operation {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Position of `field` in the argument order.
    #[must_use]
    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.argument_order.iter().position(|f| f.name == field)
    }
}

/// Placeholder for the path argument inside [`Operation::route`].
pub const ROUTE_ID: &str = "{id}";

const PRODUCT_ID: &str = "productId";
const SHIPMENT_ID: &str = "shipmentId";

/// The operation table, indexed by `OperationKind as usize`.
pub static OPERATIONS: [Operation; 9] = [
    Operation {
        kind: OperationKind::CreateProduct,
        ledger_transaction: "AssetContract:createProduct",
        argument_order: &[
            Field::text(PRODUCT_ID),
            Field::text("productName"),
            Field::text("category"),
            Field::integer("quantity"),
        ],
        mode: InvocationMode::Submit,
        method: RemoteMethod::Post,
        route: "/assets/createProduct",
        path_field: None,
        envelope_key: keys::MESSAGE,
        entity: Entity::Product,
        on_empty: EmptyBody::Accept,
        policy: FailurePolicy::InputSensitive,
        default_error: "Failed to create product",
    },
    Operation {
        kind: OperationKind::ReadProduct,
        ledger_transaction: "AssetContract:readProduct",
        argument_order: &[Field::text(PRODUCT_ID)],
        mode: InvocationMode::Evaluate,
        method: RemoteMethod::Get,
        route: "/assets/queryProduct/{id}",
        path_field: Some(PRODUCT_ID),
        envelope_key: keys::PRODUCT,
        entity: Entity::Product,
        on_empty: EmptyBody::Reject(FailureMarker::NotFound),
        policy: FailurePolicy::ReadSensitive,
        default_error: "Failed to read product",
    },
    Operation {
        kind: OperationKind::UpdateProductQuantity,
        ledger_transaction: "AssetContract:updateProductQuantity",
        argument_order: &[Field::text(PRODUCT_ID), Field::text("quantity")],
        mode: InvocationMode::Submit,
        method: RemoteMethod::Put,
        route: "/assets/update/{id}",
        path_field: Some(PRODUCT_ID),
        envelope_key: keys::MESSAGE,
        entity: Entity::Product,
        on_empty: EmptyBody::Accept,
        policy: FailurePolicy::InputSensitive,
        default_error: "Failed to update product",
    },
    Operation {
        kind: OperationKind::DeleteProduct,
        ledger_transaction: "AssetContract:deleteProduct",
        argument_order: &[Field::text(PRODUCT_ID)],
        mode: InvocationMode::Submit,
        method: RemoteMethod::Delete,
        route: "/assets/removeProduct/{id}",
        path_field: Some(PRODUCT_ID),
        envelope_key: keys::MESSAGE,
        entity: Entity::Product,
        on_empty: EmptyBody::Accept,
        policy: FailurePolicy::InputSensitive,
        default_error: "Failed to delete product",
    },
    Operation {
        kind: OperationKind::CreateShipment,
        ledger_transaction: "ShipmentContract:createShipment",
        argument_order: &[
            Field::text(SHIPMENT_ID),
            Field::text(PRODUCT_ID),
            Field::text("origin"),
            Field::text("destination"),
            Field::text("carrier"),
            Field::integer("quantity"),
        ],
        mode: InvocationMode::Submit,
        method: RemoteMethod::Post,
        route: "/assets/createShipment",
        path_field: None,
        envelope_key: keys::MESSAGE,
        entity: Entity::Shipment,
        on_empty: EmptyBody::Accept,
        policy: FailurePolicy::InputSensitive,
        default_error: "Failed to create shipment",
    },
    Operation {
        kind: OperationKind::GetShipment,
        ledger_transaction: "ShipmentContract:getShipment",
        argument_order: &[Field::text(SHIPMENT_ID)],
        mode: InvocationMode::Evaluate,
        method: RemoteMethod::Get,
        route: "/assets/queryShipment/{id}",
        path_field: Some(SHIPMENT_ID),
        envelope_key: keys::SHIPMENT,
        entity: Entity::Shipment,
        on_empty: EmptyBody::Reject(FailureMarker::NotFound),
        policy: FailurePolicy::ReadSensitive,
        default_error: "Failed to read shipment",
    },
    Operation {
        kind: OperationKind::UpdateShipmentStatus,
        ledger_transaction: "ShipmentContract:updateShipmentStatus",
        argument_order: &[Field::text(SHIPMENT_ID), Field::text("status")],
        mode: InvocationMode::Submit,
        method: RemoteMethod::Put,
        route: "/assets/updateShipment/{id}",
        path_field: Some(SHIPMENT_ID),
        envelope_key: keys::MESSAGE,
        entity: Entity::Shipment,
        on_empty: EmptyBody::Accept,
        policy: FailurePolicy::InputSensitive,
        default_error: "Failed to update shipment",
    },
    Operation {
        kind: OperationKind::PlaceOrder,
        ledger_transaction: "ShipmentContract:placeOrder",
        argument_order: &[Field::text(PRODUCT_ID), Field::integer("quantity")],
        mode: InvocationMode::Submit,
        method: RemoteMethod::Post,
        route: "/assets/placeOrder",
        path_field: None,
        envelope_key: keys::MESSAGE,
        entity: Entity::Product,
        on_empty: EmptyBody::Accept,
        policy: FailurePolicy::InputSensitive,
        default_error: "Failed to place order",
    },
    Operation {
        kind: OperationKind::GetAuditLogByProductId,
        ledger_transaction: "AssetContract:getAuditLogsByProductId",
        argument_order: &[Field::text(PRODUCT_ID)],
        mode: InvocationMode::Evaluate,
        method: RemoteMethod::Get,
        route: "/assets/queryLogByProductId/{id}",
        path_field: Some(PRODUCT_ID),
        envelope_key: keys::PRODUCT,
        entity: Entity::AuditLog,
        on_empty: EmptyBody::Reject(FailureMarker::NotFound),
        policy: FailurePolicy::ReadSensitive,
        default_error: "Failed to read audit log",
    },
];

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
