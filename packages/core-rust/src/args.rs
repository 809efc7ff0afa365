//! Operation arguments.

use serde_json::{Map, Value};

use crate::operation::{FieldEncoding, OperationKind, ROUTE_ID};

/// Errors raised while building or encoding operation arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgsError {
    #[error("{operation} expects {expected} arguments, got {actual}")]
    Arity {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("field `{field}` must be an integer, got `{value}`")]
    NotAnInteger { field: &'static str, value: String },

    #[error("arguments built for {actual} cannot be used with {expected}")]
    Mismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Ordered string arguments of one operation call.
///
/// Values are kept in the operation's ledger argument order, so the same list
/// is sent to the ledger as-is and mapped to JSON fields for a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationArgs {
    kind: OperationKind,
    values: Vec<String>,
}

impl OperationArgs {
    /// Builds arguments from raw values in ledger order.
    ///
    /// # Errors
    ///
    /// Returns [`ArgsError::Arity`] if the number of values does not match the
    /// operation's argument list.
    pub fn new(kind: OperationKind, values: Vec<String>) -> Result<Self, ArgsError> {
        let expected = kind.operation().argument_order.len();
        if values.len() != expected {
            return Err(ArgsError::Arity {
                operation: kind.name(),
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { kind, values })
    }

    fn from_parts<const N: usize>(kind: OperationKind, values: [String; N]) -> Self {
        debug_assert_eq!(kind.operation().argument_order.len(), N);
        Self {
            kind,
            values: values.into(),
        }
    }

    #[must_use]
    pub fn create_product(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        category: impl Into<String>,
        quantity: impl Into<String>,
    ) -> Self {
        Self::from_parts(
            OperationKind::CreateProduct,
            [
                product_id.into(),
                product_name.into(),
                category.into(),
                quantity.into(),
            ],
        )
    }

    #[must_use]
    pub fn read_product(product_id: impl Into<String>) -> Self {
        Self::from_parts(OperationKind::ReadProduct, [product_id.into()])
    }

    #[must_use]
    pub fn update_product_quantity(
        product_id: impl Into<String>,
        quantity: impl Into<String>,
    ) -> Self {
        Self::from_parts(
            OperationKind::UpdateProductQuantity,
            [product_id.into(), quantity.into()],
        )
    }

    #[must_use]
    pub fn delete_product(product_id: impl Into<String>) -> Self {
        Self::from_parts(OperationKind::DeleteProduct, [product_id.into()])
    }

    #[must_use]
    pub fn create_shipment(
        shipment_id: impl Into<String>,
        product_id: impl Into<String>,
        origin: impl Into<String>,
        destination: impl Into<String>,
        carrier: impl Into<String>,
        quantity: impl Into<String>,
    ) -> Self {
        Self::from_parts(
            OperationKind::CreateShipment,
            [
                shipment_id.into(),
                product_id.into(),
                origin.into(),
                destination.into(),
                carrier.into(),
                quantity.into(),
            ],
        )
    }

    #[must_use]
    pub fn get_shipment(shipment_id: impl Into<String>) -> Self {
        Self::from_parts(OperationKind::GetShipment, [shipment_id.into()])
    }

    #[must_use]
    pub fn update_shipment_status(
        shipment_id: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self::from_parts(
            OperationKind::UpdateShipmentStatus,
            [shipment_id.into(), status.into()],
        )
    }

    #[must_use]
    pub fn place_order(product_id: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self::from_parts(
            OperationKind::PlaceOrder,
            [product_id.into(), quantity.into()],
        )
    }

    #[must_use]
    pub fn audit_log_by_product_id(product_id: impl Into<String>) -> Self {
        Self::from_parts(OperationKind::GetAuditLogByProductId, [product_id.into()])
    }

    // -- accessors ----------------------------------------------------------

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Values in ledger argument order.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Value of the named field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.kind
            .operation()
            .field_index(field)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// The entity id the call is about: the first argument.
    #[must_use]
    pub fn context_id(&self) -> &str {
        self.values.first().map_or("", String::as_str)
    }

    /// Value substituted into the route, if the operation has one.
    #[must_use]
    pub fn path_value(&self) -> Option<&str> {
        self.kind.operation().path_field.and_then(|f| self.get(f))
    }

    /// Confirms these arguments belong to `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ArgsError::Mismatch`] for arguments built for another
    /// operation.
    pub fn ensure_kind(&self, kind: OperationKind) -> Result<(), ArgsError> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(ArgsError::Mismatch {
                expected: kind.name(),
                actual: self.kind.name(),
            })
        }
    }

    // -- remote encoding ----------------------------------------------------

    /// Path segments of the peer request, route placeholder substituted.
    #[must_use]
    pub fn remote_segments(&self) -> Vec<String> {
        let path_value = self.path_value().unwrap_or_default();
        self.kind
            .operation()
            .route
            .split('/')
            .filter(|seg| !seg.is_empty())
            .map(|seg| {
                if seg == ROUTE_ID {
                    path_value.to_owned()
                } else {
                    seg.to_owned()
                }
            })
            .collect()
    }

    /// JSON body of the peer request.
    ///
    /// Every argument except the path argument becomes a field named after
    /// its position in the argument order. Returns `None` when no field is
    /// left.
    ///
    /// # Errors
    ///
    /// Returns [`ArgsError::NotAnInteger`] if an integer-encoded field does not
    /// parse.
    pub fn remote_body(&self) -> Result<Option<Value>, ArgsError> {
        let op = self.kind.operation();
        let mut body = Map::new();
        for (field, value) in op.argument_order.iter().zip(&self.values) {
            if op.path_field == Some(field.name) {
                continue;
            }
            let encoded = match field.encoding {
                FieldEncoding::Text => Value::String(value.clone()),
                FieldEncoding::Integer => value
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| ArgsError::NotAnInteger {
                        field: field.name,
                        value: value.clone(),
                    })?,
            };
            body.insert(field.name.to_owned(), encoded);
        }
        Ok((!body.is_empty()).then_some(Value::Object(body)))
    }
}
