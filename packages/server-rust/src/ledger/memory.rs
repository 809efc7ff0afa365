//! In-process ledger implementing the asset and shipment contracts.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use supplychain_core::{InvocationMode, OperationKind, OPERATIONS};

use super::{LedgerClient, LedgerError};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentRecord {
    pub shipment_id: String,
    pub product_id: String,
    pub origin: String,
    pub destination: String,
    pub carrier: String,
    pub quantity: i64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub order_id: String,
    pub product_id: String,
    pub quantity: i64,
}

/// One entry of a product's append-only audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub sequence: u64,
    pub action: &'static str,
    pub product_id: String,
    pub detail: String,
}

/// Status assigned to new shipments.
pub const SHIPMENT_CREATED: &str = "CREATED";

#[derive(Debug, Default)]
struct LedgerState {
    products: HashMap<String, ProductRecord>,
    shipments: HashMap<String, ShipmentRecord>,
    orders: Vec<OrderRecord>,
    audit: HashMap<String, Vec<AuditEntry>>,
    sequence: u64,
}

impl LedgerState {
    fn append_audit(&mut self, product_id: &str, action: &'static str, detail: String) {
        self.sequence += 1;
        let entry = AuditEntry {
            sequence: self.sequence,
            action,
            product_id: product_id.to_owned(),
            detail,
        };
        self.audit
            .entry(product_id.to_owned())
            .or_default()
            .push(entry);
    }

    fn product(&self, id: &str) -> Result<&ProductRecord, LedgerError> {
        self.products.get(id).ok_or_else(|| product_missing(id))
    }

    fn product_mut(&mut self, id: &str) -> Result<&mut ProductRecord, LedgerError> {
        self.products.get_mut(id).ok_or_else(|| product_missing(id))
    }
}

fn product_missing(id: &str) -> LedgerError {
    LedgerError::NotFound {
        message: format!("The product {id} does not exist"),
    }
}

// ---------------------------------------------------------------------------
// MemoryLedger
// ---------------------------------------------------------------------------

/// Ledger kept in memory behind a single lock.
///
/// Transactions are looked up in the operation table by their namespaced name,
/// so the set of accepted transactions and their invocation mode always match
/// what the dispatcher sends.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of products currently stored.
    #[must_use]
    pub fn product_count(&self) -> usize {
        self.state.read().products.len()
    }

    /// Orders placed so far, oldest first.
    #[must_use]
    pub fn orders(&self) -> Vec<OrderRecord> {
        self.state.read().orders.clone()
    }

    fn invoke(
        &self,
        mode: InvocationMode,
        transaction: &str,
        args: &[String],
    ) -> Result<Bytes, LedgerError> {
        let op = OPERATIONS
            .iter()
            .find(|op| op.ledger_transaction == transaction)
            .ok_or_else(|| LedgerError::UnknownTransaction(transaction.to_owned()))?;

        if op.mode != mode {
            let verb = match mode {
                InvocationMode::Submit => "submitted",
                InvocationMode::Evaluate => "evaluated",
            };
            return Err(rejected(transaction, format!("cannot be {verb}")));
        }
        if args.len() != op.argument_order.len() {
            return Err(rejected(
                transaction,
                format!(
                    "expected {} arguments, got {}",
                    op.argument_order.len(),
                    args.len()
                ),
            ));
        }

        match op.kind {
            OperationKind::CreateProduct => self.create_product(transaction, args),
            OperationKind::ReadProduct => self.read_product(&args[0]),
            OperationKind::UpdateProductQuantity => self.update_quantity(transaction, args),
            OperationKind::DeleteProduct => self.delete_product(&args[0]),
            OperationKind::CreateShipment => self.create_shipment(transaction, args),
            OperationKind::GetShipment => self.get_shipment(&args[0]),
            OperationKind::UpdateShipmentStatus => self.update_shipment(transaction, args),
            OperationKind::PlaceOrder => self.place_order(transaction, args),
            OperationKind::GetAuditLogByProductId => self.audit_log(&args[0]),
        }
    }

    // -- AssetContract ------------------------------------------------------

    fn create_product(&self, tx: &str, args: &[String]) -> Result<Bytes, LedgerError> {
        let quantity = parse_quantity(tx, &args[3])?;
        let mut state = self.state.write();
        let id = &args[0];
        if state.products.contains_key(id) {
            return Err(LedgerError::AlreadyExists {
                message: format!("The product {id} already exists"),
            });
        }
        state.products.insert(
            id.clone(),
            ProductRecord {
                product_id: id.clone(),
                product_name: args[1].clone(),
                category: args[2].clone(),
                quantity,
            },
        );
        state.append_audit(id, "CREATE_PRODUCT", format!("quantity={quantity}"));
        message(&format!("Product {id} created"))
    }

    fn read_product(&self, id: &str) -> Result<Bytes, LedgerError> {
        to_json(self.state.read().product(id)?)
    }

    fn update_quantity(&self, tx: &str, args: &[String]) -> Result<Bytes, LedgerError> {
        let quantity = parse_quantity(tx, &args[1])?;
        let mut state = self.state.write();
        let id = &args[0];
        let product = state.product_mut(id)?;
        let previous = product.quantity;
        product.quantity = quantity;
        state.append_audit(
            id,
            "UPDATE_QUANTITY",
            format!("quantity={previous}->{quantity}"),
        );
        message(&format!("Product {id} updated"))
    }

    fn delete_product(&self, id: &str) -> Result<Bytes, LedgerError> {
        let mut state = self.state.write();
        state.products.remove(id).ok_or_else(|| product_missing(id))?;
        state.append_audit(id, "DELETE_PRODUCT", String::new());
        message(&format!("Product {id} deleted"))
    }

    fn audit_log(&self, product_id: &str) -> Result<Bytes, LedgerError> {
        let state = self.state.read();
        match state.audit.get(product_id) {
            Some(entries) if !entries.is_empty() => to_json(entries),
            _ => Err(LedgerError::NotFound {
                message: format!("Audit log for product {product_id} does not exist"),
            }),
        }
    }

    // -- ShipmentContract ---------------------------------------------------

    fn create_shipment(&self, tx: &str, args: &[String]) -> Result<Bytes, LedgerError> {
        let quantity = parse_quantity(tx, &args[5])?;
        let mut state = self.state.write();
        let (shipment_id, product_id) = (&args[0], &args[1]);
        state.product(product_id)?;
        if state.shipments.contains_key(shipment_id) {
            return Err(LedgerError::AlreadyExists {
                message: format!("The shipment {shipment_id} already exists"),
            });
        }
        state.shipments.insert(
            shipment_id.clone(),
            ShipmentRecord {
                shipment_id: shipment_id.clone(),
                product_id: product_id.clone(),
                origin: args[2].clone(),
                destination: args[3].clone(),
                carrier: args[4].clone(),
                quantity,
                status: SHIPMENT_CREATED.to_owned(),
            },
        );
        state.append_audit(
            product_id,
            "CREATE_SHIPMENT",
            format!("shipmentId={shipment_id} quantity={quantity}"),
        );
        message(&format!("Shipment {shipment_id} created"))
    }

    fn get_shipment(&self, id: &str) -> Result<Bytes, LedgerError> {
        let state = self.state.read();
        let shipment = state
            .shipments
            .get(id)
            .ok_or_else(|| LedgerError::NotFound {
                message: format!("The shipment {id} does not exist"),
            })?;
        to_json(shipment)
    }

    fn update_shipment(&self, tx: &str, args: &[String]) -> Result<Bytes, LedgerError> {
        let (id, status) = (&args[0], args[1].trim());
        if status.is_empty() {
            return Err(invalid(tx, "status must not be blank".to_owned()));
        }
        let mut state = self.state.write();
        let shipment = state
            .shipments
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound {
                message: format!("The shipment {id} does not exist"),
            })?;
        shipment.status = status.to_owned();
        let product_id = shipment.product_id.clone();
        state.append_audit(
            &product_id,
            "UPDATE_SHIPMENT",
            format!("shipmentId={id} status={status}"),
        );
        message(&format!("Shipment {id} updated"))
    }

    fn place_order(&self, tx: &str, args: &[String]) -> Result<Bytes, LedgerError> {
        let quantity = parse_quantity(tx, &args[1])?;
        if quantity == 0 {
            return Err(invalid(tx, "order quantity must be positive".to_owned()));
        }
        let mut state = self.state.write();
        let product_id = &args[0];
        let product = state.product_mut(product_id)?;
        if product.quantity < quantity {
            return Err(LedgerError::Conflict {
                message: format!(
                    "Insufficient stock for product {product_id}: requested {quantity}, available {}",
                    product.quantity
                ),
            });
        }
        product.quantity -= quantity;

        let order = OrderRecord {
            order_id: format!("ORD-{}", state.orders.len() + 1),
            product_id: product_id.clone(),
            quantity,
        };
        state.orders.push(order.clone());
        state.append_audit(
            product_id,
            "PLACE_ORDER",
            format!("orderId={} quantity={quantity}", order.order_id),
        );
        to_json(&order)
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn submit(&self, transaction: &str, args: &[String]) -> Result<Bytes, LedgerError> {
        self.invoke(InvocationMode::Submit, transaction, args)
    }

    async fn evaluate(&self, transaction: &str, args: &[String]) -> Result<Bytes, LedgerError> {
        self.invoke(InvocationMode::Evaluate, transaction, args)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rejected(transaction: &str, message: String) -> LedgerError {
    LedgerError::Rejected {
        transaction: transaction.to_owned(),
        message,
    }
}

fn invalid(transaction: &str, message: String) -> LedgerError {
    LedgerError::InvalidArgument {
        transaction: transaction.to_owned(),
        message,
    }
}

/// Quantities are non-negative integers.
fn parse_quantity(transaction: &str, raw: &str) -> Result<i64, LedgerError> {
    match raw.trim().parse::<i64>() {
        Ok(q) if q >= 0 => Ok(q),
        _ => Err(invalid(
            transaction,
            format!("quantity must be a non-negative integer, got `{raw}`"),
        )),
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, LedgerError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| LedgerError::Unavailable(format!("failed to encode response: {e}")))
}

fn message(text: &str) -> Result<Bytes, LedgerError> {
    to_json(&serde_json::json!({ "message": text }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
