//! Asset and shipment endpoints.
//!
//! Handlers only check that required fields are present, build the operation
//! arguments and hand them to the dispatcher. Success bodies use the
//! single-key envelopes peers expect (`message`, `product`, `shipment`).

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{Map, Value};
use supplychain_core::{envelope::keys, NormalizedResult, OperationArgs, OperationKind};

use super::{ApiError, AppState};

type ApiResult = Result<Json<Value>, ApiError>;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Quantity as sent by callers: a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(i64),
    Text(String),
}

impl Quantity {
    fn into_arg(self) -> Option<String> {
        match self {
            Self::Number(n) => Some(n.to_string()),
            Self::Text(s) if s.trim().is_empty() => None,
            Self::Text(s) => Some(s),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductBody {
    product_id: Option<String>,
    product_name: Option<String>,
    category: Option<String>,
    quantity: Option<Quantity>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuantityBody {
    quantity: Option<Quantity>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShipmentBody {
    shipment_id: Option<String>,
    product_id: Option<String>,
    origin: Option<String>,
    destination: Option<String>,
    carrier: Option<String>,
    quantity: Option<Quantity>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusBody {
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderBody {
    product_id: Option<String>,
    quantity: Option<Quantity>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    present(value).ok_or_else(|| ApiError::bad_request(message))
}

fn required_id(id: String, field: &str) -> Result<String, ApiError> {
    required(Some(id), &format!("Missing required field: {field}"))
}

async fn dispatch(state: &AppState, args: OperationArgs) -> ApiResult {
    if !state.shutdown.is_accepting() {
        return Err(ApiError::Unavailable);
    }
    let _guard = state.shutdown.in_flight_guard();
    let kind = args.kind();
    let result = state.dispatcher.dispatch(&args).await?;
    Ok(Json(success_body(kind, result)))
}

fn envelope(key: &str, value: impl Into<String>) -> Value {
    let mut map = Map::new();
    map.insert(key.to_owned(), Value::String(value.into()));
    Value::Object(map)
}

/// Success envelope per operation.
fn success_body(kind: OperationKind, result: NormalizedResult) -> Value {
    match kind {
        OperationKind::CreateProduct => envelope(keys::MESSAGE, "Product created successfully"),
        OperationKind::UpdateProductQuantity => {
            envelope(keys::MESSAGE, "Product updated successfully")
        }
        OperationKind::DeleteProduct => envelope(keys::MESSAGE, "Product deleted successfully"),
        OperationKind::CreateShipment => envelope(keys::MESSAGE, "Shipment created successfully"),
        OperationKind::UpdateShipmentStatus => {
            envelope(keys::MESSAGE, "Shipment updated successfully")
        }
        OperationKind::PlaceOrder => envelope(keys::MESSAGE, result),
        OperationKind::ReadProduct | OperationKind::GetAuditLogByProductId => {
            envelope(keys::PRODUCT, result)
        }
        OperationKind::GetShipment => envelope(keys::SHIPMENT, result),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<CreateProductBody>, JsonRejection>,
) -> ApiResult {
    const MISSING: &str =
        "Missing required product fields: productId, productName, category, quantity";
    let body = body(payload)?;
    let (Some(id), Some(name), Some(category), Some(quantity)) = (
        present(body.product_id),
        present(body.product_name),
        present(body.category),
        body.quantity.and_then(Quantity::into_arg),
    ) else {
        return Err(ApiError::bad_request(MISSING));
    };
    dispatch(
        &state,
        OperationArgs::create_product(id, name, category, quantity),
    )
    .await
}

pub async fn read_product(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = required_id(id, "productId")?;
    dispatch(&state, OperationArgs::read_product(id)).await
}

pub async fn update_product_quantity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<QuantityBody>, JsonRejection>,
) -> ApiResult {
    let id = required_id(id, "productId")?;
    let quantity = body(payload)?
        .quantity
        .and_then(Quantity::into_arg)
        .ok_or_else(|| ApiError::bad_request("Missing required field: quantity"))?;
    dispatch(&state, OperationArgs::update_product_quantity(id, quantity)).await
}

pub async fn delete_product(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = required_id(id, "productId")?;
    dispatch(&state, OperationArgs::delete_product(id)).await
}

pub async fn create_shipment(
    State(state): State<AppState>,
    payload: Result<Json<CreateShipmentBody>, JsonRejection>,
) -> ApiResult {
    const MISSING: &str = "Missing required shipment fields: \
        shipmentId, productId, origin, destination, carrier, quantity";
    let body = body(payload)?;
    let (
        Some(shipment_id),
        Some(product_id),
        Some(origin),
        Some(destination),
        Some(carrier),
        Some(quantity),
    ) = (
        present(body.shipment_id),
        present(body.product_id),
        present(body.origin),
        present(body.destination),
        present(body.carrier),
        body.quantity.and_then(Quantity::into_arg),
    ) else {
        return Err(ApiError::bad_request(MISSING));
    };
    dispatch(
        &state,
        OperationArgs::create_shipment(
            shipment_id,
            product_id,
            origin,
            destination,
            carrier,
            quantity,
        ),
    )
    .await
}

pub async fn get_shipment(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let id = required_id(id, "shipmentId")?;
    dispatch(&state, OperationArgs::get_shipment(id)).await
}

pub async fn update_shipment_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<StatusBody>, JsonRejection>,
) -> ApiResult {
    let id = required_id(id, "shipmentId")?;
    let status = required(body(payload)?.status, "Missing required field: status")?;
    dispatch(&state, OperationArgs::update_shipment_status(id, status)).await
}

pub async fn place_order(
    State(state): State<AppState>,
    payload: Result<Json<PlaceOrderBody>, JsonRejection>,
) -> ApiResult {
    let body = body(payload)?;
    let (Some(product_id), Some(quantity)) = (
        present(body.product_id),
        body.quantity.and_then(Quantity::into_arg),
    ) else {
        return Err(ApiError::bad_request(
            "Missing required fields: productId, quantity",
        ));
    };
    dispatch(&state, OperationArgs::place_order(product_id, quantity)).await
}

pub async fn audit_log_by_product_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult {
    let id = required_id(id, "productId")?;
    dispatch(&state, OperationArgs::audit_log_by_product_id(id)).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
