//! Operation dispatcher: routes each call to the ledger or to a peer.
//!
//! Both paths end in the same normalizer and the same classifier, so callers
//! cannot tell which one served a call. The choice is made once per call and
//! never retried on the other path.

use std::sync::Arc;
use std::time::Instant;

use supplychain_core::{
    extract, ArgsError, ClassifiedError, ErrorClassifier, Failure, FailureMarker, InvocationMode,
    NormalizeError, NormalizedResult, Operation, OperationArgs,
};
use tokio::sync::mpsc;
use tracing::{debug, field, info, info_span, warn, Instrument, Span};

use super::worker::RefreshTask;
use crate::ledger::{LedgerClient, LedgerError};
use crate::remote::{PeerRequest, PeerTransport, RemoteEndpoint, RemoteEndpointResolver};

/// Path chosen for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Local,
    Remote(Arc<RemoteEndpoint>),
}

impl Route {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote(_) => "remote",
        }
    }
}

/// Executes operations against the ledger or a peer instance.
pub struct OperationDispatcher {
    ledger: Arc<dyn LedgerClient>,
    transport: Arc<dyn PeerTransport>,
    resolver: Arc<RemoteEndpointResolver>,
    classifier: ErrorClassifier,
    remote_enabled: bool,
    refresh: Option<mpsc::Sender<RefreshTask>>,
}

impl OperationDispatcher {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        transport: Arc<dyn PeerTransport>,
        resolver: Arc<RemoteEndpointResolver>,
        remote_enabled: bool,
    ) -> Self {
        Self {
            ledger,
            transport,
            resolver,
            classifier: ErrorClassifier::new(),
            remote_enabled,
            refresh: None,
        }
    }

    /// Requests an endpoint refresh through `tx` whenever a peer cannot be
    /// reached. The failing call itself is not retried.
    #[must_use]
    pub fn with_endpoint_refresh(mut self, tx: mpsc::Sender<RefreshTask>) -> Self {
        self.refresh = Some(tx);
        self
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn remote_enabled(&self) -> bool {
        self.remote_enabled
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<RemoteEndpointResolver> {
        &self.resolver
    }

    /// Picks the path for the next call. The resolver is only consulted when
    /// remote delegation is switched on.
    pub async fn select_route(&self) -> Route {
        if !self.remote_enabled {
            return Route::Local;
        }
        let endpoint = self.resolver.endpoint().await;
        if endpoint.is_available() {
            Route::Remote(endpoint)
        } else {
            Route::Local
        }
    }

    /// Executes `operation` with `args`.
    ///
    /// # Errors
    ///
    /// Every failure, from either path, is returned as a [`ClassifiedError`].
    pub async fn execute(
        &self,
        operation: &'static Operation,
        args: &OperationArgs,
    ) -> Result<NormalizedResult, ClassifiedError> {
        let span = info_span!(
            "dispatch",
            operation = operation.name(),
            context_id = args.context_id(),
            route = field::Empty,
            duration_ms = field::Empty,
            outcome = field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = match args.ensure_kind(operation.kind) {
                Ok(()) => self.run(operation, args).await,
                Err(e) => Err(invalid_args(operation, e)),
            }
            .map_err(|failure| {
                self.classifier
                    .classify(failure, operation, args.context_id())
            });

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = start.elapsed().as_millis() as u64;
            let span = Span::current();
            span.record("duration_ms", duration_ms);

            match &result {
                Ok(_) => {
                    span.record("outcome", "ok");
                    info!("dispatch completed");
                }
                Err(e) => {
                    span.record("outcome", e.kind().as_str());
                    warn!(kind = e.kind().as_str(), error = %e, "dispatch failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Executes the operation the arguments were built for.
    ///
    /// # Errors
    ///
    /// See [`OperationDispatcher::execute`].
    pub async fn dispatch(&self, args: &OperationArgs) -> Result<NormalizedResult, ClassifiedError> {
        self.execute(args.kind().operation(), args).await
    }

    async fn run(
        &self,
        operation: &'static Operation,
        args: &OperationArgs,
    ) -> Result<NormalizedResult, Failure> {
        let route = self.select_route().await;
        Span::current().record("route", route.as_str());
        match route {
            Route::Local => self.run_local(operation, args).await,
            Route::Remote(endpoint) => self.run_remote(operation, args, &endpoint.base_url).await,
        }
    }

    // -- local path ---------------------------------------------------------

    async fn run_local(
        &self,
        operation: &'static Operation,
        args: &OperationArgs,
    ) -> Result<NormalizedResult, Failure> {
        let tx = operation.ledger_transaction;
        let outcome = match operation.mode {
            InvocationMode::Submit => self.ledger.submit(tx, args.values()).await,
            InvocationMode::Evaluate => self.ledger.evaluate(tx, args.values()).await,
        };
        let raw = outcome.map_err(|e| ledger_failure(operation, args, e))?;
        extract(&raw, operation.envelope_key, operation.on_empty)
            .map_err(|e| normalize_failure(operation, e))
    }

    // -- remote path --------------------------------------------------------

    async fn run_remote(
        &self,
        operation: &'static Operation,
        args: &OperationArgs,
        base_url: &str,
    ) -> Result<NormalizedResult, Failure> {
        let request =
            PeerRequest::for_operation(args).map_err(|e| invalid_args(operation, e))?;

        let response = self.transport.send(base_url, &request).await.map_err(|e| {
            self.request_refresh();
            Failure::new(format!("{}: peer request failed", operation.default_error))
                .with_source(e)
        })?;

        if !response.is_success() {
            let body = String::from_utf8_lossy(&response.body).into_owned();
            return Err(
                Failure::new(format!("peer returned status {}", response.status))
                    .with_remote(response.status, body),
            );
        }

        let result = extract(&response.body, operation.envelope_key, operation.on_empty)
            .map_err(|e| normalize_failure(operation, e))?;

        // Peers that answer a create collision with a success status.
        if operation.kind.is_create()
            && result.as_str().to_lowercase().contains("already exists")
        {
            return Err(Failure::new(result.into_string()).with_marker(FailureMarker::AlreadyExists));
        }
        Ok(result)
    }

    fn request_refresh(&self) {
        let Some(tx) = &self.refresh else {
            return;
        };
        // A full queue already holds a pending refresh.
        if tx.try_send(RefreshTask::RefreshNow { reply: None }).is_err() {
            debug!("endpoint refresh already pending or refresher stopped");
        }
    }
}

/// The context id stays out of the detail; only the ledger's own text is
/// matched by the message rules.
fn ledger_failure(operation: &Operation, args: &OperationArgs, err: LedgerError) -> Failure {
    Failure::new(format!(
        "{}: id={}: {err}",
        operation.default_error,
        args.context_id()
    ))
    .with_detail(err.to_string())
    .with_marker_opt(err.marker())
    .with_source(err)
}

fn invalid_args(operation: &Operation, err: ArgsError) -> Failure {
    Failure::new(format!("{}: {err}", operation.default_error))
        .with_marker(FailureMarker::InvalidInput)
        .with_source(err)
}

fn normalize_failure(operation: &Operation, err: NormalizeError) -> Failure {
    Failure::new(format!("{}: {err}", operation.default_error))
        .with_marker_opt(err.marker())
        .with_source(err)
}

// ---------------------------------------------------------------------------
// Typed entry points
// ---------------------------------------------------------------------------

impl OperationDispatcher {
    /// # Errors
    ///
    /// See [`OperationDispatcher::execute`].
    pub async fn create_product(
        &self,
        product_id: &str,
        product_name: &str,
        category: &str,
        quantity: &str,
    ) -> Result<NormalizedResult, ClassifiedError> {
        self.dispatch(&OperationArgs::create_product(
            product_id,
            product_name,
            category,
            quantity,
        ))
        .await
    }

    /// # Errors
    ///
    /// See [`OperationDispatcher::execute`].
    pub async fn read_product(&self, product_id: &str) -> Result<NormalizedResult, ClassifiedError> {
        self.dispatch(&OperationArgs::read_product(product_id)).await
    }

    /// # Errors
    ///
    /// See [`OperationDispatcher::execute`].
    pub async fn update_product_quantity(
        &self,
        product_id: &str,
        quantity: &str,
    ) -> Result<NormalizedResult, ClassifiedError> {
        self.dispatch(&OperationArgs::update_product_quantity(product_id, quantity))
            .await
    }

    /// # Errors
    ///
    /// See [`OperationDispatcher::execute`].
    pub async fn delete_product(
        &self,
        product_id: &str,
    ) -> Result<NormalizedResult, ClassifiedError> {
        self.dispatch(&OperationArgs::delete_product(product_id)).await
    }

    /// # Errors
    ///
    /// See [`OperationDispatcher::execute`].
    pub async fn create_shipment(
        &self,
        shipment_id: &str,
        product_id: &str,
        origin: &str,
        destination: &str,
        carrier: &str,
        quantity: &str,
    ) -> Result<NormalizedResult, ClassifiedError> {
        self.dispatch(&OperationArgs::create_shipment(
            shipment_id,
            product_id,
            origin,
            destination,
            carrier,
            quantity,
        ))
        .await
    }

    /// # Errors
    ///
    /// See [`OperationDispatcher::execute`].
    pub async fn get_shipment(
        &self,
        shipment_id: &str,
    ) -> Result<NormalizedResult, ClassifiedError> {
        self.dispatch(&OperationArgs::get_shipment(shipment_id)).await
    }

    /// # Errors
    ///
    /// See [`OperationDispatcher::execute`].
    pub async fn update_shipment_status(
        &self,
        shipment_id: &str,
        status: &str,
    ) -> Result<NormalizedResult, ClassifiedError> {
        self.dispatch(&OperationArgs::update_shipment_status(shipment_id, status))
            .await
    }

    /// # Errors
    ///
    /// See [`OperationDispatcher::execute`].
    pub async fn place_order(
        &self,
        product_id: &str,
        quantity: &str,
    ) -> Result<NormalizedResult, ClassifiedError> {
        self.dispatch(&OperationArgs::place_order(product_id, quantity))
            .await
    }

    /// # Errors
    ///
    /// See [`OperationDispatcher::execute`].
    pub async fn audit_log_by_product_id(
        &self,
        product_id: &str,
    ) -> Result<NormalizedResult, ClassifiedError> {
        self.dispatch(&OperationArgs::audit_log_by_product_id(product_id))
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use serde_json::json;
    use supplychain_core::{ErrorKind, OperationKind, RemoteMethod};

    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::remote::{PeerResponse, TransportError};

    // -- stubs --------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct LedgerCall {
        mode: InvocationMode,
        transaction: String,
        args: Vec<String>,
    }

    struct RecordingLedger {
        calls: Mutex<Vec<LedgerCall>>,
        reply: fn() -> Result<Bytes, LedgerError>,
    }

    impl RecordingLedger {
        fn new(reply: fn() -> Result<Bytes, LedgerError>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply,
            })
        }

        fn calls(&self) -> Vec<LedgerCall> {
            self.calls.lock().clone()
        }

        fn record(&self, mode: InvocationMode, transaction: &str, args: &[String]) {
            self.calls.lock().push(LedgerCall {
                mode,
                transaction: transaction.to_owned(),
                args: args.to_vec(),
            });
        }
    }

    #[async_trait]
    impl LedgerClient for RecordingLedger {
        async fn submit(&self, transaction: &str, args: &[String]) -> Result<Bytes, LedgerError> {
            self.record(InvocationMode::Submit, transaction, args);
            (self.reply)()
        }

        async fn evaluate(&self, transaction: &str, args: &[String]) -> Result<Bytes, LedgerError> {
            self.record(InvocationMode::Evaluate, transaction, args);
            (self.reply)()
        }
    }

    struct RecordingTransport {
        calls: Mutex<Vec<(String, PeerRequest)>>,
        reply: fn() -> Result<PeerResponse, TransportError>,
    }

    impl RecordingTransport {
        fn new(reply: fn() -> Result<PeerResponse, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply,
            })
        }

        fn calls(&self) -> Vec<(String, PeerRequest)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl PeerTransport for RecordingTransport {
        async fn send(
            &self,
            base_url: &str,
            request: &PeerRequest,
        ) -> Result<PeerResponse, TransportError> {
            self.calls
                .lock()
                .push((base_url.to_owned(), request.clone()));
            (self.reply)()
        }
    }

    fn reply(status: u16, body: &'static str) -> Result<PeerResponse, TransportError> {
        Ok(PeerResponse {
            status,
            body: Bytes::from_static(body.as_bytes()),
        })
    }

    fn ok_message() -> Result<Bytes, LedgerError> {
        Ok(Bytes::from_static(br#"{"message":"done"}"#))
    }

    fn unused_transport() -> Result<PeerResponse, TransportError> {
        reply(500, "transport must not be called")
    }

    fn dispatcher(
        ledger: Arc<dyn LedgerClient>,
        transport: Arc<dyn PeerTransport>,
        remote_url: &str,
        remote_enabled: bool,
    ) -> OperationDispatcher {
        let resolver = Arc::new(RemoteEndpointResolver::new(
            remote_url,
            Duration::from_secs(60),
        ));
        OperationDispatcher::new(ledger, transport, resolver, remote_enabled)
    }

    // -- routing ------------------------------------------------------------

    #[tokio::test]
    async fn remote_disabled_uses_ledger_once() {
        let ledger = RecordingLedger::new(ok_message);
        let transport = RecordingTransport::new(unused_transport);
        let d = dispatcher(ledger.clone(), transport.clone(), "http://peer", false);

        let result = d
            .create_product("P1", "Widget", "Tools", "10")
            .await
            .unwrap();

        assert_eq!(result.as_str(), "done");
        assert_eq!(
            ledger.calls(),
            [LedgerCall {
                mode: InvocationMode::Submit,
                transaction: "AssetContract:createProduct".into(),
                args: vec!["P1".into(), "Widget".into(), "Tools".into(), "10".into()],
            }]
        );
        assert!(transport.calls().is_empty());
        assert!(d.resolver().cached().is_none());
    }

    #[tokio::test]
    async fn queries_are_evaluated() {
        let ledger = RecordingLedger::new(|| Ok(Bytes::from_static(br#"{"shipmentId":"S1"}"#)));
        let d = dispatcher(ledger.clone(), RecordingTransport::new(unused_transport), "", false);

        let result = d.get_shipment("S1").await.unwrap();

        assert_eq!(result.as_str(), r#"{"shipmentId":"S1"}"#);
        let calls = ledger.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].mode, InvocationMode::Evaluate);
        assert_eq!(calls[0].transaction, "ShipmentContract:getShipment");
    }

    #[tokio::test]
    async fn blank_endpoint_falls_to_local() {
        let ledger = RecordingLedger::new(ok_message);
        let transport = RecordingTransport::new(unused_transport);
        let d = dispatcher(ledger.clone(), transport.clone(), "   ", true);

        d.delete_product("P1").await.unwrap();

        assert_eq!(ledger.calls().len(), 1);
        assert!(transport.calls().is_empty());
        assert_eq!(d.select_route().await, Route::Local);
    }

    #[tokio::test]
    async fn remote_update_uses_put_and_path() {
        let ledger = RecordingLedger::new(ok_message);
        let transport =
            RecordingTransport::new(|| reply(200, r#"{"message":"Product updated successfully"}"#));
        let d = dispatcher(ledger.clone(), transport.clone(), "http://peer:8080/", true);

        let result = d.update_product_quantity("P1", "7").await.unwrap();

        assert_eq!(result.as_str(), "Product updated successfully");
        assert!(ledger.calls().is_empty());
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let (base, request) = &calls[0];
        assert_eq!(base, "http://peer:8080");
        assert_eq!(request.method, RemoteMethod::Put);
        assert_eq!(request.path(), "/assets/update/P1");
        assert_eq!(request.body, Some(json!({ "quantity": "7" })));
    }

    #[tokio::test]
    async fn remote_place_order_sends_integer_quantity() {
        let transport = RecordingTransport::new(|| reply(200, r#"{"message":"ORD-1"}"#));
        let d = dispatcher(
            RecordingLedger::new(ok_message),
            transport.clone(),
            "http://peer",
            true,
        );

        let result = d.place_order("P1", "3").await.unwrap();

        assert_eq!(result.as_str(), "ORD-1");
        let (_, request) = &transport.calls()[0];
        assert_eq!(request.method, RemoteMethod::Post);
        assert_eq!(request.path(), "/assets/placeOrder");
        assert_eq!(
            request.body,
            Some(json!({ "productId": "P1", "quantity": 3 }))
        );
    }

    #[tokio::test]
    async fn non_integer_quantity_never_leaves_the_node() {
        let transport = RecordingTransport::new(unused_transport);
        let d = dispatcher(
            RecordingLedger::new(ok_message),
            transport.clone(),
            "http://peer",
            true,
        );

        let err = d.place_order("P1", "many").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.message(), "Failed to place order");
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn mismatched_arguments_are_rejected() {
        let ledger = RecordingLedger::new(ok_message);
        let d = dispatcher(ledger.clone(), RecordingTransport::new(unused_transport), "", false);

        let err = d
            .execute(
                OperationKind::DeleteProduct.operation(),
                &OperationArgs::read_product("P1"),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(ledger.calls().is_empty());
    }

    struct Expected {
        args: OperationArgs,
        mode: InvocationMode,
        transaction: &'static str,
        method: RemoteMethod,
        path: &'static str,
        body: Option<serde_json::Value>,
    }

    fn expected(kind: OperationKind) -> Expected {
        use supplychain_core::InvocationMode::{Evaluate, Submit};
        use supplychain_core::RemoteMethod::{Delete, Get, Post, Put};

        let (args, mode, transaction, method, path, body) = match kind {
            OperationKind::CreateProduct => (
                OperationArgs::create_product("P1", "Widget", "Tools", "10"),
                Submit,
                "AssetContract:createProduct",
                Post,
                "/assets/createProduct",
                Some(json!({
                    "productId": "P1",
                    "productName": "Widget",
                    "category": "Tools",
                    "quantity": 10
                })),
            ),
            OperationKind::ReadProduct => (
                OperationArgs::read_product("P1"),
                Evaluate,
                "AssetContract:readProduct",
                Get,
                "/assets/queryProduct/P1",
                None,
            ),
            OperationKind::UpdateProductQuantity => (
                OperationArgs::update_product_quantity("P1", "7"),
                Submit,
                "AssetContract:updateProductQuantity",
                Put,
                "/assets/update/P1",
                Some(json!({ "quantity": "7" })),
            ),
            OperationKind::DeleteProduct => (
                OperationArgs::delete_product("P1"),
                Submit,
                "AssetContract:deleteProduct",
                Delete,
                "/assets/removeProduct/P1",
                None,
            ),
            OperationKind::CreateShipment => (
                OperationArgs::create_shipment("S1", "P1", "Lyon", "Oslo", "DHL", "4"),
                Submit,
                "ShipmentContract:createShipment",
                Post,
                "/assets/createShipment",
                Some(json!({
                    "shipmentId": "S1",
                    "productId": "P1",
                    "origin": "Lyon",
                    "destination": "Oslo",
                    "carrier": "DHL",
                    "quantity": 4
                })),
            ),
            OperationKind::GetShipment => (
                OperationArgs::get_shipment("S1"),
                Evaluate,
                "ShipmentContract:getShipment",
                Get,
                "/assets/queryShipment/S1",
                None,
            ),
            OperationKind::UpdateShipmentStatus => (
                OperationArgs::update_shipment_status("S1", "IN_TRANSIT"),
                Submit,
                "ShipmentContract:updateShipmentStatus",
                Put,
                "/assets/updateShipment/S1",
                Some(json!({ "status": "IN_TRANSIT" })),
            ),
            OperationKind::PlaceOrder => (
                OperationArgs::place_order("P1", "3"),
                Submit,
                "ShipmentContract:placeOrder",
                Post,
                "/assets/placeOrder",
                Some(json!({ "productId": "P1", "quantity": 3 })),
            ),
            OperationKind::GetAuditLogByProductId => (
                OperationArgs::audit_log_by_product_id("P1"),
                Evaluate,
                "AssetContract:getAuditLogsByProductId",
                Get,
                "/assets/queryLogByProductId/P1",
                None,
            ),
        };
        Expected {
            args,
            mode,
            transaction,
            method,
            path,
            body,
        }
    }

    fn raw_ok() -> Result<Bytes, LedgerError> {
        Ok(Bytes::from_static(b"ok"))
    }

    #[tokio::test]
    async fn every_operation_runs_once_on_the_ledger_when_remote_is_off() {
        for kind in OperationKind::ALL {
            let want = expected(kind);
            let ledger = RecordingLedger::new(raw_ok);
            let transport = RecordingTransport::new(unused_transport);
            let d = dispatcher(ledger.clone(), transport.clone(), "http://peer", false);

            let result = d.dispatch(&want.args).await.unwrap();

            assert_eq!(result, NormalizedResult::new("ok"), "{kind}");
            assert_eq!(
                ledger.calls(),
                [LedgerCall {
                    mode: want.mode,
                    transaction: want.transaction.into(),
                    args: want.args.values().to_vec(),
                }],
                "{kind}"
            );
            assert!(transport.calls().is_empty(), "{kind}");
        }
    }

    #[tokio::test]
    async fn every_operation_runs_once_on_the_peer_when_remote_is_on() {
        for kind in OperationKind::ALL {
            let want = expected(kind);
            let ledger = RecordingLedger::new(raw_ok);
            let transport = RecordingTransport::new(|| reply(200, "ok"));
            let d = dispatcher(ledger.clone(), transport.clone(), "http://peer:8080", true);

            let result = d.dispatch(&want.args).await.unwrap();

            assert_eq!(result, NormalizedResult::new("ok"), "{kind}");
            assert!(ledger.calls().is_empty(), "{kind}");
            let calls = transport.calls();
            assert_eq!(calls.len(), 1, "{kind}");
            let (base, request) = &calls[0];
            assert_eq!(base, "http://peer:8080", "{kind}");
            assert_eq!(request.method, want.method, "{kind}");
            assert_eq!(request.path(), want.path, "{kind}");
            assert_eq!(request.body, want.body, "{kind}");
        }
    }

    // -- caller text and classification -------------------------------------

    #[tokio::test]
    async fn quantity_text_cannot_choose_the_error_kind() {
        let d = dispatcher(
            Arc::new(MemoryLedger::new()),
            RecordingTransport::new(unused_transport),
            "",
            false,
        );

        for quantity in ["not found", "already exists", "does not exist"] {
            let err = d
                .create_product("P1", "Widget", "Tools", quantity)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::BadRequest, "{quantity}");
            assert_eq!(err.http_status(), 400);
            assert_eq!(err.message(), "Failed to create product");
        }

        d.create_product("P1", "Widget", "Tools", "5").await.unwrap();
        let err = d
            .update_product_quantity("P1", "already exists")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn remote_quantity_text_cannot_choose_the_error_kind() {
        let transport = RecordingTransport::new(unused_transport);
        let d = dispatcher(
            RecordingLedger::new(ok_message),
            transport.clone(),
            "http://peer",
            true,
        );

        let err = d.place_order("P1", "does not exist").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.http_status(), 400);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn context_id_is_not_matched_by_text_rules() {
        let ledger = RecordingLedger::new(|| Err(LedgerError::Unavailable("gateway down".into())));
        let d = dispatcher(ledger, RecordingTransport::new(unused_transport), "", false);

        let err = d.read_product("already exists").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.message(), "Failed to read product");
        assert!(err.cause().message().contains("id=already exists"));
    }

    // -- local failures -----------------------------------------------------

    #[tokio::test]
    async fn ledger_not_found_is_typed() {
        let ledger = RecordingLedger::new(|| {
            Err(LedgerError::NotFound {
                message: "The product P9 does not exist".into(),
            })
        });
        let d = dispatcher(ledger, RecordingTransport::new(unused_transport), "", false);

        let err = d.read_product("P9").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "Product with id: P9 is not found");
        assert_eq!(err.http_status(), 404);
        assert!(err.cause().message().contains("id=P9"));
    }

    #[tokio::test]
    async fn unmarked_ledger_error_uses_policy_fallback() {
        let ledger = RecordingLedger::new(|| Err(LedgerError::Unavailable("gateway down".into())));
        let d = dispatcher(ledger, RecordingTransport::new(unused_transport), "", false);

        let err = d.update_shipment_status("S1", "LOST").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.message(), "Failed to update shipment");

        let err = d.audit_log_by_product_id("P1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.message(), "Failed to read audit log");
    }

    #[tokio::test]
    async fn empty_ledger_reply_depends_on_operation() {
        let ledger = RecordingLedger::new(|| Ok(Bytes::new()));
        let d = dispatcher(ledger, RecordingTransport::new(unused_transport), "", false);

        assert!(d.delete_product("P1").await.unwrap().is_empty());

        let err = d.read_product("P1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    // -- remote failures ----------------------------------------------------

    #[tokio::test]
    async fn peer_error_status_is_upstream() {
        let transport = RecordingTransport::new(|| {
            reply(404, r#"{"error":"Product with id: P1 is not found"}"#)
        });
        let d = dispatcher(RecordingLedger::new(ok_message), transport, "http://peer", true);

        let err = d.read_product("P1").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.message(), "Product with id: P1 is not found");
    }

    #[tokio::test]
    async fn peer_collision_reported_as_success_is_already_exists() {
        let transport =
            RecordingTransport::new(|| reply(200, r#"{"message":"Shipment S1 already exists"}"#));
        let d = dispatcher(RecordingLedger::new(ok_message), transport, "http://peer", true);

        let err = d
            .create_shipment("S1", "P1", "A", "B", "DHL", "2")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(err.message(), "Shipment with id: S1 already exists");
    }

    #[tokio::test]
    async fn transport_failure_uses_policy_fallback() {
        let transport = RecordingTransport::new(|| {
            Err(TransportError::InvalidUrl {
                url: "http://peer".into(),
                reason: "unreachable".into(),
            })
        });
        let d = dispatcher(RecordingLedger::new(ok_message), transport, "http://peer", true);

        let err = d.create_product("P1", "W", "C", "1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.message(), "Failed to create product");

        let err = d.get_shipment("S1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.http_status(), 500);
    }

    #[tokio::test]
    async fn unreachable_peer_requests_endpoint_refresh() {
        let transport = RecordingTransport::new(|| {
            Err(TransportError::InvalidUrl {
                url: "http://peer".into(),
                reason: "unreachable".into(),
            })
        });
        let (tx, mut rx) = mpsc::channel(4);
        let d = dispatcher(RecordingLedger::new(ok_message), transport, "http://peer", true)
            .with_endpoint_refresh(tx);

        d.read_product("P1").await.unwrap_err();

        assert!(matches!(
            rx.try_recv(),
            Ok(RefreshTask::RefreshNow { reply: None })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn peer_error_status_does_not_request_refresh() {
        let transport = RecordingTransport::new(|| reply(500, ""));
        let (tx, mut rx) = mpsc::channel(4);
        let d = dispatcher(RecordingLedger::new(ok_message), transport, "http://peer", true)
            .with_endpoint_refresh(tx);

        d.read_product("P1").await.unwrap_err();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_peer_reply_on_query_is_not_found() {
        let transport = RecordingTransport::new(|| reply(200, "{}"));
        let d = dispatcher(RecordingLedger::new(ok_message), transport, "http://peer", true);

        let err = d.get_shipment("S1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "Shipment with id: S1 is not found");
    }

    // -- with the in-memory ledger -----------------------------------------

    #[tokio::test]
    async fn memory_ledger_round_trip() {
        let d = dispatcher(
            Arc::new(MemoryLedger::new()),
            RecordingTransport::new(unused_transport),
            "",
            false,
        );

        d.create_product("P1", "Widget", "Tools", "10").await.unwrap();
        let err = d
            .create_product("P1", "Widget", "Tools", "10")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let order = d.place_order("P1", "4").await.unwrap();
        assert!(order.as_str().contains("ORD-1"));

        let err = d.place_order("P1", "40").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.http_status(), 409);

        let product: serde_json::Value =
            serde_json::from_str(d.read_product("P1").await.unwrap().as_str()).unwrap();
        assert_eq!(product["quantity"], 6);
    }
}
