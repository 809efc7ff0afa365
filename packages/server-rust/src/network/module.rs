//! Network module with deferred startup.
//!
//! `new()` allocates shared state, `start()` binds the listener and `serve()`
//! accepts requests until the shutdown future resolves, then drains
//! in-flight dispatches.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, on, MethodFilter, MethodRouter};
use axum::Router;
use supplychain_core::{Operation, OperationKind, RemoteMethod, OPERATIONS};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{assets, health_handler, liveness_handler, readiness_handler, AppState};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::service::OperationDispatcher;

/// Owns the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    dispatcher: Arc<OperationDispatcher>,
    shutdown: Arc<ShutdownController>,
    start_time: Instant,
}

impl NetworkModule {
    /// Creates the module without binding a port.
    #[must_use]
    pub fn new(config: NetworkConfig, dispatcher: Arc<OperationDispatcher>) -> Self {
        Self {
            config,
            listener: None,
            dispatcher,
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the router.
    ///
    /// - `GET /health`, `/health/live`, `/health/ready`
    /// - one route per operation, path and verb taken from the operation table
    pub fn build_router(&self) -> Router {
        let state = AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
        };

        let router = OPERATIONS.iter().fold(
            Router::new()
                .route("/health", get(health_handler))
                .route("/health/live", get(liveness_handler))
                .route("/health/ready", get(readiness_handler)),
            |router, op| router.route(op.route, operation_route(op)),
        );

        router
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the listener and returns the bound port, which differs from the
    /// configured one when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then waits up to the drain timeout
    /// for in-flight dispatches.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let controller = Arc::clone(&self.shutdown);
        let drain_timeout = self.config.drain_timeout;

        controller.set_ready();
        info!("serving HTTP");

        let draining = Arc::clone(&controller);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                draining.trigger_shutdown();
            })
            .await?;

        if controller.wait_for_drain(drain_timeout).await {
            info!("all dispatches drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with dispatches in flight"
            );
        }
        Ok(())
    }
}

fn method_filter(method: RemoteMethod) -> MethodFilter {
    match method {
        RemoteMethod::Post => MethodFilter::POST,
        RemoteMethod::Get => MethodFilter::GET,
        RemoteMethod::Put => MethodFilter::PUT,
        RemoteMethod::Delete => MethodFilter::DELETE,
    }
}

/// Binds the operation's handler under the operation's verb.
fn operation_route(op: &Operation) -> MethodRouter<AppState> {
    let filter = method_filter(op.method);
    match op.kind {
        OperationKind::CreateProduct => on(filter, assets::create_product),
        OperationKind::ReadProduct => on(filter, assets::read_product),
        OperationKind::UpdateProductQuantity => on(filter, assets::update_product_quantity),
        OperationKind::DeleteProduct => on(filter, assets::delete_product),
        OperationKind::CreateShipment => on(filter, assets::create_shipment),
        OperationKind::GetShipment => on(filter, assets::get_shipment),
        OperationKind::UpdateShipmentStatus => on(filter, assets::update_shipment_status),
        OperationKind::PlaceOrder => on(filter, assets::place_order),
        OperationKind::GetAuditLogByProductId => on(filter, assets::audit_log_by_product_id),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::network::HealthState;
    use crate::remote::{HttpPeerTransport, RemoteEndpointResolver};

    fn module() -> NetworkModule {
        let transport =
            HttpPeerTransport::new(Duration::from_secs(1), Duration::from_secs(1)).unwrap();
        let dispatcher = OperationDispatcher::new(
            Arc::new(MemoryLedger::new()),
            Arc::new(transport),
            Arc::new(RemoteEndpointResolver::new("", Duration::from_secs(30))),
            false,
        );
        let config = NetworkConfig {
            host: "127.0.0.1".into(),
            ..NetworkConfig::default()
        };
        NetworkModule::new(config, Arc::new(dispatcher))
    }

    #[test]
    fn shutdown_controller_is_shared() {
        let module = module();
        assert!(Arc::ptr_eq(
            &module.shutdown_controller(),
            &module.shutdown_controller()
        ));
    }

    #[tokio::test]
    async fn start_binds_os_assigned_port() {
        let mut module = module();
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let result = module().serve(std::future::ready(())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn serve_stops_on_signal() {
        let mut module = module();
        module.start().await.unwrap();
        let controller = module.shutdown_controller();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(module.serve(async {
            let _ = rx.await;
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(controller.health_state(), HealthState::Ready);

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }
}
