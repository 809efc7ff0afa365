//! Supply-chain dispatch server.
//!
//! Every flag can also be set through a `SUPPLYCHAIN_*` environment variable.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use supplychain_server::remote::{ConsulDiscovery, ServiceDiscovery};
use supplychain_server::service::{BackgroundWorker, DiscoveryConfig, EndpointRefresher};
use supplychain_server::{
    DispatchConfig, HttpPeerTransport, MemoryLedger, NetworkConfig, NetworkModule,
    OperationDispatcher, RemoteEndpointResolver,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "supplychain-server")]
#[command(about = "Supply-chain operation dispatch server")]
#[command(version)]
struct Cli {
    /// Bind address
    #[arg(long, env = "SUPPLYCHAIN_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on (0 = OS-assigned)
    #[arg(long, env = "SUPPLYCHAIN_PORT", default_value_t = 8080)]
    port: u16,

    /// Delegate operations to a peer instead of the local ledger
    #[arg(long, env = "SUPPLYCHAIN_REMOTE_ENABLED")]
    remote_enabled: bool,

    /// Static peer base URL, also the discovery fallback
    #[arg(long, env = "SUPPLYCHAIN_REMOTE_URL", default_value = "")]
    remote_url: String,

    /// Resolve the peer through service discovery
    #[arg(long, env = "SUPPLYCHAIN_DISCOVERY_ENABLED")]
    discovery_enabled: bool,

    /// Service id peers register under
    #[arg(long, env = "SUPPLYCHAIN_DISCOVERY_SERVICE_ID", default_value = "supplychain")]
    discovery_service_id: String,

    /// Consul-compatible registry URL
    #[arg(long, env = "SUPPLYCHAIN_DISCOVERY_URL", default_value = "http://127.0.0.1:8500")]
    discovery_url: String,

    /// Seconds between endpoint refreshes
    #[arg(long, env = "SUPPLYCHAIN_DISCOVERY_REFRESH_SECS", default_value_t = 30)]
    discovery_refresh_secs: u64,

    /// Peer request timeout in seconds
    #[arg(long, env = "SUPPLYCHAIN_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// Peer connect timeout in seconds
    #[arg(long, env = "SUPPLYCHAIN_CONNECT_TIMEOUT_SECS", default_value_t = 5)]
    connect_timeout_secs: u64,

    /// Log output format
    #[arg(long, env = "SUPPLYCHAIN_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

impl Cli {
    fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            remote_enabled: self.remote_enabled,
            remote_url: self.remote_url.clone(),
            discovery: DiscoveryConfig {
                enabled: self.discovery_enabled,
                service_id: self.discovery_service_id.clone(),
                registry_url: self.discovery_url.clone(),
                refresh_interval: Duration::from_secs(self.discovery_refresh_secs),
            },
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            // Leave room for a full peer round trip.
            request_timeout: Duration::from_secs(self.request_timeout_secs + 5),
            ..NetworkConfig::default()
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn build_resolver(config: &DispatchConfig) -> anyhow::Result<RemoteEndpointResolver> {
    let resolver =
        RemoteEndpointResolver::new(&config.remote_url, config.discovery.refresh_interval);
    if !config.discovery.enabled {
        return Ok(resolver);
    }
    let discovery = ConsulDiscovery::new(&config.discovery.registry_url, config.connect_timeout)
        .context("failed to configure service discovery")?;
    Ok(resolver.with_discovery(
        Arc::new(discovery) as Arc<dyn ServiceDiscovery>,
        config.discovery.service_id.clone(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let dispatch = cli.dispatch_config();
    let resolver = Arc::new(build_resolver(&dispatch)?);
    let transport = HttpPeerTransport::from_config(&dispatch)
        .context("failed to build peer transport")?;

    let mut refresher = if dispatch.remote_enabled {
        let endpoint = resolver.resolve().await;
        info!(
            base_url = %endpoint.base_url,
            via = endpoint.resolved_via.as_str(),
            "remote delegation enabled"
        );
        Some(EndpointRefresher::spawn(Arc::clone(&resolver)))
    } else {
        info!("remote delegation disabled, using local ledger");
        None
    };

    let mut dispatcher = OperationDispatcher::new(
        Arc::new(MemoryLedger::new()),
        Arc::new(transport),
        Arc::clone(&resolver),
        dispatch.remote_enabled,
    );
    if let Some(tx) = refresher.as_ref().and_then(BackgroundWorker::sender) {
        dispatcher = dispatcher.with_endpoint_refresh(tx);
    }
    let dispatcher = Arc::new(dispatcher);

    let mut network = NetworkModule::new(cli.network_config(), dispatcher);
    let port = network.start().await?;
    info!(port, "supplychain-server started");

    network
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    if let Some(worker) = refresher.as_mut() {
        worker.stop().await;
    }
    Ok(())
}
