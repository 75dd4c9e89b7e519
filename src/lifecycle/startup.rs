//! Startup orchestration.
//!
//! Order matters: the registry client must exist before the listener is
//! acquired, and any failure along the way ends the process.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

use crate::cli::Cli;
use crate::config::{load_config, ConfigError, ProxyConfig};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::net::{acquire_listener, ListenerError, Protocol, SocketSource, SystemdActivation};
use crate::observability::metrics;
use crate::registry::{ConsulClient, RegistryError};

/// Fatal errors; each one terminates the process with a nonzero status.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Loading configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Connecting to Consul: {0}")]
    Registry(#[from] RegistryError),

    #[error("Fetching passed sockets: {0}")]
    PassedSockets(#[source] io::Error),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Serving: {0}")]
    Serve(#[source] io::Error),
}

/// Start the gateway from parsed command-line arguments and serve until a
/// termination signal arrives.
pub async fn run(cli: Cli, mut activation: SystemdActivation) -> Result<(), StartupError> {
    let config = load_config(cli.config.as_deref(), &cli.listen)?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(&shutdown);

    run_with(config, &mut activation, shutdown).await
}

/// Start the gateway from a validated configuration.
pub async fn run_with(
    config: ProxyConfig,
    sockets: &mut dyn SocketSource,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    tracing::info!(
        registry = %config.registry.address,
        datacenter = ?config.registry.datacenter,
        protocol = %config.listener.protocol,
        address = %config.listener.address,
        "Configuration loaded"
    );

    let registry = ConsulClient::new(&config.registry)?;

    let passed = sockets.take_sockets().map_err(StartupError::PassedSockets)?;
    let protocol: Protocol = config.listener.protocol.parse()?;
    let listener = acquire_listener(protocol, &config.listener.address, passed).await?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(Arc::new(registry));
    server
        .run(listener, shutdown.subscribe())
        .await
        .map_err(StartupError::Serve)?;

    tracing::info!("Shutdown complete");
    Ok(())
}
