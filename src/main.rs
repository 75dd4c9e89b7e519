//! Consul-routed reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                 CONSUL GATEWAY                   │
//!   Client Request   │  ┌──────────┐   ┌──────────┐   ┌─────────────┐   │
//!   ─────────────────┼─▶│   net    │──▶│   http   │──▶│   routing   │   │
//!                    │  │ listener │   │  server  │   │ host→service│   │
//!                    │  └──────────┘   └──────────┘   └──────┬──────┘   │
//!                    │       ▲                               │          │   ┌────────┐
//!                    │  passed socket                        ├──────────┼──▶│ Consul │
//!                    │  (systemd)                            ▼          │   └────────┘
//!   Client Response  │                                ┌─────────────┐   │   ┌─────────┐
//!   ◀────────────────┼────────────────────────────────│    proxy    │───┼──▶│ Backend │
//!                    │                                │ single host │   │   └─────────┘
//!                    │                                └─────────────┘   │
//!                    └──────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `consul-gateway [OPTIONS] [[PROTOCOL] ADDRESS]`

use std::process::ExitCode;

use clap::Parser;

use consul_gateway::cli::Cli;
use consul_gateway::lifecycle;
use consul_gateway::net::SystemdActivation;
use consul_gateway::observability::logging;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    tracing::info!("consul-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    // Clears LISTEN_* from the environment; must run before worker threads exist.
    let activation = SystemdActivation::from_env();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(lifecycle::run(cli, activation)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal");
            ExitCode::FAILURE
        }
    }
}
