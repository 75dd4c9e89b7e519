//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all proxy handler
//! - Inject the shared registry client into every request via `AppState`
//! - Serve on the acquired listener until shutdown
//! - Resolve each request through routing, then forward it

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    Router,
};
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::http::request::{client_ip, make_request_span};
use crate::net::Listener;
use crate::observability::metrics;
use crate::proxy::{build_client, BackendClient, SingleHostProxy};
use crate::registry::ServiceRegistry;
use crate::routing::{destination_host, resolve_host, service_name, RouteError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry client shared by every request; read-only.
    pub registry: Arc<dyn ServiceRegistry>,
    /// Pooled client every per-request proxy sends through.
    pub client: BackendClient,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a server resolving through `registry`.
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        let state = AppState {
            registry,
            client: build_client(),
        };
        Self {
            router: Self::build_router(state),
        }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
    }

    /// The router, for serving through something other than [`run`](Self::run).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires or the listener fails.
    pub async fn run(
        self,
        listener: Listener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(listener = %listener.describe(), "HTTP server starting");

        match listener {
            Listener::Tcp(listener) => {
                let app = self
                    .router
                    .into_make_service_with_connect_info::<SocketAddr>();
                axum::serve(listener, app)
                    .with_graceful_shutdown(wait_for_shutdown(shutdown))
                    .await?;
            }
            Listener::Unix(listener, socket_file) => {
                axum::serve(listener, self.router.into_make_service())
                    .with_graceful_shutdown(wait_for_shutdown(shutdown))
                    .await?;
                drop(socket_file);
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Resolve the request's service and forward it.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let host = destination_host(&request).to_string();
    let peer = client_ip(&request);

    let target = match resolve_host(state.registry.as_ref(), &host).await {
        Ok(target) => target,
        Err(err) => {
            if let RouteError::NotFound(_) = err {
                tracing::info!(host = %host, "{err}");
            }
            metrics::record_request(None, err.status().as_u16(), started);
            return err.into_response();
        }
    };

    let service = service_name(&host);
    let proxy = SingleHostProxy::new(state.client.clone(), target);
    let response = match proxy.forward(request, peer).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(service, error = %err, "Upstream error");
            err.into_response()
        }
    };

    metrics::record_request(Some(service), response.status().as_u16(), started);
    response
}

async fn wait_for_shutdown(mut shutdown: broadcast::Receiver<()>) {
    // A closed channel means the coordinator is gone; stop as well.
    let _ = shutdown.recv().await;
    tracing::info!("Shutdown signal received");
}
