//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use consul_gateway::net::{acquire_listener, Protocol};
use consul_gateway::{HttpServer, ServiceRegistry, Shutdown};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn spawn_app(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Backend that answers every request with a JSON description of it.
#[allow(dead_code)]
pub async fn start_echo_backend(name: &'static str) -> SocketAddr {
    spawn_app(Router::new().fallback(echo).with_state(name)).await
}

async fn echo(State(name): State<&'static str>, request: Request<Body>) -> Json<Value> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();

    Json(json!({
        "backend": name,
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

/// Read up to and including the blank line ending an HTTP head.
#[allow(dead_code)]
pub async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(_) => head.push(byte[0]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Backend that accepts `Upgrade: websocket` with a `101` and then echoes
/// every byte back. Anything else gets a `400`.
#[allow(dead_code)]
pub async fn start_upgrade_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let head = read_head(&mut socket).await.to_ascii_lowercase();
                let upgrading = head.contains("\r\nupgrade: websocket\r\n")
                    && head.contains("\r\nconnection: upgrade\r\n");
                if !upgrading {
                    let _ = socket
                        .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                        .await;
                    return;
                }

                let _ = socket
                    .write_all(b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n")
                    .await;
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// Start a programmable raw-TCP backend; each connection gets one response.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                // Drain the request head so closing never resets the peer.
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }

                let (status, body) = f().await;
                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown");
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nX-Backend: programmable\r\nConnection: close\r\n\r\n{body}",
                    body.len(),
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Consul agent stub serving a fixed `/v1/agent/services` answer.
#[allow(dead_code)]
pub async fn start_mock_consul(status: StatusCode, body: Value) -> SocketAddr {
    let app = Router::new().route(
        "/v1/agent/services",
        get(move || {
            let body = body.clone();
            async move {
                if status.is_success() {
                    (status, Json(body)).into_response()
                } else {
                    (status, body.as_str().unwrap_or_default().to_string()).into_response()
                }
            }
        }),
    );
    spawn_app(app).await
}

/// Catalog entry in the agent's wire format.
#[allow(dead_code)]
pub fn agent_service(name: &str, addr: SocketAddr) -> Value {
    json!({
        "ID": name,
        "Service": name,
        "Tags": [],
        "Address": addr.ip().to_string(),
        "Port": addr.port(),
    })
}

/// Run the gateway on an ephemeral loopback port.
#[allow(dead_code)]
pub async fn start_gateway(registry: Arc<dyn ServiceRegistry>) -> (SocketAddr, Shutdown) {
    let listener = acquire_listener(Protocol::Tcp, "127.0.0.1:0", Vec::new())
        .await
        .unwrap();
    let addr = listener.tcp_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(registry);
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

/// Client that ignores proxy environment variables and connection reuse.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Send `GET /` with the given Host header.
#[allow(dead_code)]
pub async fn get_via(gateway: SocketAddr, host: &str) -> reqwest::Response {
    client()
        .get(format!("http://{gateway}/"))
        .header("host", host)
        .send()
        .await
        .expect("gateway unreachable")
}
