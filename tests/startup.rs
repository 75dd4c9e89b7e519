//! Full startup path: configuration, registry client, passed sockets.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use consul_gateway::config::{ListenerConfig, ProxyConfig, RegistryConfig};
use consul_gateway::lifecycle::{run_with, StartupError};
use consul_gateway::net::{InheritedSocket, SocketSource};
use consul_gateway::Shutdown;
use serde_json::{json, Value};

mod common;

/// Hands out pre-bound std listeners in place of a supervisor.
struct PreboundSockets(Vec<std::net::TcpListener>);

impl SocketSource for PreboundSockets {
    fn take_sockets(&mut self) -> io::Result<Vec<InheritedSocket>> {
        Ok(self.0.drain(..).map(InheritedSocket::from).collect())
    }
}

fn config_for(consul: SocketAddr) -> ProxyConfig {
    ProxyConfig {
        listener: ListenerConfig {
            // Never bound when a socket is passed.
            protocol: "unix".into(),
            address: "/nonexistent/dir/gateway.sock".into(),
        },
        registry: RegistryConfig {
            address: consul.to_string(),
            ..RegistryConfig::default()
        },
        ..ProxyConfig::default()
    }
}

async fn wait_until_serving(addr: SocketAddr) {
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("gateway never accepted on {addr}");
}

#[tokio::test]
async fn serves_on_passed_socket_and_stops_on_shutdown() {
    let backend = common::start_echo_backend("web").await;
    let consul = common::start_mock_consul(
        StatusCode::OK,
        json!({ "web": common::agent_service("web", backend) }),
    )
    .await;

    let passed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let passed_addr = passed.local_addr().unwrap();
    let extra = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let extra_addr = extra.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut sockets = PreboundSockets(vec![passed, extra]);
            run_with(config_for(consul), &mut sockets, shutdown).await
        })
    };

    wait_until_serving(passed_addr).await;

    let res = common::get_via(passed_addr, "web.service.consul").await;
    assert_eq!(res.status(), 200);
    let echo: Value = res.json().await.unwrap();
    assert_eq!(echo["backend"], "web");

    // Extra passed sockets are closed before serving starts.
    assert!(tokio::net::TcpStream::connect(extra_addr).await.is_err());

    let res = common::get_via(passed_addr, "missing.service.consul").await;
    assert_eq!(res.status(), 404);

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("gateway did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn bind_failure_is_fatal() {
    let consul = common::start_mock_consul(StatusCode::OK, json!({})).await;
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();

    let mut config = config_for(consul);
    config.listener = ListenerConfig {
        protocol: "tcp".into(),
        address: taken.local_addr().unwrap().to_string(),
    };

    let err = run_with(config, &mut PreboundSockets(Vec::new()), Shutdown::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StartupError::Listener(_)));
    assert!(err.to_string().starts_with("Listening on tcp "));
}

#[tokio::test]
async fn bad_registry_address_is_fatal() {
    let mut config = config_for("127.0.0.1:8500".parse().unwrap());
    config.registry.address = "ftp://127.0.0.1:8500".into();

    let err = run_with(config, &mut PreboundSockets(Vec::new()), Shutdown::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StartupError::Registry(_)));
}
