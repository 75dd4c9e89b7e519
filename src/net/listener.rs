//! Listener acquisition.
//!
//! # Responsibilities
//! - Parse the socket family (`tcp`, `tcp4`, `tcp6`, `unix`)
//! - Bind to the configured address when nothing was handed down
//! - Prefer a socket passed by the supervisor over binding
//! - Guarantee a single active listener per process

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};

use crate::net::activation::{adopt_first, InheritedSocket};

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Protocol is not one of the supported socket families.
    #[error("unsupported protocol '{0}'")]
    UnsupportedProtocol(String),

    /// Host part of the address could not be resolved.
    #[error("failed to resolve {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Resolution succeeded but gave nothing usable for the family.
    #[error("no {protocol} address found for {address}")]
    NoAddress { protocol: Protocol, address: String },

    /// Failed to bind to address.
    #[error("Listening on {protocol} {address}: {source}")]
    Bind {
        protocol: Protocol,
        address: String,
        #[source]
        source: io::Error,
    },

    /// A passed socket could not be turned into a listener.
    #[error("unusable passed socket (fd {fd}): {source}")]
    Inherit {
        fd: RawFd,
        #[source]
        source: io::Error,
    },

    /// An extra passed socket could not be closed.
    #[error("Closing passed socket (fd {fd}): {source}")]
    CloseInherited {
        fd: RawFd,
        #[source]
        source: io::Error,
    },
}

/// Socket family to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// TCP over whichever family the address resolves to.
    #[default]
    Tcp,
    /// TCP over IPv4 only.
    Tcp4,
    /// TCP over IPv6 only.
    Tcp6,
    /// Unix-domain stream socket; the address is a path.
    Unix,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Tcp4 => "tcp4",
            Protocol::Tcp6 => "tcp6",
            Protocol::Unix => "unix",
        }
    }

    fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            Protocol::Tcp4 => addr.is_ipv4(),
            Protocol::Tcp6 => addr.is_ipv6(),
            _ => true,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ListenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Protocol::Tcp),
            "tcp4" => Ok(Protocol::Tcp4),
            "tcp6" => Ok(Protocol::Tcp6),
            "unix" => Ok(Protocol::Unix),
            other => Err(ListenerError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// The single socket the server accepts on.
///
/// A unix listener bound by this process carries its [`SocketFile`], so the
/// path is unlinked once the listener is gone. Passed sockets carry `None`;
/// their file belongs to the supervisor.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener, Option<SocketFile>),
}

/// Filesystem entry of a unix socket we bound; removed on drop.
#[derive(Debug)]
pub struct SocketFile {
    path: PathBuf,
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed socket file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove socket file"),
        }
    }
}

impl Listener {
    /// Bound TCP address, if this is a TCP listener.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Tcp(l) => l.local_addr().ok(),
            Listener::Unix(..) => None,
        }
    }

    /// Human-readable local address for logs.
    pub fn describe(&self) -> String {
        match self {
            Listener::Tcp(l) => match l.local_addr() {
                Ok(addr) => format!("tcp {addr}"),
                Err(_) => "tcp <unknown>".to_string(),
            },
            Listener::Unix(l, _) => match l.local_addr() {
                Ok(addr) => match addr.as_pathname() {
                    Some(path) => format!("unix {}", path.display()),
                    None => "unix <unnamed>".to_string(),
                },
                Err(_) => "unix <unknown>".to_string(),
            },
        }
    }
}

/// Obtain the process listener.
///
/// A non-empty `inherited` list wins: its first socket is used and the
/// others are closed. Otherwise a fresh socket is bound on
/// `(protocol, address)`.
pub async fn acquire_listener(
    protocol: Protocol,
    address: &str,
    inherited: Vec<InheritedSocket>,
) -> Result<Listener, ListenerError> {
    let passed = inherited.len();
    if let Some(socket) = adopt_first(inherited)? {
        let listener = socket.into_listener()?;
        tracing::info!(
            passed,
            listener = %listener.describe(),
            "Using socket passed by supervisor"
        );
        return Ok(listener);
    }

    tracing::info!(%protocol, address, "No passed file descriptor, binding");
    let listener = bind(protocol, address).await?;
    tracing::info!(listener = %listener.describe(), "Listener bound");
    Ok(listener)
}

/// Bind a new listening socket.
pub async fn bind(protocol: Protocol, address: &str) -> Result<Listener, ListenerError> {
    let bind_error = |source: io::Error| ListenerError::Bind {
        protocol,
        address: address.to_string(),
        source,
    };

    if protocol == Protocol::Unix {
        let listener = UnixListener::bind(address).map_err(bind_error)?;
        let file = SocketFile {
            path: PathBuf::from(address),
        };
        return Ok(Listener::Unix(listener, Some(file)));
    }

    let mut candidates: Vec<SocketAddr> = Vec::new();
    for host_port in normalize_tcp_address(protocol, address) {
        let resolved = tokio::net::lookup_host(host_port.as_str())
            .await
            .map_err(|source| ListenerError::Resolve {
                address: address.to_string(),
                source,
            })?;
        candidates.extend(resolved.filter(|addr| protocol.accepts(addr)));
    }

    let mut last_error = None;
    for addr in candidates {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(Listener::Tcp(listener)),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "Bind attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(source) => bind_error(source),
        None => ListenerError::NoAddress {
            protocol,
            address: address.to_string(),
        },
    })
}

/// Fill in the wildcard host for `:port` style addresses, in bind order.
///
/// Plain `tcp` prefers the dual-stack `[::]` and falls back to `0.0.0.0`
/// on hosts without IPv6.
fn normalize_tcp_address(protocol: Protocol, address: &str) -> Vec<String> {
    if !address.starts_with(':') {
        return vec![address.to_string()];
    }
    let wildcards: &[&str] = match protocol {
        Protocol::Tcp4 => &["0.0.0.0"],
        Protocol::Tcp6 => &["[::]"],
        _ => &["[::]", "0.0.0.0"],
    };
    wildcards
        .iter()
        .map(|wildcard| format!("{wildcard}{address}"))
        .collect()
}
