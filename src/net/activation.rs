//! Sockets handed down by a supervising process.
//!
//! # Responsibilities
//! - Read the systemd socket-activation handshake (`LISTEN_PID`, `LISTEN_FDS`)
//! - Take ownership of the passed descriptors and mark them close-on-exec
//! - Keep exactly one inherited socket, closing the rest
//!
//! The listener code only sees the [`SocketSource`] capability, so other
//! supervisors can be plugged in without touching it.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

use tokio::net::{TcpListener, UnixListener};

use crate::net::listener::{Listener, ListenerError};

/// First descriptor passed by systemd (`SD_LISTEN_FDS_START`).
pub const LISTEN_FDS_START: RawFd = 3;

const ENV_LISTEN_PID: &str = "LISTEN_PID";
const ENV_LISTEN_FDS: &str = "LISTEN_FDS";
const ENV_LISTEN_FDNAMES: &str = "LISTEN_FDNAMES";

/// Anything able to produce pre-opened listening sockets.
pub trait SocketSource: Send {
    /// Hand over all sockets this source holds. Called once at startup.
    fn take_sockets(&mut self) -> io::Result<Vec<InheritedSocket>>;
}

/// A listening socket opened by someone else.
#[derive(Debug)]
pub struct InheritedSocket {
    fd: OwnedFd,
}

impl InheritedSocket {
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self { fd }
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Close the descriptor, reporting errors that `drop` would swallow.
    pub fn close(self) -> io::Result<()> {
        let fd = self.fd.into_raw_fd();
        // SAFETY: `fd` was just released from an `OwnedFd`; nothing else owns it.
        if unsafe { libc::close(fd) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Convert into an async listener. TCP and unix-domain sockets are
    /// recognised by their local address family.
    pub fn into_listener(self) -> Result<Listener, ListenerError> {
        let fd = self.raw_fd();
        let tcp = std::net::TcpListener::from(self.fd);
        if tcp.local_addr().is_ok() {
            tcp.set_nonblocking(true)
                .map_err(|source| ListenerError::Inherit { fd, source })?;
            let listener =
                TcpListener::from_std(tcp).map_err(|source| ListenerError::Inherit { fd, source })?;
            return Ok(Listener::Tcp(listener));
        }

        let unix = std::os::unix::net::UnixListener::from(OwnedFd::from(tcp));
        unix.local_addr()
            .and_then(|_| unix.set_nonblocking(true))
            .map_err(|source| ListenerError::Inherit { fd, source })?;
        let listener =
            UnixListener::from_std(unix).map_err(|source| ListenerError::Inherit { fd, source })?;
        Ok(Listener::Unix(listener, None))
    }
}

impl From<std::net::TcpListener> for InheritedSocket {
    fn from(listener: std::net::TcpListener) -> Self {
        Self::from_fd(listener.into())
    }
}

impl From<std::os::unix::net::UnixListener> for InheritedSocket {
    fn from(listener: std::os::unix::net::UnixListener) -> Self {
        Self::from_fd(listener.into())
    }
}

/// Keep the first socket and close every other one.
///
/// A close failure is returned as an error; the caller must not continue
/// with a half-cleaned handoff.
pub fn adopt_first(sockets: Vec<InheritedSocket>) -> Result<Option<InheritedSocket>, ListenerError> {
    let mut sockets = sockets.into_iter();
    let first = sockets.next();
    for extra in sockets {
        let fd = extra.raw_fd();
        extra
            .close()
            .map_err(|source| ListenerError::CloseInherited { fd, source })?;
        tracing::debug!(fd, "Closed extra passed socket");
    }
    Ok(first)
}

/// systemd socket activation (`sd_listen_fds(3)`).
///
/// The handshake is read, and the variables cleared, when the value is
/// built. Build it while the process is still single-threaded: changing the
/// environment races with any other thread reading it.
#[derive(Debug)]
pub struct SystemdActivation {
    sockets: Option<io::Result<Vec<InheritedSocket>>>,
}

impl SystemdActivation {
    /// Claim the descriptors systemd passed to this process, if any.
    pub fn from_env() -> Self {
        let count = listen_fds_count(
            std::env::var(ENV_LISTEN_PID).ok().as_deref(),
            std::env::var(ENV_LISTEN_FDS).ok().as_deref(),
            std::process::id(),
        );

        // Children must not see a handshake meant for us.
        std::env::remove_var(ENV_LISTEN_PID);
        std::env::remove_var(ENV_LISTEN_FDS);
        std::env::remove_var(ENV_LISTEN_FDNAMES);

        Self {
            sockets: Some(claim_fds(count)),
        }
    }
}

impl SocketSource for SystemdActivation {
    fn take_sockets(&mut self) -> io::Result<Vec<InheritedSocket>> {
        let sockets = self.sockets.take().unwrap_or_else(|| Ok(Vec::new()))?;
        if !sockets.is_empty() {
            tracing::debug!(count = sockets.len(), "Received passed sockets");
        }
        Ok(sockets)
    }
}

fn claim_fds(count: usize) -> io::Result<Vec<InheritedSocket>> {
    let mut sockets = Vec::with_capacity(count);
    for fd in (LISTEN_FDS_START..).take(count) {
        set_cloexec(fd)?;
        // SAFETY: the supervisor passed this descriptor to us and nothing
        // else in the process has claimed it.
        sockets.push(InheritedSocket::from_fd(unsafe { OwnedFd::from_raw_fd(fd) }));
    }
    Ok(sockets)
}

/// Number of descriptors addressed to process `pid`, or zero when the
/// handshake is absent, malformed or meant for another process.
pub fn listen_fds_count(listen_pid: Option<&str>, listen_fds: Option<&str>, pid: u32) -> usize {
    let Some(target) = listen_pid.and_then(|v| v.trim().parse::<u32>().ok()) else {
        return 0;
    };
    if target != pid {
        return 0;
    }
    listen_fds
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on an integer descriptor has no memory-safety effects;
    // errors (e.g. EBADF) are reported through the return value.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;

    fn std_listener() -> std::net::TcpListener {
        std::net::TcpListener::bind("127.0.0.1:0").unwrap()
    }

    #[test]
    fn listen_fds_requires_matching_pid() {
        assert_eq!(listen_fds_count(Some("42"), Some("2"), 42), 2);
        assert_eq!(listen_fds_count(Some("41"), Some("2"), 42), 0);
        assert_eq!(listen_fds_count(None, Some("2"), 42), 0);
        assert_eq!(listen_fds_count(Some("42"), None, 42), 0);
        assert_eq!(listen_fds_count(Some("42"), Some("x"), 42), 0);
        assert_eq!(listen_fds_count(Some("nope"), Some("1"), 42), 0);
    }

    #[test]
    fn adopt_first_closes_the_rest() {
        let first = std_listener();
        let second = std_listener();
        let third = std_listener();
        let first_addr = first.local_addr().unwrap();
        let second_addr = second.local_addr().unwrap();
        let third_addr = third.local_addr().unwrap();

        let kept = adopt_first(vec![first.into(), second.into(), third.into()])
            .unwrap()
            .expect("first socket kept");

        assert!(TcpStream::connect(first_addr).is_ok());
        assert!(TcpStream::connect(second_addr).is_err());
        assert!(TcpStream::connect(third_addr).is_err());
        drop(kept);
    }

    #[test]
    fn adopt_first_of_nothing() {
        assert!(adopt_first(Vec::new()).unwrap().is_none());
    }

    #[tokio::test]
    async fn tcp_socket_becomes_tcp_listener() {
        let std = std_listener();
        let addr = std.local_addr().unwrap();
        let listener = InheritedSocket::from(std).into_listener().unwrap();
        assert_eq!(listener.tcp_addr(), Some(addr));
    }

    #[tokio::test]
    async fn unix_socket_becomes_unix_listener() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.sock");
        let std = std::os::unix::net::UnixListener::bind(&path).unwrap();
        let listener = InheritedSocket::from(std).into_listener().unwrap();
        assert!(matches!(listener, Listener::Unix(_, None)));
        assert!(listener.tcp_addr().is_none());

        // The supervisor owns the socket file.
        drop(listener);
        assert!(path.exists());
    }

    #[test]
    fn systemd_sockets_are_handed_over_once() {
        let mut activation = SystemdActivation {
            sockets: Some(Ok(vec![std_listener().into()])),
        };
        assert_eq!(activation.take_sockets().unwrap().len(), 1);
        assert!(activation.take_sockets().unwrap().is_empty());
    }

    #[test]
    fn claim_error_surfaces_on_take() {
        let mut activation = SystemdActivation {
            sockets: Some(Err(io::Error::from_raw_os_error(libc::EBADF))),
        };
        let err = activation.take_sockets().unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }
}
