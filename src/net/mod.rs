//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Process start
//!     → activation.rs (sockets passed by the supervisor, if any)
//!     → listener.rs (keep the first passed socket, or bind a new one)
//!     → Hand off to the HTTP layer
//! ```
//!
//! # Design Decisions
//! - Exactly one listener per process; extra passed sockets are closed
//! - A passed socket always takes precedence over the configured address
//! - Every failure here is fatal at startup

pub mod activation;
pub mod listener;

pub use activation::{InheritedSocket, SocketSource, SystemdActivation};
pub use listener::{acquire_listener, Listener, ListenerError, Protocol};
