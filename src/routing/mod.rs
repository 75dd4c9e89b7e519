//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (authority / Host header)
//!     → host.rs (first label = service name)
//!     → router.rs (fresh registry lookup)
//!     → Return: BackendTarget, NotFound or Registry error
//! ```
//!
//! # Design Decisions
//! - Resolution happens on every request; nothing compiled at startup
//! - Routing is a pure function of (request, current catalog snapshot)
//! - The registry is passed in explicitly, never read from a global

pub mod host;
pub mod router;

pub use host::{destination_host, service_name};
pub use router::{resolve_host, route, BackendTarget, RouteError};
