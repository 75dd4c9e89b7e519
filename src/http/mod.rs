//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Listener (tcp or unix)
//!     → server.rs (axum serve, HTTP/1.1 + h2c, registry in AppState)
//!     → request.rs (request ID span, peer address)
//!     → routing (service name → backend target)
//!     → proxy (forward, stream response)
//!     → response.rs (gateway-generated error bodies)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
