//! Forwarding engine.
//!
//! # Data Flow
//! ```text
//! Request + BackendTarget
//!     → forward.rs (SingleHostProxy: rewrite URI, send via pooled client)
//!     → headers.rs (hop-by-hop removal, X-Forwarded-For)
//!     → Backend response streamed back to the client
//! ```

pub mod forward;
pub mod headers;

pub use forward::{build_client, BackendClient, ProxyError, SingleHostProxy};
