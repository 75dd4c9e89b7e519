//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! Request handler
//!     → ServiceRegistry::lookup_all_services()
//!     → consul.rs (GET /v1/agent/services on the local agent)
//!     → ServiceCatalog snapshot (name → address, port)
//! ```
//!
//! # Design Decisions
//! - One client per process, shared behind `Arc<dyn ServiceRegistry>`
//! - Every lookup is a fresh round-trip; nothing is cached locally
//! - Lookup failures are request-scoped and never terminate the process

pub mod consul;
pub mod memory;
pub mod types;

use async_trait::async_trait;

pub use consul::ConsulClient;
pub use memory::StaticRegistry;
pub use types::{RegistryError, ServiceCatalog, ServiceEndpoint};

/// Read-only view of a service registry.
///
/// Implementations must be safe to call from many concurrent requests
/// without external locking.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Return the registry's current mapping of service name to endpoint.
    async fn lookup_all_services(&self) -> Result<ServiceCatalog, RegistryError>;
}
