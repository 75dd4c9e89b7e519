//! In-memory registry.
//!
//! Holds a fixed catalog that can be edited at runtime. Used to run the
//! proxy without a Consul agent and as the substitute registry in tests.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::registry::types::{RegistryError, ServiceCatalog, ServiceEndpoint};
use crate::registry::ServiceRegistry;

#[derive(Debug, Default)]
struct State {
    catalog: ServiceCatalog,
    failure: Option<String>,
}

/// A registry backed by a local map.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    state: RwLock<State>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing catalog.
    pub fn with_catalog(catalog: ServiceCatalog) -> Self {
        Self {
            state: RwLock::new(State {
                catalog,
                failure: None,
            }),
        }
    }

    /// Register or move a service.
    pub fn insert(&self, name: impl Into<String>, endpoint: ServiceEndpoint) {
        self.write().catalog.insert(name.into(), endpoint);
    }

    /// Deregister a service.
    pub fn remove(&self, name: &str) -> Option<ServiceEndpoint> {
        self.write().catalog.remove(name)
    }

    /// Make every lookup fail with `message` until cleared with `None`.
    pub fn set_failure(&self, message: Option<String>) {
        self.write().failure = message;
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ServiceRegistry for StaticRegistry {
    async fn lookup_all_services(&self) -> Result<ServiceCatalog, RegistryError> {
        let state = self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        match &state.failure {
            Some(message) => Err(RegistryError::Unavailable(message.clone())),
            None => Ok(state.catalog.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_reflects_changes() {
        let registry = StaticRegistry::new();
        registry.insert("web", ServiceEndpoint::new("10.0.0.5", 9000));

        let first = registry.lookup_all_services().await.unwrap();
        assert_eq!(first["web"].port, 9000);

        registry.insert("web", ServiceEndpoint::new("10.0.0.7", 9001));
        let second = registry.lookup_all_services().await.unwrap();
        assert_eq!(second["web"], ServiceEndpoint::new("10.0.0.7", 9001));

        // Earlier snapshots are unaffected.
        assert_eq!(first["web"].address, "10.0.0.5");

        registry.remove("web");
        assert!(registry.lookup_all_services().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_is_reported_until_cleared() {
        let registry = StaticRegistry::new();
        registry.set_failure(Some("connection refused".into()));

        let err = registry.lookup_all_services().await.unwrap_err();
        assert_eq!(err.to_string(), "connection refused");

        registry.set_failure(None);
        assert!(registry.lookup_all_services().await.is_ok());
    }
}
