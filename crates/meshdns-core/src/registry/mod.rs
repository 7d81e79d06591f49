//! Plugin-based collaborator registry
//!
//! DNS providers and inventory sources register a factory under a type
//! name. The daemon then builds instances from configuration without a
//! hardcoded match over every implementation.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meshdns_core::registry::PluginRegistry;
//!
//! let registry = PluginRegistry::new();
//! meshdns_provider_cloudflare::register(&registry);
//! meshdns_source_tailscale::register(&registry);
//!
//! let provider = registry.create_provider(&config.provider, &config.sync)?;
//! let source = registry.create_source(&config.source, &config.sync)?;
//! ```

use crate::config::{ProviderConfig, SourceConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory, InventorySource, InventorySourceFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Registry of provider and source factories
///
/// Uses interior mutability (`RwLock`), so registration only needs `&self`.
#[derive(Default)]
pub struct PluginRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,

    /// Registered inventory source factories
    sources: RwLock<HashMap<String, Box<dyn InventorySourceFactory>>>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name as it appears in configuration (e.g. "cloudflare")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers.insert(name.into(), factory);
    }

    /// Register an inventory source factory
    pub fn register_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn InventorySourceFactory>,
    ) {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.insert(name.into(), factory);
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error::Validation)`: If the provider type is not registered
    pub fn create_provider(
        &self,
        config: &ProviderConfig,
        sync: &SyncConfig,
    ) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers.get(provider_type).ok_or_else(|| {
            Error::validation(format!("Unknown provider type: {}", provider_type))
        })?;

        factory.create(config, sync)
    }

    /// Create an inventory source from configuration
    pub fn create_source(
        &self,
        config: &SourceConfig,
        sync: &SyncConfig,
    ) -> Result<Box<dyn InventorySource>> {
        let source_type = config.type_name();
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);

        let factory = sources.get(source_type).ok_or_else(|| {
            Error::validation(format!("Unknown inventory source type: {}", source_type))
        })?;

        factory.create(config, sync)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// List all registered source types
    pub fn list_sources(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }

    /// Check if a source type is registered
    pub fn has_source(&self, name: &str) -> bool {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockProviderFactory;

    impl DnsProviderFactory for MockProviderFactory {
        fn create(&self, _config: &ProviderConfig, _sync: &SyncConfig) -> Result<Box<dyn DnsProvider>> {
            Err(Error::Other("Mock provider not implemented".to_string()))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = PluginRegistry::new();

        assert!(!registry.has_provider("mock"));
        registry.register_provider("mock", Box::new(MockProviderFactory));
        assert!(registry.has_provider("mock"));
        assert!(registry.list_providers().contains(&"mock".to_string()));
        assert!(registry.list_sources().is_empty());
    }

    #[test]
    fn unknown_type_is_a_validation_error() {
        let registry = PluginRegistry::new();
        let config = ProviderConfig::Cloudflare {
            api_token: "token".to_string(),
            zone_id: "zone".to_string(),
            api_base: None,
        };

        let err = registry
            .create_provider(&config, &SyncConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("cloudflare"));
    }

    #[test]
    fn factory_errors_are_passed_through() {
        let registry = PluginRegistry::new();
        registry.register_provider("cloudflare", Box::new(MockProviderFactory));
        let config = ProviderConfig::Cloudflare {
            api_token: "token".to_string(),
            zone_id: "zone".to_string(),
            api_base: None,
        };

        let err = registry
            .create_provider(&config, &SyncConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Other(_)));
    }
}
