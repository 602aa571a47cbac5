//! Provider registry
//!
//! Maps provider tags to constructor functions. New backends are added by
//! registering a constructor; nothing else dispatches on the tag.

use photon_core::Config;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

#[cfg(feature = "storage-b2")]
use crate::b2::B2Provider;
#[cfg(feature = "storage-github")]
use crate::github::GitHubProvider;
#[cfg(feature = "storage-local")]
use crate::local::LocalProvider;
#[cfg(feature = "storage-s3")]
use crate::s3::{S3Flavor, S3Provider};
use crate::config::{ProviderCategory, StorageConfig};
use crate::managed::ManagedStorageProvider;
use crate::memory::InMemoryStorageProvider;
use crate::traits::{StorageError, StorageProvider, StorageResult};

/// Provider tags that only make sense next to the control plane's filesystem.
pub const LOCAL_STORAGE_PROVIDERS: &[&str] = &["local", "eagle"];

/// Builds a provider from its config. Receives the factory so decorators can
/// construct their upstream through the same registry.
pub type ProviderConstructor = Arc<
    dyn Fn(&StorageConfig, &StorageFactory) -> StorageResult<Arc<dyn StorageProvider>>
        + Send
        + Sync,
>;

#[derive(Clone)]
struct ProviderRegistration {
    constructor: ProviderConstructor,
    category: ProviderCategory,
}

/// Registry of provider constructors, populated once at startup and shared
/// behind an `Arc` afterwards.
#[derive(Clone)]
pub struct StorageFactory {
    providers: HashMap<String, ProviderRegistration>,
    allow_local: bool,
}

impl Debug for StorageFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut tags: Vec<&String> = self.providers.keys().collect();
        tags.sort();
        f.debug_struct("StorageFactory")
            .field("providers", &tags)
            .field("allow_local", &self.allow_local)
            .finish()
    }
}

impl StorageFactory {
    /// Create an empty registry that refuses local-category providers.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            allow_local: false,
        }
    }

    /// Registry with every built-in backend. Local providers are only
    /// constructible outside cloud deployments.
    pub fn from_config(config: &Config) -> Self {
        let mut factory = Self::with_default_providers();
        factory.allow_local = !config.is_cloud();
        factory
    }

    pub fn with_default_providers() -> Self {
        let mut factory = Self::new();

        #[cfg(feature = "storage-s3")]
        for tag in ["s3", "oss", "cos"] {
            factory.register_provider(
                tag,
                |config, _| {
                    let (flavor, c) = match config {
                        StorageConfig::S3(c) => (S3Flavor::S3, c),
                        StorageConfig::Oss(c) => (S3Flavor::Oss, c),
                        StorageConfig::Cos(c) => (S3Flavor::Cos, c),
                        other => return Err(mismatched(other)),
                    };
                    Ok(Arc::new(S3Provider::new(flavor, c.clone())?) as Arc<dyn StorageProvider>)
                },
                ProviderCategory::Remote,
            );
        }

        #[cfg(feature = "storage-github")]
        factory.register_provider(
            "github",
            |config, _| match config {
                StorageConfig::Github(c) => {
                    Ok(Arc::new(GitHubProvider::new(c.clone())?) as Arc<dyn StorageProvider>)
                }
                other => Err(mismatched(other)),
            },
            ProviderCategory::Remote,
        );

        #[cfg(feature = "storage-b2")]
        factory.register_provider(
            "b2",
            |config, _| match config {
                StorageConfig::B2(c) => {
                    Ok(Arc::new(B2Provider::new(c.clone())?) as Arc<dyn StorageProvider>)
                }
                other => Err(mismatched(other)),
            },
            ProviderCategory::Remote,
        );

        factory.register_provider(
            "managed",
            |config, factory| match config {
                StorageConfig::Managed(c) => Ok(Arc::new(ManagedStorageProvider::new(
                    c.clone(),
                    factory,
                )?) as Arc<dyn StorageProvider>),
                other => Err(mismatched(other)),
            },
            ProviderCategory::Remote,
        );

        #[cfg(feature = "storage-local")]
        factory.register_provider(
            "local",
            |config, _| match config {
                StorageConfig::Local(c) => {
                    Ok(Arc::new(LocalProvider::new(c.clone())?) as Arc<dyn StorageProvider>)
                }
                other => Err(mismatched(other)),
            },
            ProviderCategory::Local,
        );

        factory.register_provider(
            "memory",
            |config, _| match config {
                StorageConfig::Memory(_) => {
                    Ok(Arc::new(InMemoryStorageProvider::new()) as Arc<dyn StorageProvider>)
                }
                other => Err(mismatched(other)),
            },
            ProviderCategory::Local,
        );

        factory
    }

    /// Allow or refuse local-category providers.
    pub fn allow_local_providers(mut self, allow: bool) -> Self {
        self.allow_local = allow;
        self
    }

    /// Associate a provider tag with a constructor. Re-registering a tag
    /// replaces the previous constructor.
    pub fn register_provider<F>(
        &mut self,
        tag: impl Into<String>,
        constructor: F,
        category: ProviderCategory,
    ) where
        F: Fn(&StorageConfig, &StorageFactory) -> StorageResult<Arc<dyn StorageProvider>>
            + Send
            + Sync
            + 'static,
    {
        let tag = tag.into();
        tracing::debug!(provider = %tag, category = %category, "Registered storage provider");
        self.providers.insert(
            tag,
            ProviderRegistration {
                constructor: Arc::new(constructor),
                category,
            },
        );
    }

    pub fn category(&self, tag: &str) -> Option<ProviderCategory> {
        self.providers.get(tag).map(|registration| registration.category)
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.providers.contains_key(tag)
    }

    /// Registered tags with their categories, sorted by tag.
    pub fn registered_providers(&self) -> Vec<(String, ProviderCategory)> {
        let mut providers: Vec<(String, ProviderCategory)> = self
            .providers
            .iter()
            .map(|(tag, registration)| (tag.clone(), registration.category))
            .collect();
        providers.sort_by(|a, b| a.0.cmp(&b.0));
        providers
    }

    /// Resolve a config to a live provider via its registered constructor.
    pub fn create_provider(&self, config: &StorageConfig) -> StorageResult<Arc<dyn StorageProvider>> {
        let tag = config.provider_tag();
        let registration = self
            .providers
            .get(tag)
            .ok_or_else(|| StorageError::ProviderNotRegistered(tag.to_string()))?;

        if registration.category == ProviderCategory::Local && !self.allow_local {
            return Err(StorageError::UnsupportedProvider(format!(
                "Storage provider {} is not supported in cloud deployments",
                tag
            )));
        }

        let provider = (registration.constructor)(config, self)?;
        tracing::debug!(provider = %tag, "Created storage provider");
        Ok(provider)
    }
}

impl Default for StorageFactory {
    fn default() -> Self {
        Self::with_default_providers()
    }
}

fn mismatched(config: &StorageConfig) -> StorageError {
    StorageError::ConfigError(format!(
        "Constructor received a `{}` config it cannot build",
        config.provider_tag()
    ))
}
