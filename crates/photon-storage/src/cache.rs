//! Per-tenant provider cache
//!
//! Building a provider can be expensive (HTTP clients, credential chains), so
//! resolved providers are reused until the tenant's config changes. Entries
//! are keyed by tenant and validated by a SHA-256 signature of the serialized
//! config.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::StorageConfig;
use crate::factory::StorageFactory;
use crate::traits::{StorageError, StorageProvider, StorageResult};

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Clone)]
struct CachedProvider {
    signature: String,
    provider: Arc<dyn StorageProvider>,
    /// Insertion order; the smallest is evicted first.
    sequence: u64,
}

pub struct StorageProviderCache {
    factory: Arc<StorageFactory>,
    capacity: usize,
    entries: Arc<RwLock<HashMap<String, CachedProvider>>>,
    next_sequence: AtomicU64,
}

impl StorageProviderCache {
    pub fn new(factory: Arc<StorageFactory>, capacity: usize) -> Self {
        Self {
            factory,
            capacity: capacity.max(1),
            entries: Arc::new(RwLock::new(HashMap::new())),
            next_sequence: AtomicU64::new(0),
        }
    }

    pub fn factory(&self) -> &Arc<StorageFactory> {
        &self.factory
    }

    /// Return the cached provider for `tenant_id` when its config is
    /// unchanged, otherwise build, cache and return a new one.
    pub async fn get_or_create(
        &self,
        tenant_id: &str,
        config: &StorageConfig,
    ) -> StorageResult<Arc<dyn StorageProvider>> {
        let signature = config_signature(config)?;

        {
            let entries = self.entries.read().await;
            if let Some(cached) = entries.get(tenant_id) {
                if cached.signature == signature {
                    return Ok(cached.provider.clone());
                }
            }
        }

        let provider = self.factory.create_provider(config)?;

        let mut entries = self.entries.write().await;
        if !entries.contains_key(tenant_id) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, cached)| cached.sequence)
                .map(|(tenant, _)| tenant.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                tracing::debug!(tenant_id = %oldest, "Evicted cached storage provider");
            }
        }

        entries.insert(
            tenant_id.to_string(),
            CachedProvider {
                signature,
                provider: provider.clone(),
                sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            },
        );
        tracing::debug!(
            tenant_id = %tenant_id,
            provider = config.provider_tag(),
            "Cached storage provider"
        );
        Ok(provider)
    }

    /// Drop the tenant's cached provider so the next lookup rebuilds it.
    pub async fn invalidate(&self, tenant_id: &str) -> bool {
        self.entries.write().await.remove(tenant_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn config_signature(config: &StorageConfig) -> StorageResult<String> {
    let serialized = serde_json::to_vec(config)
        .map_err(|e| StorageError::ConfigError(format!("Failed to serialize storage config: {}", e)))?;
    Ok(hex::encode(Sha256::digest(&serialized)))
}
